//! Linear genome coordinates.
//!
//! Chromosomes are concatenated in case-insensitive name order so that every
//! `(chromosome, position)` pair maps to one integer on a genome-wide axis.
//! Two layouts exist: [`LinearConverter`] addresses every base of every
//! chromosome, [`GapAwareConverter`] drops each chromosome's pericentromeric
//! gap from the axis and refuses positions that fall inside it.

use std::collections::HashMap;

use thiserror::Error;

use crate::genome::{EuchromaticRegions, GenomeSizes, fold_name};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordError {
    #[error("unknown chromosome: {0}")]
    UnknownChromosome(String),
    #[error("position {position} on {chromosome} lies in the pericentromeric gap [{gap_start}, {gap_end})")]
    PericentromericPosition {
        chromosome: String,
        position: u64,
        gap_start: u64,
        gap_end: u64,
    },
    #[error("chromosome {0} is listed more than once")]
    DuplicateChromosome(String),
    #[error("position {position} on {chromosome} is past the end of the linear axis")]
    PositionOverflow { chromosome: String, position: u64 },
    #[error("total euchromatic length exceeds {}", u64::MAX)]
    GenomeOverflow,
}

impl CoordError {
    /// Pericentromeric positions are expected in real data and can be skipped;
    /// anything else points at mismatched inputs.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PericentromericPosition { .. })
    }
}

/// Half-open `[start, end)` range a chromosome occupies on the linear axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromSpan {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl ChromSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn midpoint(&self) -> u64 {
        self.start + self.len() / 2
    }
}

fn position_overflow(span: &ChromSpan, position: u64) -> CoordError {
    CoordError::PositionOverflow {
        chromosome: span.name.clone(),
        position,
    }
}

fn decode_name(chrom: &[u8]) -> Result<&str, CoordError> {
    std::str::from_utf8(chrom)
        .map_err(|_| CoordError::UnknownChromosome(String::from_utf8_lossy(chrom).into_owned()))
}

/// Every base of every chromosome is addressable.
#[derive(Debug, Clone)]
pub struct LinearConverter {
    spans: Vec<ChromSpan>,
    index: HashMap<String, usize>,
    genome_size: u64,
}

impl LinearConverter {
    pub fn new(sizes: &GenomeSizes) -> Self {
        let mut chromosomes: Vec<_> = sizes.chromosomes().iter().collect();
        chromosomes.sort_by_cached_key(|c| fold_name(&c.name));

        let mut spans = Vec::with_capacity(chromosomes.len());
        let mut index = HashMap::with_capacity(chromosomes.len());
        // GenomeSizes bounds the summed length, so these additions cannot wrap
        let mut offset = 0u64;
        for chrom in chromosomes {
            index.insert(fold_name(&chrom.name), spans.len());
            spans.push(ChromSpan {
                name: chrom.name.clone(),
                start: offset,
                end: offset + chrom.length,
            });
            offset += chrom.length;
        }

        Self {
            spans,
            index,
            genome_size: offset,
        }
    }

    pub fn transform(&self, chrom: &str, pos: u64) -> Result<u64, CoordError> {
        let span = self.span(chrom)?;
        span.start
            .checked_add(pos)
            .ok_or_else(|| position_overflow(span, pos))
    }

    pub fn transform_bytes(&self, chrom: &[u8], pos: u64) -> Result<u64, CoordError> {
        self.transform(decode_name(chrom)?, pos)
    }

    pub fn offset(&self, chrom: &str) -> Result<u64, CoordError> {
        self.span(chrom).map(|span| span.start)
    }

    fn span(&self, chrom: &str) -> Result<&ChromSpan, CoordError> {
        self.index
            .get(&fold_name(chrom))
            .map(|&idx| &self.spans[idx])
            .ok_or_else(|| CoordError::UnknownChromosome(chrom.to_string()))
    }

    pub fn spans(&self) -> &[ChromSpan] {
        &self.spans
    }

    pub fn genome_size(&self) -> u64 {
        self.genome_size
    }
}

#[derive(Debug, Clone)]
struct GapAwareChrom {
    span: ChromSpan,
    regions: EuchromaticRegions,
}

/// Pericentromeric gaps contribute nothing to the linear axis.
#[derive(Debug, Clone)]
pub struct GapAwareConverter {
    chroms: Vec<GapAwareChrom>,
    index: HashMap<String, usize>,
    genome_size: u64,
}

impl GapAwareConverter {
    pub fn new(mut regions: Vec<EuchromaticRegions>) -> Result<Self, CoordError> {
        regions.sort_by_cached_key(|r| fold_name(&r.name));

        let mut chroms = Vec::with_capacity(regions.len());
        let mut index = HashMap::with_capacity(regions.len());
        let mut offset = 0u64;
        for entry in regions {
            if index.insert(fold_name(&entry.name), chroms.len()).is_some() {
                return Err(CoordError::DuplicateChromosome(entry.name));
            }
            let end = offset
                .checked_add(entry.euchromatic_size())
                .ok_or(CoordError::GenomeOverflow)?;
            chroms.push(GapAwareChrom {
                span: ChromSpan {
                    name: entry.name.clone(),
                    start: offset,
                    end,
                },
                regions: entry,
            });
            offset = end;
        }

        Ok(Self {
            chroms,
            index,
            genome_size: offset,
        })
    }

    pub fn transform(&self, chrom: &str, pos: u64) -> Result<u64, CoordError> {
        let entry = self
            .index
            .get(&fold_name(chrom))
            .map(|&idx| &self.chroms[idx])
            .ok_or_else(|| CoordError::UnknownChromosome(chrom.to_string()))?;

        let offset = entry.span.start;
        let gap = entry.regions.gap();
        if pos <= gap.start {
            Ok(offset + pos)
        } else if pos < gap.end {
            Err(CoordError::PericentromericPosition {
                chromosome: entry.span.name.clone(),
                position: pos,
                gap_start: gap.start,
                gap_end: gap.end,
            })
        } else {
            // offset + gap.start never exceeds the span end
            (offset + gap.start)
                .checked_add(pos - gap.end)
                .ok_or_else(|| position_overflow(&entry.span, pos))
        }
    }

    pub fn transform_bytes(&self, chrom: &[u8], pos: u64) -> Result<u64, CoordError> {
        self.transform(decode_name(chrom)?, pos)
    }

    pub fn spans(&self) -> impl ExactSizeIterator<Item = &ChromSpan> {
        self.chroms.iter().map(|c| &c.span)
    }

    /// Linear position of each chromosome's pericentromeric start.
    pub fn pericentromeric_starts(&self) -> Vec<(&str, u64)> {
        self.chroms
            .iter()
            .map(|c| (c.span.name.as_str(), c.span.start + c.regions.gap().start))
            .collect()
    }

    pub fn genome_size(&self) -> u64 {
        self.genome_size
    }
}

/// The two coordinate layouts are exclusive alternatives sharing `transform`.
#[derive(Debug, Clone)]
pub enum CoordinateConverter {
    Linear(LinearConverter),
    GapAware(GapAwareConverter),
}

impl CoordinateConverter {
    pub fn linear(sizes: &GenomeSizes) -> Self {
        Self::Linear(LinearConverter::new(sizes))
    }

    pub fn gap_aware(regions: Vec<EuchromaticRegions>) -> Result<Self, CoordError> {
        GapAwareConverter::new(regions).map(Self::GapAware)
    }

    pub fn transform(&self, chrom: &str, pos: u64) -> Result<u64, CoordError> {
        match self {
            Self::Linear(c) => c.transform(chrom, pos),
            Self::GapAware(c) => c.transform(chrom, pos),
        }
    }

    pub fn transform_bytes(&self, chrom: &[u8], pos: u64) -> Result<u64, CoordError> {
        match self {
            Self::Linear(c) => c.transform_bytes(chrom, pos),
            Self::GapAware(c) => c.transform_bytes(chrom, pos),
        }
    }

    /// Chromosome spans in linear order.
    pub fn spans(&self) -> Vec<&ChromSpan> {
        match self {
            Self::Linear(c) => c.spans().iter().collect(),
            Self::GapAware(c) => c.spans().collect(),
        }
    }

    /// Linear positions where a pericentromeric gap was removed. Empty for the
    /// linear layout.
    pub fn pericentromeric_starts(&self) -> Vec<(&str, u64)> {
        match self {
            Self::Linear(_) => Vec::new(),
            Self::GapAware(c) => c.pericentromeric_starts(),
        }
    }

    pub fn genome_size(&self) -> u64 {
        match self {
            Self::Linear(c) => c.genome_size(),
            Self::GapAware(c) => c.genome_size(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::GapAware(_) => "gap_aware",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Interval, parse_genome_sizes};

    fn two_chrom_genome() -> LinearConverter {
        let sizes = parse_genome_sizes("chr1\t1000\nchr2\t500\n").unwrap();
        LinearConverter::new(&sizes)
    }

    fn arms(name: &str, a_end: u64, b_start: u64, b_end: u64) -> EuchromaticRegions {
        EuchromaticRegions::new(
            name,
            Interval { start: 0, end: a_end },
            Interval {
                start: b_start,
                end: b_end,
            },
        )
        .unwrap()
    }

    #[test]
    fn spans_follow_sorted_names() {
        let converter = two_chrom_genome();
        let spans = converter.spans();
        assert_eq!((spans[0].start, spans[0].end), (0, 1000));
        assert_eq!((spans[1].start, spans[1].end), (1000, 1500));
        assert_eq!(converter.genome_size(), 1500);
        assert_eq!(converter.transform("chr2", 1).unwrap(), 1001);
    }

    #[test]
    fn input_order_does_not_change_offsets() {
        let forward = LinearConverter::new(&parse_genome_sizes("b\t5\na\t7\nC\t3\n").unwrap());
        let reverse = LinearConverter::new(&parse_genome_sizes("C\t3\na\t7\nb\t5\n").unwrap());
        assert_eq!(forward.spans(), reverse.spans());
        assert_eq!(forward.offset("a").unwrap(), 0);
        assert_eq!(forward.offset("b").unwrap(), 7);
        assert_eq!(forward.offset("c").unwrap(), 12);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let converter = two_chrom_genome();
        assert_eq!(
            converter.transform("chr1", 5).unwrap(),
            converter.transform("CHR1", 5).unwrap()
        );
    }

    #[test]
    fn byte_names_are_decoded() {
        let converter = two_chrom_genome();
        assert_eq!(converter.transform_bytes(b"chr2", 10).unwrap(), 1010);
        assert_eq!(
            converter.transform_bytes(&[0xff, 0xfe], 1),
            Err(CoordError::UnknownChromosome("\u{fffd}\u{fffd}".into()))
        );
    }

    #[test]
    fn unknown_chromosome_is_reported() {
        let converter = two_chrom_genome();
        let err = converter.transform("chr3", 1).unwrap_err();
        assert_eq!(err, CoordError::UnknownChromosome("chr3".into()));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn gap_aware_boundaries() {
        let converter = GapAwareConverter::new(vec![
            arms("chr2", 50, 60, 100),
            arms("chr1", 100, 150, 400),
        ])
        .unwrap();

        // chr1 contributes 100 + 250 bases, chr2 starts right after
        assert_eq!(converter.genome_size(), 350 + 90);
        assert_eq!(converter.transform("chr1", 100).unwrap(), 100);
        let err = converter.transform("chr1", 101).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            CoordError::PericentromericPosition {
                position: 101,
                gap_start: 100,
                gap_end: 150,
                ..
            }
        ));
        assert_eq!(converter.transform("chr1", 150).unwrap(), 100);
        assert_eq!(converter.transform("chr1", 151).unwrap(), 101);
        assert_eq!(converter.transform("CHR2", 0).unwrap(), 350);
        assert_eq!(converter.transform("chr2", 60).unwrap(), 400);
    }

    #[test]
    fn gap_aware_unknown_chromosome_is_distinct() {
        let converter = GapAwareConverter::new(vec![arms("chr1", 10, 20, 30)]).unwrap();
        let err = converter.transform("chrX", 1).unwrap_err();
        assert_eq!(err, CoordError::UnknownChromosome("chrX".into()));
    }

    #[test]
    fn gap_aware_rejects_duplicates() {
        let err = GapAwareConverter::new(vec![arms("chr1", 10, 20, 30), arms("CHR1", 1, 2, 3)])
            .unwrap_err();
        assert!(matches!(err, CoordError::DuplicateChromosome(_)));
    }

    #[test]
    fn pericentromeric_starts_are_linear() {
        let converter = CoordinateConverter::gap_aware(vec![
            arms("chr1", 100, 150, 400),
            arms("chr2", 50, 60, 100),
        ])
        .unwrap();
        assert_eq!(
            converter.pericentromeric_starts(),
            vec![("chr1", 100), ("chr2", 400)]
        );
        assert_eq!(converter.kind(), "gap_aware");
    }

    #[test]
    fn oversized_positions_are_errors() {
        let sizes = parse_genome_sizes("chr1\t18446744073709551614\nchr2\t1\n").unwrap();
        let converter = LinearConverter::new(&sizes);
        assert_eq!(converter.genome_size(), u64::MAX);
        assert_eq!(converter.offset("chr2").unwrap(), u64::MAX - 1);
        let err = converter.transform("chr2", u64::MAX).unwrap_err();
        assert_eq!(
            err,
            CoordError::PositionOverflow {
                chromosome: "chr2".into(),
                position: u64::MAX
            }
        );
        assert!(!err.is_recoverable());

        let gapped =
            GapAwareConverter::new(vec![arms("chr1", 100, 150, 400), arms("chr2", 10, 20, 30)])
                .unwrap();
        assert!(matches!(
            gapped.transform("chr2", u64::MAX),
            Err(CoordError::PositionOverflow { .. })
        ));
    }

    #[test]
    fn gap_aware_total_must_fit() {
        let huge = arms("chr1", u64::MAX, u64::MAX, u64::MAX);
        let err = GapAwareConverter::new(vec![huge, arms("chr2", 1, 1, 1)]).unwrap_err();
        assert_eq!(err, CoordError::GenomeOverflow);
    }

    #[test]
    fn linear_variant_has_no_gaps() {
        let sizes = parse_genome_sizes("chr1\t1000\n").unwrap();
        let converter = CoordinateConverter::linear(&sizes);
        assert!(converter.pericentromeric_starts().is_empty());
        assert_eq!(converter.spans().len(), 1);
    }
}

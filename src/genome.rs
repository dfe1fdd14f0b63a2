//! Chromosome size tables and euchromatic region tables.
//!
//! Both are small line-oriented text files. Chromosome names are matched
//! case-insensitively everywhere in the crate; the original spelling is kept
//! for labels.

use std::{collections::HashMap, io, num::ParseIntError, path::Path};

use thiserror::Error;

use crate::smart_reader;

/// Errors raised while reading a genome index or region table.
#[derive(Debug, Error)]
pub enum GenomeIndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed index at line {line} ({raw:?}): {kind}")]
    Malformed {
        line: usize,
        raw: String,
        #[source]
        kind: MalformedKind,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedKind {
    #[error("expected at least {expected} whitespace-delimited fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid integer field {field:?}: {source}")]
    InvalidInteger {
        field: String,
        #[source]
        source: ParseIntError,
    },
    #[error("chromosome length must be positive")]
    NonPositiveLength,
    #[error("chromosome {0} is listed more than once")]
    DuplicateChromosome(String),
    #[error("regions must satisfy a_start <= a_end <= b_start <= b_end")]
    UnorderedRegions,
    #[error("total genome length exceeds {}", u64::MAX)]
    Overflow,
}

fn malformed(line: usize, raw: &str, kind: MalformedKind) -> GenomeIndexError {
    GenomeIndexError::Malformed {
        line,
        raw: raw.to_string(),
        kind,
    }
}

/// Case-folded lookup key for a chromosome name.
pub fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeSize {
    pub name: String,
    pub length: u64,
}

/// Chromosome name → length in base pairs. The summed length always fits
/// in a `u64`.
#[derive(Debug, Clone, Default)]
pub struct GenomeSizes {
    chromosomes: Vec<ChromosomeSize>,
    by_name: HashMap<String, usize>,
    total: u64,
}

impl GenomeSizes {
    pub fn from_path(path: &Path) -> Result<Self, GenomeIndexError> {
        let text = smart_reader::read_to_string(path)?;
        parse_genome_sizes(&text)
    }

    /// Build from already validated `(name, length)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, GenomeIndexError>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut sizes = Self::default();
        for (idx, (name, length)) in pairs.into_iter().enumerate() {
            let name = name.into();
            sizes.insert(idx + 1, &name, name.clone(), length)?;
        }
        Ok(sizes)
    }

    fn insert(
        &mut self,
        line: usize,
        raw: &str,
        name: String,
        length: u64,
    ) -> Result<(), GenomeIndexError> {
        if length == 0 {
            return Err(malformed(line, raw, MalformedKind::NonPositiveLength));
        }
        let key = fold_name(&name);
        if self.by_name.contains_key(&key) {
            return Err(malformed(line, raw, MalformedKind::DuplicateChromosome(name)));
        }
        self.total = self
            .total
            .checked_add(length)
            .ok_or_else(|| malformed(line, raw, MalformedKind::Overflow))?;
        self.by_name.insert(key, self.chromosomes.len());
        self.chromosomes.push(ChromosomeSize { name, length });
        Ok(())
    }

    /// Length of `name`, matched case-insensitively.
    pub fn length(&self, name: &str) -> Option<u64> {
        self.by_name
            .get(&fold_name(name))
            .map(|&idx| self.chromosomes[idx].length)
    }

    /// Chromosomes in input order.
    pub fn chromosomes(&self) -> &[ChromosomeSize] {
        &self.chromosomes
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.total
    }
}

/// Parse a `.fai`-style index: the first two fields of every non-blank line
/// are the chromosome name and its length; further fields are ignored.
pub fn parse_genome_sizes(text: &str) -> Result<GenomeSizes, GenomeIndexError> {
    let mut sizes = GenomeSizes::default();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let mut fields = raw.split_whitespace();
        let (Some(name), Some(length)) = (fields.next(), fields.next()) else {
            return Err(malformed(
                line,
                raw,
                MalformedKind::FieldCount {
                    expected: 2,
                    found: raw.split_whitespace().count(),
                },
            ));
        };
        let length = parse_u64(line, raw, length)?;
        sizes.insert(line, raw, name.to_string(), length)?;
    }
    Ok(sizes)
}

fn parse_u64(line: usize, raw: &str, field: &str) -> Result<u64, GenomeIndexError> {
    field.parse::<u64>().map_err(|source| {
        malformed(
            line,
            raw,
            MalformedKind::InvalidInteger {
                field: field.to_string(),
                source,
            },
        )
    })
}

/// Half-open interval in source (per-chromosome) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// The two euchromatic arms of a chromosome, separated by the
/// pericentromeric gap `[arm_a.end, arm_b.start)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EuchromaticRegions {
    pub name: String,
    pub arm_a: Interval,
    pub arm_b: Interval,
}

impl EuchromaticRegions {
    pub fn new(name: impl Into<String>, arm_a: Interval, arm_b: Interval) -> Option<Self> {
        let ordered =
            arm_a.start <= arm_a.end && arm_a.end <= arm_b.start && arm_b.start <= arm_b.end;
        ordered.then(|| Self {
            name: name.into(),
            arm_a,
            arm_b,
        })
    }

    pub fn gap(&self) -> Interval {
        Interval {
            start: self.arm_a.end,
            end: self.arm_b.start,
        }
    }

    /// Length this chromosome contributes to the linear genome. Never more
    /// than `arm_b.end`, so it cannot overflow.
    pub fn euchromatic_size(&self) -> u64 {
        self.arm_a.end + self.arm_b.len()
    }
}

pub fn read_euchromatic_regions(path: &Path) -> Result<Vec<EuchromaticRegions>, GenomeIndexError> {
    let text = smart_reader::read_to_string(path)?;
    parse_euchromatic_regions(&text)
}

/// Parse `<name> <a_start> <a_end> <b_start> <b_end>` lines. `#` lines and
/// blank lines are skipped.
pub fn parse_euchromatic_regions(
    text: &str,
) -> Result<Vec<EuchromaticRegions>, GenomeIndexError> {
    let mut regions: Vec<EuchromaticRegions> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut total = 0u64;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(malformed(
                line,
                raw,
                MalformedKind::FieldCount {
                    expected: 5,
                    found: fields.len(),
                },
            ));
        }
        let name = fields[0];
        let a_start = parse_u64(line, raw, fields[1])?;
        let a_end = parse_u64(line, raw, fields[2])?;
        let b_start = parse_u64(line, raw, fields[3])?;
        let b_end = parse_u64(line, raw, fields[4])?;

        let entry = EuchromaticRegions::new(
            name,
            Interval {
                start: a_start,
                end: a_end,
            },
            Interval {
                start: b_start,
                end: b_end,
            },
        )
        .ok_or_else(|| malformed(line, raw, MalformedKind::UnorderedRegions))?;

        if entry.euchromatic_size() == 0 {
            return Err(malformed(line, raw, MalformedKind::NonPositiveLength));
        }
        if seen.insert(fold_name(name), regions.len()).is_some() {
            return Err(malformed(
                line,
                raw,
                MalformedKind::DuplicateChromosome(name.to_string()),
            ));
        }
        total = total
            .checked_add(entry.euchromatic_size())
            .ok_or_else(|| malformed(line, raw, MalformedKind::Overflow))?;
        regions.push(entry);
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(err: GenomeIndexError) -> MalformedKind {
        match err {
            GenomeIndexError::Malformed { kind, .. } => kind,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parses_fai_and_ignores_extra_fields() {
        let sizes = parse_genome_sizes("chr1\t1000\t6\t60\t61\n\nchr2\t500\n").unwrap();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes.length("chr1"), Some(1000));
        assert_eq!(sizes.length("CHR2"), Some(500));
        assert_eq!(sizes.total_length(), 1500);
    }

    #[test]
    fn blank_and_whitespace_lines_are_skipped() {
        let sizes = parse_genome_sizes("\n   \nchr1 10\n\t\n").unwrap();
        assert_eq!(sizes.chromosomes().len(), 1);
    }

    #[test]
    fn rejects_non_integer_length() {
        let err = parse_genome_sizes("chr1\tabc\n").unwrap_err();
        assert!(matches!(kind(err), MalformedKind::InvalidInteger { .. }));
    }

    #[test]
    fn rejects_negative_and_zero_lengths() {
        let err = parse_genome_sizes("chr1\t-5\n").unwrap_err();
        assert!(matches!(kind(err), MalformedKind::InvalidInteger { .. }));
        let err = parse_genome_sizes("chr1\t0\n").unwrap_err();
        assert_eq!(kind(err), MalformedKind::NonPositiveLength);
    }

    #[test]
    fn rejects_missing_length() {
        let err = parse_genome_sizes("chr1\n").unwrap_err();
        assert_eq!(
            kind(err),
            MalformedKind::FieldCount {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn rejects_case_folded_duplicates() {
        let err = parse_genome_sizes("chr1\t10\nCHR1\t20\n").unwrap_err();
        match err {
            GenomeIndexError::Malformed { line, kind, .. } => {
                assert_eq!(line, 2);
                assert_eq!(kind, MalformedKind::DuplicateChromosome("CHR1".into()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_lengths_summing_past_u64() {
        let err = parse_genome_sizes("chr1\t18446744073709551614\nchr2\t10\n").unwrap_err();
        match err {
            GenomeIndexError::Malformed { line, kind, .. } => {
                assert_eq!(line, 2);
                assert_eq!(kind, MalformedKind::Overflow);
            }
            other => panic!("unexpected error: {other}"),
        }

        let sizes = parse_genome_sizes("chr1\t18446744073709551614\nchr2\t1\n").unwrap();
        assert_eq!(sizes.total_length(), u64::MAX);
    }

    #[test]
    fn rejects_regions_summing_past_u64() {
        let text = format!("chr1\t0\t{max}\t{max}\t{max}\nchr2\t0\t1\t1\t1\n", max = u64::MAX);
        let err = parse_euchromatic_regions(&text).unwrap_err();
        assert_eq!(kind(err), MalformedKind::Overflow);
    }

    #[test]
    fn parses_euchromatic_regions() {
        let text = "# name a_start a_end b_start b_end\nchr1\t0\t100\t150\t400\n";
        let regions = parse_euchromatic_regions(text).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].gap(), Interval { start: 100, end: 150 });
        assert_eq!(regions[0].euchromatic_size(), 350);
    }

    #[test]
    fn rejects_overlapping_arms() {
        let err = parse_euchromatic_regions("chr1\t0\t200\t150\t400\n").unwrap_err();
        assert_eq!(kind(err), MalformedKind::UnorderedRegions);
    }
}

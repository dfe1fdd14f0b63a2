//! Phenotype sheets (input) and per-trait plink phenotype files (output).

use std::{
    collections::HashSet,
    io::{self, BufRead, Write},
    path::Path,
};

use thiserror::Error;

use crate::smart_reader;

/// Header of the accession column in a phenotype sheet.
pub const SAMPLE_COLUMN: &str = "SAMPLE_NAME";

/// Case/control coding accepted for qualitative traits (-9 = missing).
pub const QUALITATIVE_CODES: [i64; 4] = [0, 1, 2, -9];

#[derive(Debug, Error)]
pub enum PhenotypeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("phenotype sheet has no header line")]
    MissingHeader,
    #[error("phenotype sheet has no SAMPLE_NAME column")]
    MissingSampleColumn,
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: value {value:?} for trait {trait_name} is not a number")]
    InvalidValue {
        line: usize,
        trait_name: String,
        value: String,
    },
    #[error("unknown trait: {0}")]
    UnknownTrait(String),
    #[error("phenotypes should be 0, 1, 2 or -9, but there is {value} for sample {sample}")]
    InvalidPhenotype { sample: String, value: f64 },
}

/// Samples × traits sheet. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeTable {
    samples: Vec<String>,
    traits: Vec<(String, Vec<Option<f64>>)>,
}

fn is_missing(raw: &str) -> bool {
    matches!(raw, "" | "NA" | "na" | "nan" | "NaN")
}

impl PhenotypeTable {
    pub fn from_path(path: &Path) -> Result<Self, PhenotypeError> {
        Self::read(smart_reader::open_input(path)?)
    }

    /// Tab-delimited sheet with a header row. Cells may be empty, so fields are
    /// split on tabs; a sheet without tabs falls back to whitespace splitting.
    pub fn read<R: BufRead>(reader: R) -> Result<Self, PhenotypeError> {
        let mut lines = reader.lines().enumerate();
        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(PhenotypeError::MissingHeader),
            }
        };
        let tabbed = header.contains('\t');
        let split = |line: &str| -> Vec<String> {
            if tabbed {
                line.split('\t').map(|f| f.trim().to_string()).collect()
            } else {
                line.split_whitespace().map(str::to_string).collect()
            }
        };

        let names = split(&header);
        let sample_pos = names
            .iter()
            .position(|n| n == SAMPLE_COLUMN)
            .ok_or(PhenotypeError::MissingSampleColumn)?;

        let mut samples = Vec::new();
        let mut traits: Vec<(String, Vec<Option<f64>>)> = names
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != sample_pos)
            .map(|(_, name)| (name.clone(), Vec::new()))
            .collect();

        for (idx, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split(&line);
            if fields.len() != names.len() {
                return Err(PhenotypeError::FieldCount {
                    line: idx + 1,
                    expected: names.len(),
                    found: fields.len(),
                });
            }
            let mut trait_idx = 0;
            for (col, raw) in fields.into_iter().enumerate() {
                if col == sample_pos {
                    samples.push(raw);
                    continue;
                }
                let (name, values) = &mut traits[trait_idx];
                trait_idx += 1;
                if is_missing(&raw) {
                    values.push(None);
                    continue;
                }
                let value = raw.parse::<f64>().map_err(|_| PhenotypeError::InvalidValue {
                    line: idx + 1,
                    trait_name: name.clone(),
                    value: raw.clone(),
                })?;
                values.push(Some(value));
            }
        }

        Ok(Self { samples, traits })
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn trait_names(&self) -> Vec<&str> {
        self.traits.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// `(accession, value)` pairs for one trait in sheet order, skipping
    /// missing values and samples outside `keep` when given.
    pub fn phenotypes(
        &self,
        trait_name: &str,
        keep: Option<&HashSet<String>>,
    ) -> Result<Vec<(String, f64)>, PhenotypeError> {
        let (_, values) = self
            .traits
            .iter()
            .find(|(name, _)| name == trait_name)
            .ok_or_else(|| PhenotypeError::UnknownTrait(trait_name.to_string()))?;

        Ok(self
            .samples
            .iter()
            .zip(values)
            .filter(|(sample, _)| keep.is_none_or(|keep| keep.contains(*sample)))
            .filter_map(|(sample, value)| value.map(|v| (sample.clone(), v)))
            .collect())
    }
}

fn qualitative_code(value: f64) -> Option<i64> {
    if value.fract() != 0.0 {
        return None;
    }
    let code = value as i64;
    QUALITATIVE_CODES.contains(&code).then_some(code)
}

/// Write `<acc>\t<acc>\t<value>` lines. Qualitative values are validated
/// against [`QUALITATIVE_CODES`] before anything is written.
pub fn write_phenotype_file<W: Write>(
    phenotypes: &[(String, f64)],
    mut writer: W,
    qualitative: bool,
) -> Result<(), PhenotypeError> {
    if qualitative {
        for (sample, value) in phenotypes {
            if qualitative_code(*value).is_none() {
                return Err(PhenotypeError::InvalidPhenotype {
                    sample: sample.clone(),
                    value: *value,
                });
            }
        }
    }

    for (sample, value) in phenotypes {
        match qualitative.then(|| qualitative_code(*value)).flatten() {
            Some(code) => writeln!(writer, "{sample}\t{sample}\t{code}")?,
            None => writeln!(writer, "{sample}\t{sample}\t{value}")?,
        }
    }
    writer.flush()?;
    Ok(())
}

/// One accession per line (first field); blank and `#` lines are skipped.
pub fn read_sample_list(path: &Path) -> io::Result<HashSet<String>> {
    let text = smart_reader::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SHEET: &str = "SAMPLE_NAME\tweight\tcolor\nA\t1.5\t1\nB\tNA\t2\nC\t3\t\n";

    #[test]
    fn qualitative_file_has_one_line_per_sample() {
        let mut out = Vec::new();
        let phenotypes = vec![("A".to_string(), 1.0), ("B".to_string(), 2.0)];
        write_phenotype_file(&phenotypes, &mut out, true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A\tA\t1\nB\tB\t2\n");
    }

    #[test]
    fn qualitative_rejects_values_outside_codes() {
        let mut out = Vec::new();
        let phenotypes = vec![("A".to_string(), 1.0), ("B".to_string(), 3.0)];
        let err = write_phenotype_file(&phenotypes, &mut out, true).unwrap_err();
        assert!(matches!(
            err,
            PhenotypeError::InvalidPhenotype { ref sample, value } if sample == "B" && value == 3.0
        ));
        assert!(out.is_empty());

        let err = write_phenotype_file(&[("C".to_string(), 0.5)], Vec::new(), true).unwrap_err();
        assert!(matches!(err, PhenotypeError::InvalidPhenotype { .. }));
    }

    #[test]
    fn missing_code_is_accepted() {
        let mut out = Vec::new();
        write_phenotype_file(&[("A".to_string(), -9.0)], &mut out, true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A\tA\t-9\n");
    }

    #[test]
    fn quantitative_values_are_written_verbatim() {
        let mut out = Vec::new();
        write_phenotype_file(&[("A".to_string(), 12.25)], &mut out, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A\tA\t12.25\n");
    }

    #[test]
    fn reads_sheet_and_skips_missing_cells() {
        let table = PhenotypeTable::read(Cursor::new(SHEET)).unwrap();
        assert_eq!(table.trait_names(), vec!["weight", "color"]);
        assert_eq!(
            table.phenotypes("weight", None).unwrap(),
            vec![("A".to_string(), 1.5), ("C".to_string(), 3.0)]
        );
        assert_eq!(
            table.phenotypes("color", None).unwrap(),
            vec![("A".to_string(), 1.0), ("B".to_string(), 2.0)]
        );
    }

    #[test]
    fn sample_allow_list_filters_rows() {
        let table = PhenotypeTable::read(Cursor::new(SHEET)).unwrap();
        let keep: HashSet<String> = ["B".to_string()].into_iter().collect();
        assert_eq!(
            table.phenotypes("color", Some(&keep)).unwrap(),
            vec![("B".to_string(), 2.0)]
        );
    }

    #[test]
    fn unknown_trait_and_missing_sample_column() {
        let table = PhenotypeTable::read(Cursor::new(SHEET)).unwrap();
        assert!(matches!(
            table.phenotypes("height", None),
            Err(PhenotypeError::UnknownTrait(_))
        ));
        let err = PhenotypeTable::read(Cursor::new("ID\tweight\nA\t1\n")).unwrap_err();
        assert!(matches!(err, PhenotypeError::MissingSampleColumn));
    }

    #[test]
    fn non_numeric_cell_is_reported_with_line() {
        let err = PhenotypeTable::read(Cursor::new("SAMPLE_NAME\tw\nA\theavy\n")).unwrap_err();
        assert!(matches!(err, PhenotypeError::InvalidValue { line: 2, .. }));
    }

    #[test]
    fn sample_list_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.txt");
        std::fs::write(&path, "# keep\nA\n\nB extra\n").unwrap();
        let samples = read_sample_list(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.contains("A") && samples.contains("B"));
    }
}

//! Whitespace-delimited result tables produced by the external tool.

use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use thiserror::Error;

use crate::smart_reader;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("table is missing a header line")]
    MissingHeader,
    #[error("index column {0:?} not found in header")]
    MissingIndexColumn(String),
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid number {value:?} in column {column}")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },
}

/// One named column. Columns whose every cell parses as a number (or a
/// missing-value token) are numeric; anything else is kept as text.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    fn take(&self, order: &[usize]) -> Self {
        match self {
            Self::Numeric(values) => Self::Numeric(order.iter().map(|&i| values[i]).collect()),
            Self::Text(values) => Self::Text(order.iter().map(|&i| values[i].clone()).collect()),
        }
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Self::Numeric(values) => format_number(values[row]),
            Self::Text(values) => values[row].clone(),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::from("NA")
    } else {
        value.to_string()
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    match raw {
        "NA" | "nan" | "NaN" | "." => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

/// A table indexed by string identifiers (variant or sample IDs).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    index_name: String,
    index: Vec<String>,
    columns: Vec<(String, Column)>,
}

impl ResultTable {
    pub fn from_path(path: &Path, index_column: &str) -> Result<Self, TableError> {
        let reader = smart_reader::open_input(path)?;
        Self::read(reader, index_column)
    }

    /// Read a header + rows table; `index_column` names the identifier column.
    pub fn read<R: BufRead>(reader: R, index_column: &str) -> Result<Self, TableError> {
        let mut lines = reader.lines().enumerate();
        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(TableError::MissingHeader),
            }
        };
        let names: Vec<String> = header.split_whitespace().map(str::to_string).collect();
        let index_pos = names
            .iter()
            .position(|n| n == index_column)
            .ok_or_else(|| TableError::MissingIndexColumn(index_column.to_string()))?;

        let mut index = Vec::new();
        let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (idx, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != names.len() {
                return Err(TableError::FieldCount {
                    line: idx + 1,
                    expected: names.len(),
                    found: fields.len(),
                });
            }
            for (col, field) in fields.iter().enumerate() {
                if col == index_pos {
                    index.push(field.to_string());
                } else {
                    raw_columns[col].push(field.to_string());
                }
            }
        }

        let columns = names
            .into_iter()
            .zip(raw_columns)
            .enumerate()
            .filter(|(col, _)| *col != index_pos)
            .map(|(_, (name, values))| {
                let numeric: Option<Vec<f64>> = values.iter().map(|v| parse_number(v)).collect();
                let column = match numeric {
                    Some(numbers) => Column::Numeric(numbers),
                    None => Column::Text(values),
                };
                (name, column)
            })
            .collect();

        Ok(Self {
            index_name: index_column.to_string(),
            index,
            columns,
        })
    }

    /// Read a table with `prefix` leading identifier columns followed by
    /// numeric columns. The first column becomes the index; the rest of the
    /// prefix is discarded.
    pub fn read_with_prefix<R: BufRead>(reader: R, prefix: usize) -> Result<Self, TableError> {
        let mut lines = reader.lines().enumerate();
        let header = match lines.next() {
            Some((_, line)) => line?,
            None => return Err(TableError::MissingHeader),
        };
        let header: Vec<&str> = header.split_whitespace().collect();
        if header.len() < prefix.max(1) {
            return Err(TableError::FieldCount {
                line: 1,
                expected: prefix.max(1),
                found: header.len(),
            });
        }
        let index_name = header[0].trim_start_matches('#').to_string();
        let names: Vec<String> = header[prefix..].iter().map(|s| s.to_string()).collect();

        let mut index = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        for (idx, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != prefix + names.len() {
                return Err(TableError::FieldCount {
                    line: idx + 1,
                    expected: prefix + names.len(),
                    found: fields.len(),
                });
            }
            index.push(fields[0].to_string());
            for (col, raw) in fields[prefix..].iter().enumerate() {
                let value = parse_number(raw).ok_or_else(|| TableError::InvalidNumber {
                    line: idx + 1,
                    column: names[col].clone(),
                    value: raw.to_string(),
                })?;
                values[col].push(value);
            }
        }

        Ok(Self {
            index_name,
            index,
            columns: names
                .into_iter()
                .zip(values)
                .map(|(name, v)| (name, Column::Numeric(v)))
                .collect(),
        })
    }

    /// Rename the index and columns through `rename`; names it returns `None`
    /// for pass through unchanged.
    pub fn renamed<F>(self, rename: F) -> Self
    where
        F: Fn(&str) -> Option<&'static str>,
    {
        let index_name = rename(&self.index_name)
            .map(str::to_string)
            .unwrap_or(self.index_name);
        let columns = self
            .columns
            .into_iter()
            .map(|(name, column)| {
                let name = rename(&name).map(str::to_string).unwrap_or(name);
                (name, column)
            })
            .collect();
        Self {
            index_name,
            index: self.index,
            columns,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.column(name)? {
            Column::Numeric(values) => Some(values),
            Column::Text(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// New table with rows in `order` (indices into this table).
    pub fn take_rows(&self, order: &[usize]) -> Self {
        Self {
            index_name: self.index_name.clone(),
            index: order.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.take(order)))
                .collect(),
        }
    }

    /// First `n` rows, or the whole table if it is shorter.
    pub fn head(&self, n: usize) -> Self {
        let order: Vec<usize> = (0..n.min(self.len())).collect();
        self.take_rows(&order)
    }

    /// Write the index plus the selected columns (all columns when `columns`
    /// is `None`) as delimited text. Unknown column names are skipped.
    pub fn write_delimited<W: Write>(
        &self,
        mut writer: W,
        columns: Option<&[&str]>,
        delimiter: char,
    ) -> io::Result<()> {
        let selected: Vec<&(String, Column)> = match columns {
            Some(names) => names
                .iter()
                .filter_map(|name| self.columns.iter().find(|(n, _)| n == name))
                .collect(),
            None => self.columns.iter().collect(),
        };
        let sep = delimiter.to_string();

        let mut header = vec![self.index_name.clone()];
        header.extend(selected.iter().map(|(name, _)| name.clone()));
        writeln!(writer, "{}", header.join(&sep))?;

        for (row, id) in self.index.iter().enumerate() {
            let mut fields = vec![id.clone()];
            fields.extend(selected.iter().map(|(_, column)| column.cell(row)));
            writeln!(writer, "{}", fields.join(&sep))?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ADJUSTED: &str = "\
#CHROM\tID\tA1\tUNADJ\tGC\tFDR_BH
1\t1:100\tA\t1e-8\t2e-8\t0.001
2\t2:5\tG\t0.04\tNA\t0.5
";

    #[test]
    fn reads_indexed_table_with_mixed_columns() {
        let table = ResultTable::read(Cursor::new(ADJUSTED), "ID").unwrap();
        assert_eq!(table.index(), &["1:100".to_string(), "2:5".to_string()]);
        assert_eq!(table.index_name(), "ID");
        assert_eq!(table.numeric("UNADJ").unwrap(), &[1e-8, 0.04]);
        assert!(table.numeric("GC").unwrap()[1].is_nan());
        assert!(matches!(table.column("A1"), Some(Column::Text(_))));
        assert!(matches!(table.column("#CHROM"), Some(Column::Numeric(_))));
    }

    #[test]
    fn header_only_table_is_empty() {
        let table = ResultTable::read(Cursor::new("#CHROM\tID\tUNADJ\n"), "ID").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names().count(), 2);
    }

    #[test]
    fn missing_index_column_is_an_error() {
        let err = ResultTable::read(Cursor::new("A\tB\n1\t2\n"), "ID").unwrap_err();
        assert!(matches!(err, TableError::MissingIndexColumn(_)));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = ResultTable::read(Cursor::new("ID\tP\nrs1\n"), "ID").unwrap_err();
        assert!(matches!(
            err,
            TableError::FieldCount {
                line: 2,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn renaming_passes_unknown_names_through() {
        let table = ResultTable::read(Cursor::new(ADJUSTED), "ID")
            .unwrap()
            .renamed(|name| match name {
                "ID" => Some("variant_id"),
                "UNADJ" => Some("pval"),
                _ => None,
            });
        assert_eq!(table.index_name(), "variant_id");
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["#CHROM", "A1", "pval", "GC", "FDR_BH"]);
    }

    #[test]
    fn prefix_columns_are_skipped() {
        let text = "FID IID SOL C1 C2\ns1 s1 0 0.5 -0.25\ns2 s2 0 -0.5 0.25\n";
        let table = ResultTable::read_with_prefix(Cursor::new(text), 3).unwrap();
        assert_eq!(table.index(), &["s1".to_string(), "s2".to_string()]);
        assert_eq!(table.numeric("C1").unwrap(), &[0.5, -0.5]);
        assert_eq!(table.numeric("C2").unwrap(), &[-0.25, 0.25]);
    }

    #[test]
    fn prefix_table_rejects_text_values() {
        let err = ResultTable::read_with_prefix(Cursor::new("F I S C1\na a 0 x\n"), 3).unwrap_err();
        assert!(matches!(err, TableError::InvalidNumber { line: 2, .. }));
    }

    #[test]
    fn head_and_delimited_output() {
        let table = ResultTable::read(Cursor::new(ADJUSTED), "ID").unwrap();
        let mut out = Vec::new();
        table
            .head(1)
            .write_delimited(&mut out, Some(&["UNADJ", "missing", "FDR_BH"]), ',')
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "ID,UNADJ,FDR_BH\n1:100,0.00000001,0.001\n");
    }

    #[test]
    fn take_rows_reorders_every_column() {
        let table = ResultTable::read(Cursor::new(ADJUSTED), "ID").unwrap();
        let reordered = table.take_rows(&[1, 0]);
        assert_eq!(reordered.index()[0], "2:5");
        assert_eq!(reordered.numeric("UNADJ").unwrap(), &[0.04, 1e-8]);
    }
}

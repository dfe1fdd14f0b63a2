//! Structured run report for downstream tool consumption.
//!
//! Written as JSON next to the per-trait directories: the coordinate system
//! used for plotting and the outcome of every analysed trait.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::coords::CoordinateConverter;
use crate::gwas::GenomeOrder;
use crate::plink::BfileSet;

/// Complete report of an aggregator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Tool version
    pub version: String,
    /// Timestamp of run (RFC 3339)
    pub timestamp: String,
    pub name: String,
    pub bfiles: String,
    pub coordinates: CoordinateInfo,
    pub traits: Vec<TraitReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinateInfo {
    /// `linear` or `gap_aware`
    pub kind: String,
    pub genome_size: u64,
    pub chromosomes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitStatus {
    Tested,
    NoValidTests,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraitReport {
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub status: TraitStatus,
    /// Samples written to the phenotype file
    pub samples: usize,
    pub tested_variants: usize,
    pub plotted_variants: usize,
    pub pericentromeric_dropped: usize,
    pub unresolved_variants: usize,
    pub files: Vec<String>,
}

impl TraitReport {
    pub fn no_valid_tests(trait_name: &str, samples: usize) -> Self {
        Self {
            trait_name: trait_name.to_string(),
            status: TraitStatus::NoValidTests,
            samples,
            tested_variants: 0,
            plotted_variants: 0,
            pericentromeric_dropped: 0,
            unresolved_variants: 0,
            files: Vec::new(),
        }
    }

    pub fn tested(
        trait_name: &str,
        samples: usize,
        tested_variants: usize,
        order: &GenomeOrder,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            trait_name: trait_name.to_string(),
            status: TraitStatus::Tested,
            samples,
            tested_variants,
            plotted_variants: order.rows.len(),
            pericentromeric_dropped: order.pericentromeric,
            unresolved_variants: order.unresolved,
            files: files
                .iter()
                .map(|path| path.to_string_lossy().to_string())
                .collect(),
        }
    }
}

impl RunReport {
    pub fn new(name: &str, bfiles: &BfileSet, converter: &CoordinateConverter) -> Self {
        let now = time::OffsetDateTime::now_utc();
        let timestamp = now
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        RunReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp,
            name: name.to_string(),
            bfiles: bfiles.base().to_string_lossy().to_string(),
            coordinates: CoordinateInfo {
                kind: converter.kind().to_string(),
                genome_size: converter.genome_size(),
                chromosomes: converter.spans().len(),
            },
            traits: Vec::new(),
        }
    }

    /// Write the report as `<out_dir>/<name>_report.json`.
    pub fn write(&self, out_dir: &Path) -> std::io::Result<PathBuf> {
        let report_path = out_dir.join(format!("{}_report.json", self.name));
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        std::fs::write(&report_path, json)?;
        tracing::info!("Wrote run report to {}", report_path.display());

        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GenomeSizes;

    #[test]
    fn report_serializes_trait_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let sizes = GenomeSizes::from_pairs([("chr1", 1000), ("chr2", 500)]).unwrap();
        let converter = CoordinateConverter::linear(&sizes);
        let mut report = RunReport::new("run", &BfileSet::new("/data/panel"), &converter);
        report.traits.push(TraitReport::no_valid_tests("color", 12));
        let order = GenomeOrder {
            rows: vec![0, 1],
            coords: vec![5, 1005],
            pericentromeric: 1,
            unresolved: 0,
        };
        report
            .traits
            .push(TraitReport::tested("height", 10, 3, &order, vec![PathBuf::from("a.csv")]));

        let path = report.write(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("run_report.json"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["coordinates"]["kind"], "linear");
        assert_eq!(json["coordinates"]["genome_size"], 1500);
        assert_eq!(json["traits"][0]["status"], "no_valid_tests");
        assert_eq!(json["traits"][1]["trait"], "height");
        assert_eq!(json["traits"][1]["plotted_variants"], 2);
        assert_eq!(json["traits"][1]["pericentromeric_dropped"], 1);
    }
}

#![doc = include_str!("../README.md")]

pub mod cli;
pub mod coords;
pub mod filters;
pub mod genome;
pub mod gwas;
pub mod phenotype;
pub mod pipeline;
pub mod plink;
pub mod plot;
pub mod report;
pub mod runner;
pub mod smart_reader;
pub mod table;

pub use coords::{CoordError, CoordinateConverter, GapAwareConverter, LinearConverter};
pub use filters::VariantFilters;
pub use genome::{EuchromaticRegions, GenomeIndexError, GenomeSizes, parse_genome_sizes};
pub use gwas::{GwasAnalysis, run_gwas_analysis};
pub use pipeline::{GenomeSource, PipelineConfig, StructureCorrection, run_pipeline};
pub use plink::{
    AssociationOutcome, AssociationParams, BfileSet, LdPruneParams, PcaParams, PcaResult,
    StageError, TestFamily, make_bfiles, prune_ld, run_association, run_pca,
};
pub use runner::{ExternalTool, ToolError, ToolFailure};

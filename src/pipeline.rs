//! End-to-end run: VCF conversion, optional population structure correction
//! (LD pruning + PCA), then the per-trait association loop.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    coords::CoordinateConverter,
    filters::VariantFilters,
    genome::{GenomeSizes, read_euchromatic_regions},
    gwas::{DEFAULT_TOP_N, GwasAnalysis, run_gwas_analysis},
    phenotype::{PhenotypeTable, read_sample_list},
    plink::{
        BfileSet, LdPruneParams, PCA_MIN_MISSING_RATE, PcaParams, make_bfiles, prune_ld, run_pca,
    },
    report::RunReport,
    runner::ExternalTool,
};

/// Where chromosome lengths come from, which also picks the converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenomeSource {
    /// `.fai`-like size index; every base is on the axis.
    SizeIndex(PathBuf),
    /// Euchromatic arm table; pericentromeres are cut out of the axis.
    EuchromaticRegions(PathBuf),
}

impl GenomeSource {
    pub fn load(&self) -> Result<CoordinateConverter> {
        let converter = match self {
            Self::SizeIndex(path) => {
                let sizes = GenomeSizes::from_path(path)
                    .with_context(|| format!("failed to read genome index {}", path.display()))?;
                CoordinateConverter::linear(&sizes)
            }
            Self::EuchromaticRegions(path) => {
                let regions = read_euchromatic_regions(path).with_context(|| {
                    format!("failed to read euchromatic regions {}", path.display())
                })?;
                CoordinateConverter::gap_aware(regions)?
            }
        };
        tracing::info!(
            kind = converter.kind(),
            genome_size = converter.genome_size(),
            chromosomes = converter.spans().len(),
            "built coordinate converter"
        );
        Ok(converter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureCorrection {
    /// Prune, run PCA and use the eigenvectors as covariates.
    Pca,
    /// No covariates.
    None,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vcf: PathBuf,
    pub phenotypes: PathBuf,
    pub genome: GenomeSource,
    pub out_dir: PathBuf,
    pub name: String,
    pub qualitative: bool,
    pub traits: Option<Vec<String>>,
    pub samples: Option<PathBuf>,
    pub structure: StructureCorrection,
    /// Filters for pruning and PCA.
    pub structure_filters: VariantFilters,
    pub ld: LdPruneParams,
    pub pca: PcaParams,
    pub gwas_filters: Option<VariantFilters>,
    pub top_n: usize,
    pub render_plots: bool,
}

impl PipelineConfig {
    pub fn new(
        vcf: impl Into<PathBuf>,
        phenotypes: impl Into<PathBuf>,
        genome: GenomeSource,
        out_dir: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            vcf: vcf.into(),
            phenotypes: phenotypes.into(),
            genome,
            out_dir: out_dir.into(),
            name: name.into(),
            qualitative: false,
            traits: None,
            samples: None,
            structure: StructureCorrection::Pca,
            structure_filters: VariantFilters::default()
                .with_max_missing_rate(Some(PCA_MIN_MISSING_RATE)),
            ld: LdPruneParams::default(),
            pca: PcaParams::default(),
            gwas_filters: None,
            top_n: DEFAULT_TOP_N,
            render_plots: true,
        }
    }

    fn out_path(&self, suffix: &str) -> PathBuf {
        self.out_dir.join(format!("{}{suffix}", self.name))
    }
}

fn structure_covariates(
    tool: &ExternalTool,
    config: &PipelineConfig,
    bfiles: &BfileSet,
) -> Result<Option<PathBuf>> {
    match config.structure {
        StructureCorrection::None => Ok(None),
        StructureCorrection::Pca => {
            let pca_base = config.out_path(".pca");
            let pruned = config.out_path(".prune.in");
            prune_ld(
                tool,
                bfiles,
                &pca_base,
                &pruned,
                &config.structure_filters,
                &config.ld,
            )?;
            let filters = config.structure_filters.clone().with_keep_list(&pruned);
            let pca = run_pca(tool, bfiles, &pca_base, &filters, &config.pca)?;
            Ok(Some(pca.eigenvec_path))
        }
    }
}

fn load_samples(path: Option<&Path>) -> Result<Option<HashSet<String>>> {
    path.map(|path| {
        read_sample_list(path)
            .with_context(|| format!("failed to read sample list {}", path.display()))
    })
    .transpose()
}

pub fn run_pipeline(tool: &ExternalTool, config: &PipelineConfig) -> Result<RunReport> {
    tracing::info!(
        plink2 = %tool.program().display(),
        vcf = %config.vcf.display(),
        out_dir = %config.out_dir.display(),
        structure = ?config.structure,
        "starting GWAS pipeline"
    );
    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed to create {}", config.out_dir.display()))?;

    // fail on bad inputs before the expensive stages
    let converter = config.genome.load()?;
    let phenotypes = PhenotypeTable::from_path(&config.phenotypes)
        .with_context(|| format!("failed to read phenotypes {}", config.phenotypes.display()))?;
    let keep_samples = load_samples(config.samples.as_deref())?;

    let bfiles = make_bfiles(tool, &config.vcf, &config.out_path(""))?;
    let covariates = structure_covariates(tool, config, &bfiles)?;

    let analysis = GwasAnalysis {
        covariates,
        qualitative: config.qualitative,
        traits: config.traits.clone(),
        keep_samples,
        filters: config.gwas_filters.clone(),
        top_n: config.top_n,
        render_plots: config.render_plots,
        ..GwasAnalysis::new(bfiles, &config.out_dir, &config.name)
    };
    run_gwas_analysis(tool, &analysis, &phenotypes, &converter)
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    filters::VariantFilters,
    gwas::{DEFAULT_TOP_N, GwasAnalysis, run_gwas_analysis},
    phenotype::{PhenotypeTable, read_sample_list},
    pipeline::{GenomeSource, PipelineConfig, StructureCorrection, run_pipeline},
    plink::{
        BfileSet, LdPruneParams, PCA_MIN_MISSING_RATE, PcaParams, WindowUnit, default_bfile_base,
        make_bfiles, prune_ld, run_pca,
    },
    report::{RunReport, TraitStatus},
    runner::{DEFAULT_PROGRAM, ExternalTool},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run plink2 GWAS stages and plot results along the genome", long_about = None)]
struct Cli {
    /// plink2 executable
    #[arg(long, global = true, env = "PLINK2", default_value = DEFAULT_PROGRAM)]
    plink2: PathBuf,

    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a VCF into a plink binary fileset
    MakeBfiles {
        #[arg(long)]
        vcf: PathBuf,
        /// Output base path (defaults to the VCF path without .vcf/.vcf.gz)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the list of LD-independent variants
    PruneLd {
        #[arg(long)]
        bfile: PathBuf,
        /// Base path for captured tool output
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        pruned_list: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        ld: LdArgs,
    },
    /// Principal component analysis of the genotypes
    Pca {
        #[arg(long)]
        bfile: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        pca: PcaArgs,
    },
    /// Association test for every trait, with plots and top hits
    Gwas {
        #[arg(long)]
        bfile: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Covariate file, e.g. a PCA .eigenvec
        #[arg(long)]
        covariates: Option<PathBuf>,
    },
    /// Full pipeline: conversion, structure correction and association
    Run {
        #[arg(long)]
        vcf: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long, value_enum, default_value_t = Structure::Pca)]
        structure: Structure,
        /// Missingness ceiling for pruning and PCA
        #[arg(long, default_value_t = PCA_MIN_MISSING_RATE)]
        structure_max_missing_rate: f64,
        #[command(flatten)]
        ld: LdArgs,
        #[command(flatten)]
        pca: PcaArgs,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
enum Structure {
    Pca,
    None,
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Drop variants whose minor allele frequency is below this value
    #[arg(long, default_value_t = 0.01)]
    maf: f64,
    /// Disable the allele frequency filter
    #[arg(long)]
    no_maf: bool,
    /// Drop variants missing in more than this fraction of samples
    #[arg(long)]
    geno: Option<f64>,
    /// Keep only variants listed in these files
    #[arg(long, num_args = 1..)]
    extract: Vec<PathBuf>,
}

impl FilterArgs {
    fn to_filters(&self) -> VariantFilters {
        VariantFilters::new(
            (!self.no_maf).then_some(self.maf),
            self.geno,
            self.extract.clone(),
        )
    }
}

#[derive(Debug, Args)]
struct LdArgs {
    #[arg(long, default_value_t = 50)]
    window_size: u32,
    #[arg(long, default_value_t = 5)]
    step_size: u32,
    /// Window size is in kilobases instead of variants
    #[arg(long)]
    window_kb: bool,
    #[arg(long, default_value_t = 0.5)]
    r2_threshold: f64,
    /// Allow pruning with too few samples for a reliable LD estimate
    #[arg(long)]
    bad_ld: bool,
}

impl LdArgs {
    fn to_params(&self) -> LdPruneParams {
        LdPruneParams {
            window_size: self.window_size,
            step_size: self.step_size,
            window_unit: if self.window_kb {
                WindowUnit::Kilobases
            } else {
                WindowUnit::Variants
            },
            r2_threshold: self.r2_threshold,
            bad_ld: self.bad_ld,
        }
    }
}

#[derive(Debug, Args)]
struct PcaArgs {
    #[arg(long, default_value_t = 10)]
    n_dims: u32,
    /// Randomized approximation for large sample counts
    #[arg(long)]
    approx: bool,
    /// Compute allele frequencies in a separate pass first
    #[arg(long)]
    freq: bool,
}

impl PcaArgs {
    fn to_params(&self) -> PcaParams {
        PcaParams {
            n_dims: self.n_dims,
            approx: self.approx,
            freq: self.freq,
        }
    }
}

#[derive(Debug, Args)]
struct AnalysisArgs {
    /// Phenotype sheet with a SAMPLE_NAME column and one column per trait
    #[arg(long)]
    phenotypes: PathBuf,
    #[arg(long)]
    out_dir: PathBuf,
    /// Prefix of every output file
    #[arg(long)]
    name: String,
    /// Traits are case/control coded (0, 1, 2, -9)
    #[arg(long)]
    qualitative: bool,
    /// Analyse only these traits
    #[arg(long = "trait")]
    traits: Vec<String>,
    /// Only samples listed in this file are used
    #[arg(long)]
    samples: Option<PathBuf>,
    /// Chromosome size index (.fai)
    #[arg(long, conflicts_with = "euchromatic_regions", required_unless_present = "euchromatic_regions")]
    genome_index: Option<PathBuf>,
    /// Euchromatic arms per chromosome; pericentromeres are removed from plots
    #[arg(long)]
    euchromatic_regions: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top_n: usize,
    /// Minor allele frequency floor for the association test
    #[arg(long)]
    gwas_maf: Option<f64>,
    /// Missingness ceiling for the association test
    #[arg(long)]
    gwas_geno: Option<f64>,
    /// Test only variants listed in these files
    #[arg(long, num_args = 1..)]
    gwas_extract: Vec<PathBuf>,
    /// Skip the SVG plots
    #[arg(long)]
    no_plots: bool,
}

impl AnalysisArgs {
    fn genome_source(&self) -> Result<GenomeSource> {
        match (&self.genome_index, &self.euchromatic_regions) {
            (Some(path), None) => Ok(GenomeSource::SizeIndex(path.clone())),
            (None, Some(path)) => Ok(GenomeSource::EuchromaticRegions(path.clone())),
            _ => anyhow::bail!("exactly one of --genome-index or --euchromatic-regions is required"),
        }
    }

    /// `None` when no association filter was given.
    fn gwas_filters(&self) -> Option<VariantFilters> {
        let unset =
            self.gwas_maf.is_none() && self.gwas_geno.is_none() && self.gwas_extract.is_empty();
        (!unset).then(|| {
            VariantFilters::new(self.gwas_maf, self.gwas_geno, self.gwas_extract.clone())
        })
    }

    fn traits(&self) -> Option<Vec<String>> {
        (!self.traits.is_empty()).then(|| self.traits.clone())
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let tool = ExternalTool::new(&cli.plink2);

    match cli.command {
        Command::MakeBfiles { vcf, out } => {
            let out = out.unwrap_or_else(|| default_bfile_base(&vcf));
            let bfiles = make_bfiles(&tool, &vcf, &out)?;
            println!("bfiles: {}", bfiles.base().display());
        }
        Command::PruneLd {
            bfile,
            out,
            pruned_list,
            filters,
            ld,
        } => {
            let path = prune_ld(
                &tool,
                &BfileSet::new(bfile),
                &out,
                &pruned_list,
                &filters.to_filters(),
                &ld.to_params(),
            )?;
            println!("pruned variants: {}", path.display());
        }
        Command::Pca {
            bfile,
            out,
            filters,
            pca,
        } => {
            let result = run_pca(
                &tool,
                &BfileSet::new(bfile),
                &out,
                &filters.to_filters(),
                &pca.to_params(),
            )?;
            println!(
                "eigenvectors: {} ({} samples)",
                result.eigenvec_path.display(),
                result.projections.len()
            );
        }
        Command::Gwas {
            bfile,
            analysis,
            covariates,
        } => {
            let converter = analysis.genome_source()?.load()?;
            let phenotypes = PhenotypeTable::from_path(&analysis.phenotypes).with_context(|| {
                format!("failed to read phenotypes {}", analysis.phenotypes.display())
            })?;
            let keep_samples = analysis
                .samples
                .as_deref()
                .map(read_sample_list)
                .transpose()
                .with_context(|| "failed to read sample list")?;
            let config = GwasAnalysis {
                qualitative: analysis.qualitative,
                covariates,
                traits: analysis.traits(),
                keep_samples,
                filters: analysis.gwas_filters(),
                top_n: analysis.top_n,
                render_plots: !analysis.no_plots,
                ..GwasAnalysis::new(BfileSet::new(bfile), &analysis.out_dir, &analysis.name)
            };
            let report = run_gwas_analysis(&tool, &config, &phenotypes, &converter)?;
            print_summary(&report);
        }
        Command::Run {
            vcf,
            analysis,
            structure,
            structure_max_missing_rate,
            ld,
            pca,
        } => {
            let mut config = PipelineConfig::new(
                vcf,
                &analysis.phenotypes,
                analysis.genome_source()?,
                &analysis.out_dir,
                &analysis.name,
            );
            config.qualitative = analysis.qualitative;
            config.traits = analysis.traits();
            config.samples = analysis.samples.clone();
            config.structure = match structure {
                Structure::Pca => StructureCorrection::Pca,
                Structure::None => StructureCorrection::None,
            };
            config.structure_filters = config
                .structure_filters
                .with_max_missing_rate(Some(structure_max_missing_rate));
            config.ld = ld.to_params();
            config.pca = pca.to_params();
            config.gwas_filters = analysis.gwas_filters();
            config.top_n = analysis.top_n;
            config.render_plots = !analysis.no_plots;

            let report = run_pipeline(&tool, &config)?;
            print_summary(&report);
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "GWAS {} ({} coordinates, {} bp)",
        report.name, report.coordinates.kind, report.coordinates.genome_size
    );
    for trait_report in &report.traits {
        match trait_report.status {
            TraitStatus::Tested => println!(
                "  {}: {} variants tested, {} plotted, {} pericentromeric dropped",
                trait_report.trait_name,
                trait_report.tested_variants,
                trait_report.plotted_variants,
                trait_report.pericentromeric_dropped
            ),
            TraitStatus::NoValidTests => {
                println!("  {}: zero valid tests", trait_report.trait_name)
            }
        }
    }
}

//! Per-trait association loop: phenotype file, plink2 association test,
//! genome-ordered plots and a top-hits table for every trait.

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::{BufRead, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use rayon::prelude::*;

use crate::{
    coords::{CoordError, CoordinateConverter},
    filters::VariantFilters,
    phenotype::{PhenotypeTable, write_phenotype_file},
    plink::{AssociationOutcome, AssociationParams, BfileSet, TestFamily, run_association},
    plot::{self, PlotError},
    report::{RunReport, TraitReport},
    runner::ExternalTool,
    smart_reader,
    table::ResultTable,
};

/// Adjusted p-value columns that get a Manhattan plot, with their file tags.
pub const PLOTTED_PVALUES: [(&str, &str); 3] = [
    ("pval", "non_adjusted_pval"),
    ("sidak_step_down_pval", "sidak_step_down_pval"),
    ("benjamini_yekutieli_pval", "benjamini_yekutieli_pval"),
];

/// Column that also gets a QQ plot.
pub const QQ_PVALUE: &str = "pval";

pub const DEFAULT_TOP_N: usize = 100;

pub const PHENOTYPE_FILE_NAME: &str = "phenotypes.pheno";

/// Configuration of one aggregator run.
#[derive(Debug, Clone)]
pub struct GwasAnalysis {
    pub bfiles: BfileSet,
    pub out_dir: PathBuf,
    /// Prefix of every emitted file and of the run report.
    pub out_name: String,
    /// Case/control traits (logistic) instead of quantitative (linear).
    pub qualitative: bool,
    /// Covariate file, usually a PCA eigenvector file. Without one the
    /// association runs with `allow-no-covars`.
    pub covariates: Option<PathBuf>,
    /// Traits to analyse; `None` means every trait of the sheet.
    pub traits: Option<Vec<String>>,
    /// Only these accessions are written to phenotype files.
    pub keep_samples: Option<HashSet<String>>,
    pub filters: Option<VariantFilters>,
    pub top_n: usize,
    pub render_plots: bool,
}

impl GwasAnalysis {
    pub fn new(bfiles: BfileSet, out_dir: impl Into<PathBuf>, out_name: impl Into<String>) -> Self {
        Self {
            bfiles,
            out_dir: out_dir.into(),
            out_name: out_name.into(),
            qualitative: false,
            covariates: None,
            traits: None,
            keep_samples: None,
            filters: None,
            top_n: DEFAULT_TOP_N,
            render_plots: true,
        }
    }
}

/// Variant ID → (chromosome, position), read from a `.bim` file.
#[derive(Debug, Clone, Default)]
pub struct VariantPositions {
    by_id: HashMap<String, (String, u64)>,
}

impl VariantPositions {
    pub fn from_bim(path: &Path) -> Result<Self> {
        let reader = smart_reader::open_input(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::read_bim(reader).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// `chrom id cm pos a1 a2`, whitespace separated.
    pub fn read_bim<R: BufRead>(reader: R) -> Result<Self> {
        let mut by_id = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 4 {
                bail!("line {}: expected at least 4 fields, found {}", idx + 1, fields.len());
            }
            let pos: u64 = fields[3]
                .parse()
                .with_context(|| format!("line {}: invalid position {:?}", idx + 1, fields[3]))?;
            by_id.insert(fields[1].to_string(), (fields[0].to_string(), pos));
        }
        Ok(Self { by_id })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Position of `id`, falling back to parsing a `chrom:pos` identifier.
    pub fn resolve<'a>(&'a self, id: &'a str) -> Option<(&'a str, u64)> {
        if let Some((chrom, pos)) = self.by_id.get(id) {
            return Some((chrom.as_str(), *pos));
        }
        let (chrom, pos) = id.rsplit_once(':')?;
        let pos = pos.parse().ok()?;
        (!chrom.is_empty()).then_some((chrom, pos))
    }
}

/// Rows of a result table arranged by linear genome coordinate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeOrder {
    /// Row indices into the original table, in genome order.
    pub rows: Vec<usize>,
    /// Linear coordinate of each entry of `rows`.
    pub coords: Vec<u64>,
    pub pericentromeric: usize,
    pub unresolved: usize,
}

/// Sort variant IDs by linear coordinate. Pericentromeric variants are
/// dropped and counted; an unknown chromosome aborts.
pub fn genome_order(
    ids: &[String],
    positions: &VariantPositions,
    converter: &CoordinateConverter,
) -> Result<GenomeOrder, CoordError> {
    let mut placed: Vec<(u64, usize)> = Vec::with_capacity(ids.len());
    let mut order = GenomeOrder::default();
    for (row, id) in ids.iter().enumerate() {
        let Some((chrom, pos)) = positions.resolve(id) else {
            order.unresolved += 1;
            continue;
        };
        match converter.transform(chrom, pos) {
            Ok(x) => placed.push((x, row)),
            Err(err) if err.is_recoverable() => {
                tracing::debug!(variant = %id, error = %err, "dropping pericentromeric variant");
                order.pericentromeric += 1;
            }
            Err(err) => return Err(err),
        }
    }
    placed.sort_by_key(|&(x, _)| x);
    (order.coords, order.rows) = placed.into_iter().unzip();
    Ok(order)
}

enum PlotJob {
    Manhattan {
        path: PathBuf,
        y_label: String,
        points: Vec<(u64, f64)>,
    },
    Qq {
        path: PathBuf,
        pvalues: Vec<f64>,
    },
}

impl PlotJob {
    fn path(&self) -> &Path {
        match self {
            Self::Manhattan { path, .. } | Self::Qq { path, .. } => path,
        }
    }

    fn render(&self, title: &str, converter: &CoordinateConverter) -> Result<(), PlotError> {
        match self {
            Self::Manhattan {
                path,
                y_label,
                points,
            } => plot::render_manhattan(path, title, y_label, points, converter),
            Self::Qq { path, pvalues } => plot::render_qq(path, title, pvalues),
        }
    }
}

fn plot_jobs(
    trait_dir: &Path,
    prefix: &str,
    sorted: &ResultTable,
    coords: &[u64],
) -> Vec<PlotJob> {
    let mut jobs = Vec::new();
    for (column, tag) in PLOTTED_PVALUES {
        let Some(values) = sorted.numeric(column) else {
            tracing::warn!(column, "association output lacks a p-value column; not plotted");
            continue;
        };
        if column == QQ_PVALUE {
            jobs.push(PlotJob::Qq {
                path: trait_dir.join(format!("{prefix}_{tag}_qq_plot.svg")),
                pvalues: values.to_vec(),
            });
        }
        let points = coords
            .iter()
            .zip(values)
            .filter_map(|(&x, &p)| plot::neg_log10(p).map(|y| (x, y)))
            .collect();
        jobs.push(PlotJob::Manhattan {
            path: trait_dir.join(format!("{prefix}_{tag}_along_genome.svg")),
            y_label: format!("-log10({tag})"),
            points,
        });
    }
    jobs
}

/// Trait names become directory and file names under the output directory.
fn check_trait_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if !single_normal || name.contains(['/', '\\']) {
        bail!("trait name {name:?} cannot be used as a file name");
    }
    Ok(())
}

fn write_top_hits(path: &Path, table: &ResultTable, top_n: usize) -> Result<()> {
    let columns: Vec<&str> = PLOTTED_PVALUES.iter().map(|(column, _)| *column).collect();
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    table
        .head(top_n)
        .write_delimited(BufWriter::new(file), Some(columns.as_slice()), ',')
        .with_context(|| format!("failed to write {}", path.display()))
}

fn load_positions(bfiles: &BfileSet) -> Result<VariantPositions> {
    let bim = bfiles.bim();
    if bim.exists() {
        let positions = VariantPositions::from_bim(&bim)?;
        tracing::info!(bim = %bim.display(), variants = positions.len(), "loaded variant positions");
        Ok(positions)
    } else {
        tracing::warn!(bim = %bim.display(), "no .bim file; positions come from chrom:pos variant IDs");
        Ok(VariantPositions::default())
    }
}

/// Run the association test for every selected trait and write plots, top
/// hits and a run report under `analysis.out_dir`.
pub fn run_gwas_analysis(
    tool: &ExternalTool,
    analysis: &GwasAnalysis,
    phenotypes: &PhenotypeTable,
    converter: &CoordinateConverter,
) -> Result<RunReport> {
    fs::create_dir_all(&analysis.out_dir)
        .with_context(|| format!("failed to create {}", analysis.out_dir.display()))?;

    let traits: Vec<String> = match &analysis.traits {
        Some(traits) => traits.clone(),
        None => phenotypes.trait_names().into_iter().map(str::to_string).collect(),
    };
    for trait_name in &traits {
        check_trait_name(trait_name)?;
    }
    let positions = load_positions(&analysis.bfiles)?;
    let mut report = RunReport::new(&analysis.out_name, &analysis.bfiles, converter);

    for trait_name in &traits {
        tracing::info!(trait_name = %trait_name, "doing GWAS for trait");
        let trait_report = analyse_trait(tool, analysis, phenotypes, converter, &positions, trait_name)
            .with_context(|| format!("GWAS failed for trait {trait_name}"))?;
        report.traits.push(trait_report);
    }

    let report_path = report
        .write(&analysis.out_dir)
        .with_context(|| "failed to write run report")?;
    tracing::info!(report = %report_path.display(), traits = traits.len(), "GWAS analysis finished");
    Ok(report)
}

fn analyse_trait(
    tool: &ExternalTool,
    analysis: &GwasAnalysis,
    phenotypes: &PhenotypeTable,
    converter: &CoordinateConverter,
    positions: &VariantPositions,
    trait_name: &str,
) -> Result<TraitReport> {
    let trait_dir = analysis.out_dir.join(trait_name);
    fs::create_dir_all(&trait_dir)
        .with_context(|| format!("failed to create {}", trait_dir.display()))?;

    let values = phenotypes.phenotypes(trait_name, analysis.keep_samples.as_ref())?;
    let pheno_path = trait_dir.join(PHENOTYPE_FILE_NAME);
    let file = File::create(&pheno_path)
        .with_context(|| format!("failed to create {}", pheno_path.display()))?;
    write_phenotype_file(&values, BufWriter::new(file), analysis.qualitative)?;

    let params = AssociationParams {
        family: TestFamily::for_trait(analysis.qualitative),
        covariates: analysis.covariates.clone(),
        allow_no_covariates: analysis.covariates.is_none(),
        filters: analysis.filters.clone(),
    };
    let out_base = trait_dir.join(format!("{}.{}", analysis.bfiles.name(), trait_name));
    let table = match run_association(tool, &analysis.bfiles, &pheno_path, &out_base, &params)? {
        AssociationOutcome::NoValidTests => {
            tracing::warn!(trait_name, "zero valid tests; skipping trait");
            return Ok(TraitReport::no_valid_tests(trait_name, values.len()));
        }
        AssociationOutcome::Tested(table) => table,
    };

    let order = genome_order(table.index(), positions, converter)?;
    if order.unresolved > 0 {
        tracing::warn!(trait_name, unresolved = order.unresolved, "variants without a known position");
    }
    if order.pericentromeric > 0 {
        tracing::info!(trait_name, dropped = order.pericentromeric, "dropped pericentromeric variants");
    }

    let prefix = format!("{}_{}", analysis.out_name, trait_name);
    let sorted = table.take_rows(&order.rows);
    let mut files = Vec::new();

    if analysis.render_plots {
        let jobs = plot_jobs(&trait_dir, &prefix, &sorted, &order.coords);
        jobs.par_iter()
            .map(|job| job.render(trait_name, converter))
            .collect::<Result<Vec<()>, PlotError>>()?;
        files.extend(jobs.iter().map(|job| job.path().to_path_buf()));
    }

    let csv_path = trait_dir.join(format!("{prefix}_pvalues_along_genome.csv"));
    write_top_hits(&csv_path, &table, analysis.top_n)?;
    files.push(csv_path);

    Ok(TraitReport::tested(
        trait_name,
        values.len(),
        table.len(),
        &order,
        files,
    ))
}

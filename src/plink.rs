//! plink2 pipeline stages: binary fileset conversion, LD pruning, PCA and
//! association testing.
//!
//! Every stage has the same shape: validate parameters, build an argument
//! list (input paths, output base, [`VariantFilters`] fragment), run the tool
//! through [`ExternalTool`], then parse the stage's output file. Parameter
//! problems are reported as [`StageError::Configuration`] before any process
//! is spawned.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use noodles::vcf;
use thiserror::Error;

use crate::{
    filters::VariantFilters,
    runner::{CapturePaths, ExternalTool, Invocation, ToolError, append_suffix},
    table::{ResultTable, TableError},
};

/// Written to stdout by plink2 when no variant could be tested.
pub const ZERO_VALID_TESTS_MARKER: &str = "Zero valid tests; --adjust skipped.";

/// PCA fills missing genotypes with the column mean, so variants must not be
/// dropped for missingness below this ceiling.
pub const PCA_MIN_MISSING_RATE: f64 = 0.9;

/// plink2 always names the pruning output after itself in its working
/// directory when no `--out` is given.
pub const PRUNE_OUTPUT_NAME: &str = "plink2.prune.in";

/// Leading identifier columns of an eigenvector file, for the
/// `FID IID SOL PC1 ...` layout. plink2 drops the `SOL` column unless asked
/// for it, and with `--double-id` writes `#FID IID PC1 ...`; read such a file
/// with a prefix of 2 or the first component is taken as an identifier.
pub const EIGENVEC_PREFIX_COLUMNS: usize = 3;

/// plink2 `--adjust` column codes and their self-describing names.
pub const ADJUSTED_COLUMN_NAMES: &[(&str, &str)] = &[
    ("#CHROM", "chrom"),
    ("ID", "variant_id"),
    ("UNADJ", "pval"),
    ("GC", "genomic_control_corrected_pval"),
    ("QQ", "pval_quantile"),
    ("BONF", "bonferroni_pval"),
    ("HOLM", "holm_bonferroni_pval"),
    ("SIDAK_SS", "sidak_single_step_pval"),
    ("SIDAK_SD", "sidak_step_down_pval"),
    ("FDR_BH", "benjamini_hochberg_pval"),
    ("FDR_BY", "benjamini_yekutieli_pval"),
];

pub fn adjusted_column_name(code: &str) -> Option<&'static str> {
    ADJUSTED_COLUMN_NAMES
        .iter()
        .find(|(short, _)| *short == code)
        .map(|(_, long)| *long)
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("{} contains no rows", .path.display())]
    EmptyOutput { path: PathBuf },
}

impl StageError {
    fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Run an invocation, dumping the captured streams when the tool fails.
fn run_stage(tool: &ExternalTool, invocation: &Invocation) -> Result<(), StageError> {
    tool.run(invocation).map_err(|err| {
        if let ToolError::Failed(failure) = &err {
            failure.log_captured_streams();
        }
        StageError::from(err)
    })
}

fn require_allele_frequency_filter(filters: &VariantFilters, stage: &str) -> Result<(), StageError> {
    if filters.max_major_freq().is_none() {
        return Err(StageError::config(format!(
            "{stage} requires an allele frequency filter (max_major_freq); low frequency variants must be removed"
        )));
    }
    Ok(())
}

/// A plink binary fileset (`.bed`/`.bim`/`.fam`) addressed by its base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfileSet {
    base: PathBuf,
}

impl BfileSet {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn bed(&self) -> PathBuf {
        append_suffix(&self.base, ".bed")
    }

    pub fn bim(&self) -> PathBuf {
        append_suffix(&self.base, ".bim")
    }

    pub fn fam(&self) -> PathBuf {
        append_suffix(&self.base, ".fam")
    }

    /// File name of the base, used to name per-trait outputs.
    pub fn name(&self) -> String {
        self.base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("bfiles"))
    }
}

/// `<dir>/<stem>` for `<dir>/<stem>.vcf[.gz]`.
pub fn default_bfile_base(vcf_path: &Path) -> PathBuf {
    let name = vcf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let name = name.strip_suffix(".vcf").unwrap_or(name);
    vcf_path.with_file_name(name)
}

fn vcf_sample_count(path: &Path) -> io::Result<usize> {
    let mut reader = vcf::io::reader::Builder::default().build_from_path(path)?;
    let header = reader.read_header()?;
    Ok(header.sample_names().len())
}

/// Convert a VCF into a plink binary fileset at `out_base`.
pub fn make_bfiles(
    tool: &ExternalTool,
    vcf_path: &Path,
    out_base: &Path,
) -> Result<BfileSet, StageError> {
    let samples = vcf_sample_count(vcf_path).map_err(|err| StageError::io(vcf_path, err))?;
    if samples == 0 {
        return Err(StageError::config(format!(
            "{} has no samples to convert",
            vcf_path.display()
        )));
    }
    tracing::info!(stage = "bfiles", vcf = %vcf_path.display(), samples, "creating plink binary fileset");

    let mut args: Vec<OsString> = vec!["--vcf".into(), vcf_path.into(), "--out".into(), out_base.into()];
    args.extend(
        [
            "--allow-extra-chr",
            "--double-id",
            "--vcf-half-call",
            "missing",
            "--set-missing-var-ids",
            "@:#",
            "--make-bed",
        ]
        .map(OsString::from),
    );

    let capture = CapturePaths::for_stage(out_base, "bfiles");
    run_stage(tool, &Invocation::new(args, capture))?;
    Ok(BfileSet::new(out_base))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Variants,
    Kilobases,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdPruneParams {
    pub window_size: u32,
    pub step_size: u32,
    pub window_unit: WindowUnit,
    pub r2_threshold: f64,
    pub bad_ld: bool,
}

impl Default for LdPruneParams {
    fn default() -> Self {
        Self {
            window_size: 50,
            step_size: 5,
            window_unit: WindowUnit::Variants,
            r2_threshold: 0.5,
            bad_ld: false,
        }
    }
}

impl LdPruneParams {
    fn to_args(&self) -> Vec<OsString> {
        let window = match self.window_unit {
            WindowUnit::Variants => self.window_size.to_string(),
            WindowUnit::Kilobases => format!("{}kb", self.window_size),
        };
        // plink2 parses flags order-independently; --bad-ld goes first.
        let mut args: Vec<OsString> = Vec::new();
        if self.bad_ld {
            args.push("--bad-ld".into());
        }
        args.push("--indep-pairwise".into());
        args.push(window.into());
        args.push(self.step_size.to_string().into());
        args.push(self.r2_threshold.to_string().into());
        args
    }
}

fn absolute(path: &Path) -> Result<PathBuf, StageError> {
    std::path::absolute(path).map_err(|err| StageError::io(path, err))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Select LD-independent variants and write their IDs to `pruned_list`.
///
/// plink2 writes `plink2.prune.in` into its working directory, which is the
/// directory of `out_base` (or `out_base` itself if it is a directory). The
/// directory is passed to the subprocess only; this process's working
/// directory is never changed.
pub fn prune_ld(
    tool: &ExternalTool,
    bfiles: &BfileSet,
    out_base: &Path,
    pruned_list: &Path,
    filters: &VariantFilters,
    params: &LdPruneParams,
) -> Result<PathBuf, StageError> {
    require_allele_frequency_filter(filters, "LD pruning")?;

    let working_dir = if out_base.is_dir() {
        out_base.to_path_buf()
    } else {
        match out_base.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    };
    let working_dir = absolute(&working_dir)?;
    let filters = filters
        .absolutized()
        .map_err(|err| StageError::io(out_base, err))?;

    let mut args: Vec<OsString> = vec![
        "--bfile".into(),
        absolute(bfiles.base())?.into(),
        "--allow-extra-chr".into(),
    ];
    args.extend(filters.to_args());
    args.extend(params.to_args());

    tracing::info!(stage = "ld", working_dir = %working_dir.display(), "pruning variants in linkage disequilibrium");
    let capture = CapturePaths::for_stage(out_base, "ld");
    run_stage(tool, &Invocation::new(args, capture).in_dir(&working_dir))?;

    let plink_out = working_dir.join(PRUNE_OUTPUT_NAME);
    if !pruned_list.exists() || !same_file(&plink_out, pruned_list) {
        fs::rename(&plink_out, pruned_list).map_err(|err| StageError::io(&plink_out, err))?;
    }
    Ok(pruned_list.to_path_buf())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PcaParams {
    pub n_dims: u32,
    /// Randomized approximation, for large sample counts.
    pub approx: bool,
    /// Compute allele frequencies in a separate `--freq` pass first.
    pub freq: bool,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            n_dims: 10,
            approx: false,
            freq: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PcaResult {
    pub eigenvec_path: PathBuf,
    /// Samples × principal components.
    pub projections: ResultTable,
}

pub fn run_pca(
    tool: &ExternalTool,
    bfiles: &BfileSet,
    out_base: &Path,
    filters: &VariantFilters,
    params: &PcaParams,
) -> Result<PcaResult, StageError> {
    require_allele_frequency_filter(filters, "PCA")?;
    if let Some(rate) = filters.max_missing_rate()
        && rate < PCA_MIN_MISSING_RATE
    {
        return Err(StageError::config(format!(
            "PCA fills missing genotypes with the mean; max_missing_rate must be at least {PCA_MIN_MISSING_RATE}, got {rate}"
        )));
    }

    let afreq_path = append_suffix(out_base, ".afreq");
    if params.freq {
        let mut args: Vec<OsString> = vec![
            "--bfile".into(),
            bfiles.base().into(),
            "--allow-extra-chr".into(),
            "--freq".into(),
            "--out".into(),
            out_base.into(),
        ];
        args.extend(filters.to_args());
        tracing::info!(stage = "freq", "computing allele frequencies");
        run_stage(
            tool,
            &Invocation::new(args, CapturePaths::for_stage(out_base, "freq")),
        )?;
    }

    let mut args: Vec<OsString> = vec!["--bfile".into(), bfiles.base().into()];
    if params.freq {
        args.push("--read-freq".into());
        args.push(afreq_path.into());
    }
    args.extend([
        OsString::from("--allow-extra-chr"),
        OsString::from("--out"),
        out_base.into(),
        OsString::from("--pca"),
        params.n_dims.to_string().into(),
    ]);
    if params.approx {
        args.push("approx".into());
    }
    args.extend(filters.to_args());

    tracing::info!(stage = "pca", n_dims = params.n_dims, "computing principal components");
    run_stage(
        tool,
        &Invocation::new(args, CapturePaths::for_stage(out_base, "pca")),
    )?;

    let eigenvec_path = append_suffix(out_base, ".eigenvec");
    let projections = read_projections(&eigenvec_path)?;
    tracing::info!(
        samples = projections.len(),
        components = projections.column_names().count(),
        "read PCA projections"
    );
    Ok(PcaResult {
        eigenvec_path,
        projections,
    })
}

/// Parse an eigenvector file; an empty projection table is an error.
pub fn read_projections(path: &Path) -> Result<ResultTable, StageError> {
    let reader = crate::smart_reader::open_input(path).map_err(|err| StageError::io(path, err))?;
    let projections = ResultTable::read_with_prefix(reader, EIGENVEC_PREFIX_COLUMNS).map_err(
        |source| StageError::Table {
            path: path.to_path_buf(),
            source,
        },
    )?;
    if projections.is_empty() || projections.column_names().next().is_none() {
        return Err(StageError::EmptyOutput {
            path: path.to_path_buf(),
        });
    }
    Ok(projections)
}

/// Regression family of the association test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFamily {
    /// Quantitative traits.
    Linear,
    /// Qualitative (case/control) traits.
    Logistic,
}

impl TestFamily {
    pub fn for_trait(qualitative: bool) -> Self {
        if qualitative {
            Self::Logistic
        } else {
            Self::Linear
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Self::Linear => "--linear",
            Self::Logistic => "--logistic",
        }
    }

    /// Infix plink2 uses in the adjusted output file name.
    fn output_tag(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Logistic => "logistic.hybrid",
        }
    }
}

impl FromStr for TestFamily {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "logistic" => Ok(Self::Logistic),
            other => Err(StageError::config(format!(
                "unknown test type ({other}), it should be linear (quantitative) or logistic (qualitative)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationParams {
    pub family: TestFamily,
    pub covariates: Option<PathBuf>,
    /// Explicitly accept running without covariates.
    pub allow_no_covariates: bool,
    pub filters: Option<VariantFilters>,
}

/// Result of an association run. `NoValidTests` is distinct from a tested
/// run whose table has zero rows.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationOutcome {
    NoValidTests,
    Tested(ResultTable),
}

pub fn run_association(
    tool: &ExternalTool,
    bfiles: &BfileSet,
    phenotypes_path: &Path,
    out_base: &Path,
    params: &AssociationParams,
) -> Result<AssociationOutcome, StageError> {
    let mut args: Vec<OsString> = vec![
        "--bfile".into(),
        bfiles.base().into(),
        "--allow-extra-chr".into(),
        "--adjust".into(),
        "cols=+qq".into(),
        params.family.flag().into(),
    ];
    match (&params.covariates, params.allow_no_covariates) {
        (Some(covariates), _) => {
            args.push("--covar".into());
            args.push(covariates.into());
        }
        // modifier of the --linear/--logistic flag, so it must follow it
        (None, true) => args.push("allow-no-covars".into()),
        (None, false) => {
            return Err(StageError::config(
                "association requires a covariate file unless allow_no_covariates is set",
            ));
        }
    }
    args.push("--pheno".into());
    args.push(phenotypes_path.into());
    if let Some(filters) = &params.filters {
        args.extend(filters.to_args());
    }
    let plink_out = append_suffix(out_base, ".gwas");
    args.push("--out".into());
    args.push(plink_out.clone().into());

    let capture = CapturePaths::for_stage(out_base, "gwas");
    tracing::info!(stage = "gwas", family = ?params.family, "running association test");
    run_stage(tool, &Invocation::new(args, capture.clone()))?;

    let stdout = fs::read_to_string(&capture.stdout).map_err(|err| StageError::io(&capture.stdout, err))?;
    if stdout.contains(ZERO_VALID_TESTS_MARKER) {
        return Ok(AssociationOutcome::NoValidTests);
    }

    let adjusted_path = append_suffix(
        &plink_out,
        &format!(".PHENO1.glm.{}.adjusted", params.family.output_tag()),
    );
    let table = ResultTable::from_path(&adjusted_path, "ID").map_err(|source| StageError::Table {
        path: adjusted_path.clone(),
        source,
    })?;
    Ok(AssociationOutcome::Tested(table.renamed(adjusted_column_name)))
}

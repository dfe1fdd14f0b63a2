use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Variant-level filters shared by every plink2 stage.
///
/// Immutable once built; the only thing it does is serialize itself into the
/// `--maf`/`--geno`/`--extract` argument fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantFilters {
    max_major_freq: Option<f64>,
    max_missing_rate: Option<f64>,
    keep_lists: Vec<PathBuf>,
}

impl Default for VariantFilters {
    fn default() -> Self {
        Self {
            max_major_freq: Some(0.01),
            max_missing_rate: Some(0.1),
            keep_lists: Vec::new(),
        }
    }
}

impl VariantFilters {
    pub fn new(
        max_major_freq: Option<f64>,
        max_missing_rate: Option<f64>,
        keep_lists: Vec<PathBuf>,
    ) -> Self {
        Self {
            max_major_freq,
            max_missing_rate,
            keep_lists,
        }
    }

    /// No filtering at all.
    pub fn none() -> Self {
        Self::new(None, None, Vec::new())
    }

    pub fn with_max_major_freq(self, max_major_freq: Option<f64>) -> Self {
        Self {
            max_major_freq,
            ..self
        }
    }

    pub fn with_max_missing_rate(self, max_missing_rate: Option<f64>) -> Self {
        Self {
            max_missing_rate,
            ..self
        }
    }

    pub fn with_keep_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.keep_lists.push(path.into());
        self
    }

    pub fn max_major_freq(&self) -> Option<f64> {
        self.max_major_freq
    }

    pub fn max_missing_rate(&self) -> Option<f64> {
        self.max_missing_rate
    }

    pub fn keep_lists(&self) -> &[PathBuf] {
        &self.keep_lists
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(maf) = self.max_major_freq {
            args.push("--maf".into());
            args.push(maf.to_string().into());
        }
        if let Some(geno) = self.max_missing_rate {
            args.push("--geno".into());
            args.push(geno.to_string().into());
        }
        if !self.keep_lists.is_empty() {
            args.push("--extract".into());
            args.extend(self.keep_lists.iter().map(|p| p.as_os_str().to_os_string()));
        }
        args
    }

    /// Copy with every allow-list path made absolute, for invocations that
    /// run the tool from a different working directory.
    pub(crate) fn absolutized(&self) -> std::io::Result<Self> {
        let keep_lists = self
            .keep_lists
            .iter()
            .map(|p| std::path::absolute(Path::new(p)))
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            keep_lists,
            ..self.clone()
        })
    }
}

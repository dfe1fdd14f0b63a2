//! Subprocess invocation of the external analysis tool.
//!
//! Every invocation redirects the tool's stdout and stderr to a pair of
//! capture files that stay on disk afterwards. A nonzero exit is returned as a
//! [`ToolFailure`] value; dumping the captured streams for the operator is an
//! explicit step ([`ToolFailure::log_captured_streams`]) left to the caller.

use std::{
    ffi::{OsStr, OsString},
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use thiserror::Error;

pub const DEFAULT_PROGRAM: &str = "plink2";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to create capture file {}: {source}", .path.display())]
    Capture {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Failed(#[from] ToolFailure),
}

/// Nonzero exit of the external tool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "{} exited with {status}; captured output in {} and {}",
    .program.display(),
    .stdout_path.display(),
    .stderr_path.display(),
    status = exit_label(.exit_code)
)]
pub struct ToolFailure {
    pub program: PathBuf,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => String::from("a signal"),
    }
}

impl ToolFailure {
    /// Re-read both capture files and emit them at error level.
    pub fn log_captured_streams(&self) {
        for (stream, path) in [("stdout", &self.stdout_path), ("stderr", &self.stderr_path)] {
            match fs::read_to_string(path) {
                Ok(text) => tracing::error!(
                    stream,
                    path = %path.display(),
                    "captured {stream}:\n{text}"
                ),
                Err(err) => tracing::error!(
                    stream,
                    path = %path.display(),
                    error = %err,
                    "could not read captured {stream}"
                ),
            }
        }
    }
}

/// The stdout/stderr file pair of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl CapturePaths {
    /// `<out_base>.<stage>.stdout` and `<out_base>.<stage>.stderr`.
    pub fn for_stage(out_base: &Path, stage: &str) -> Self {
        Self {
            stdout: append_suffix(out_base, &format!(".{stage}.stdout")),
            stderr: append_suffix(out_base, &format!(".{stage}.stderr")),
        }
    }
}

/// Append a raw suffix to a path without treating any part as an extension.
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<OsString>,
    pub capture: CapturePaths,
    /// Working directory for the subprocess only; the parent's stays put.
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(args: Vec<OsString>, capture: CapturePaths) -> Self {
        Self {
            args,
            capture,
            current_dir: None,
        }
    }

    pub fn in_dir(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: Some(dir.into()),
            ..self
        }
    }
}

/// Render an argument list as a shell-like line for logs.
pub fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    program: PathBuf,
}

impl Default for ExternalTool {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Program path as seen from the subprocess. A relative path with a
    /// directory part would resolve against `current_dir`, so it is anchored
    /// to this process's working directory instead. Bare names keep the
    /// `PATH` lookup.
    fn launch_path(&self, current_dir: Option<&Path>) -> io::Result<PathBuf> {
        let has_dir_part = self.program.components().count() > 1;
        if current_dir.is_some() && has_dir_part && self.program.is_relative() {
            std::path::absolute(&self.program)
        } else {
            Ok(self.program.clone())
        }
    }

    /// Run to completion. Blocks until the subprocess exits; there is no
    /// timeout.
    pub fn run(&self, invocation: &Invocation) -> Result<(), ToolError> {
        let capture = &invocation.capture;
        tracing::info!(
            command = %command_line(&self.program, &invocation.args),
            cwd = ?invocation.current_dir,
            "running external tool"
        );

        let stdout = File::create(&capture.stdout).map_err(|source| ToolError::Capture {
            path: capture.stdout.clone(),
            source,
        })?;
        let stderr = File::create(&capture.stderr).map_err(|source| ToolError::Capture {
            path: capture.stderr.clone(),
            source,
        })?;

        let program = self
            .launch_path(invocation.current_dir.as_deref())
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // The capture handles move into the Command and close when it drops,
        // whichever way this function returns.
        let mut command = Command::new(&program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let status = command.status().map_err(|source| ToolError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if status.success() {
            tracing::debug!(program = %self.program.display(), "external tool finished");
            Ok(())
        } else {
            Err(ToolFailure {
                program: self.program.clone(),
                exit_code: status.code(),
                stdout_path: capture.stdout.clone(),
                stderr_path: capture.stderr.clone(),
            }
            .into())
        }
    }
}

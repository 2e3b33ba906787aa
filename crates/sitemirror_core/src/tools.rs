//! External programs the pipeline drives: `wget2` for every fetch, `find` +
//! `sed` for in-place HTML substitution.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::error::MirrorError;

/// wget2 exit status for "server issued an error response". The mirror is
/// still usable, so it is downgraded to a warning.
pub const WGET_SERVER_ERROR: i32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    SuccessWithWarning { code: i32 },
    Failure { code: i32, message: String },
}

impl ToolOutcome {
    pub fn from_status(status: ExitStatus, benign: &[i32]) -> Self {
        match status.code() {
            Some(0) => Self::Success,
            Some(code) if benign.contains(&code) => Self::SuccessWithWarning { code },
            Some(code) => Self::Failure {
                code,
                message: status.to_string(),
            },
            None => Self::Failure {
                code: -1,
                message: format!("terminated without exit code ({status})"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }

    /// Converts `Failure` into [`MirrorError::FetchFailed`]; the other
    /// variants pass through.
    pub fn ensure_success(self, tool: &str) -> Result<Self> {
        match self {
            Self::Failure { code, message } => Err(MirrorError::FetchFailed {
                tool: tool.to_string(),
                code,
                message,
            }
            .into()),
            other => Ok(other),
        }
    }
}

/// Arguments for the recursive site fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFetch {
    pub url: String,
    pub domains: String,
    pub depth: u32,
    pub quota: String,
    pub output_dir: PathBuf,
}

impl SiteFetch {
    pub fn args(&self) -> Vec<String> {
        vec![
            "--recursive".to_string(),
            format!("--level={}", self.depth),
            "--timestamping".to_string(),
            "--page-requisites".to_string(),
            "--adjust-extension".to_string(),
            format!("--restrict-file-names={}", restrict_file_names()),
            "--convert-links".to_string(),
            "--no-robots".to_string(),
            format!("--quota={}", self.quota),
            format!("--domains={}", self.domains),
            self.url.clone(),
        ]
    }
}

fn restrict_file_names() -> &'static str {
    if cfg!(windows) { "windows" } else { "unix" }
}

/// The seam between pipeline logic and the processes it launches. Every call
/// blocks until the child exits. `Err` means the process could not be run at
/// all; a non-zero exit is reported through [`ToolOutcome`].
pub trait Toolchain {
    /// Recursive mirror of `request.url` into `request.output_dir`.
    fn mirror_site(&self, request: &SiteFetch) -> Result<ToolOutcome>;

    /// Single fetch of `url` into `destination`, skipping it when up to date.
    fn fetch_url(&self, url: &str, destination: &Path, cwd: &Path) -> Result<ToolOutcome>;

    /// Batch fetch of every URL listed in `list_file`, preserving the URL's
    /// directory structure under `cwd`.
    fn fetch_url_list(&self, list_file: &Path, quota: &str, cwd: &Path) -> Result<ToolOutcome>;

    /// Literal in-place replacement of `find` with `replace` in every
    /// `*.html` under `cwd`.
    fn substitute_in_html(&self, find: &str, replace: &str, cwd: &Path) -> Result<ToolOutcome>;
}

/// [`Toolchain`] backed by the real binaries on this machine.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    pub wget: PathBuf,
    pub find: PathBuf,
    pub sed: PathBuf,
}

impl SystemToolchain {
    /// Locates every required binary up front so a missing tool fails the
    /// run before anything touches the output directory.
    pub fn discover(wget_override: Option<&Path>) -> Result<Self> {
        let wget = match wget_override {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(path) => bail!("configured wget2 binary does not exist: {}", path.display()),
            None => locate("wget2")?,
        };
        let toolchain = Self {
            wget,
            find: locate("find")?,
            sed: locate("sed")?,
        };
        tracing::debug!(
            wget = %toolchain.wget.display(),
            find = %toolchain.find.display(),
            sed = %toolchain.sed.display(),
            "resolved external tools"
        );
        Ok(toolchain)
    }
}

fn locate(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|_| {
        MirrorError::ToolMissing {
            tool: tool.to_string(),
        }
        .into()
    })
}

fn run_status(mut command: Command, benign: &[i32]) -> Result<ToolOutcome> {
    let program = command.get_program().to_string_lossy().to_string();
    tracing::debug!(command = ?command, "spawning");
    let status = command
        .status()
        .with_context(|| format!("failed to execute {program}"))?;
    Ok(ToolOutcome::from_status(status, benign))
}

impl Toolchain for SystemToolchain {
    fn mirror_site(&self, request: &SiteFetch) -> Result<ToolOutcome> {
        let mut command = Command::new(&self.wget);
        command.args(request.args()).current_dir(&request.output_dir);
        run_status(command, &[WGET_SERVER_ERROR])
    }

    fn fetch_url(&self, url: &str, destination: &Path, cwd: &Path) -> Result<ToolOutcome> {
        let mut command = Command::new(&self.wget);
        command
            .arg("--timestamping")
            .arg("-O")
            .arg(destination)
            .arg(url)
            .current_dir(cwd);
        run_status(command, &[])
    }

    fn fetch_url_list(&self, list_file: &Path, quota: &str, cwd: &Path) -> Result<ToolOutcome> {
        let mut command = Command::new(&self.wget);
        command
            .arg("--timestamping")
            .arg(format!("--quota={quota}"))
            .arg("--force-directories")
            .arg("-i")
            .arg(list_file)
            .current_dir(cwd);
        run_status(command, &[])
    }

    fn substitute_in_html(&self, find: &str, replace: &str, cwd: &Path) -> Result<ToolOutcome> {
        let expression = sed_literal_expression(find, replace)?;
        let mut command = Command::new(&self.find);
        command
            .args([".", "-name", "*.html", "-exec"])
            .arg(&self.sed)
            .args(["-i", &expression, "{}", ";"])
            .current_dir(cwd);
        run_status(command, &[])
    }
}

/// Builds `s|<find>|<replace>|g` with both sides escaped so sed treats them
/// as plain text.
pub fn sed_literal_expression(find: &str, replace: &str) -> Result<String> {
    if find.is_empty() {
        bail!("rewrite rule has an empty find string");
    }
    if find.contains('\n') || replace.contains('\n') {
        bail!("rewrite rule spans multiple lines: {find:?}");
    }
    let mut pattern = String::with_capacity(find.len());
    for ch in find.chars() {
        if matches!(ch, '\\' | '.' | '*' | '[' | ']' | '^' | '$' | '|') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    let mut replacement = String::with_capacity(replace.len());
    for ch in replace.chars() {
        if matches!(ch, '\\' | '&' | '|') {
            replacement.push('\\');
        }
        replacement.push(ch);
    }
    Ok(format!("s|{pattern}|{replacement}|g"))
}

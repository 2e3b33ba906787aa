//! In-process [`Toolchain`] that records calls instead of launching programs.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::tools::{SiteFetch, ToolOutcome, Toolchain};
use crate::walk::{FileSequence, is_html};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    MirrorSite(SiteFetch),
    FetchUrl { url: String, destination: PathBuf },
    FetchList { urls: Vec<String>, list_file: PathBuf },
    Substitute { find: String, replace: String },
}

#[derive(Debug)]
pub struct RecordingToolchain {
    pub calls: RefCell<Vec<Invocation>>,
    pub mirror_outcome: ToolOutcome,
    pub list_outcome: ToolOutcome,
    /// Returned by every substitution; on `Failure` no file is touched.
    pub substitute_outcome: ToolOutcome,
    /// Files written into the output dir when `mirror_site` runs (relative path, content).
    pub site_files: Vec<(String, String)>,
    /// URLs whose single fetch fails; every other single fetch writes the destination.
    pub failing_urls: HashSet<String>,
}

impl Default for RecordingToolchain {
    fn default() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            mirror_outcome: ToolOutcome::Success,
            list_outcome: ToolOutcome::Success,
            substitute_outcome: ToolOutcome::Success,
            site_files: Vec::new(),
            failing_urls: HashSet::new(),
        }
    }
}

impl RecordingToolchain {
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn list_batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Invocation::FetchList { urls, .. } => Some(urls),
                _ => None,
            })
            .collect()
    }

    pub fn single_fetches(&self) -> Vec<(String, PathBuf)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Invocation::FetchUrl { url, destination } => Some((url, destination)),
                _ => None,
            })
            .collect()
    }
}

impl Toolchain for RecordingToolchain {
    fn mirror_site(&self, request: &SiteFetch) -> Result<ToolOutcome> {
        self.calls
            .borrow_mut()
            .push(Invocation::MirrorSite(request.clone()));
        for (relative, content) in &self.site_files {
            let path = request.output_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
        }
        Ok(self.mirror_outcome.clone())
    }

    fn fetch_url(&self, url: &str, destination: &Path, _cwd: &Path) -> Result<ToolOutcome> {
        self.calls.borrow_mut().push(Invocation::FetchUrl {
            url: url.to_string(),
            destination: destination.to_path_buf(),
        });
        if self.failing_urls.contains(url) {
            return Ok(ToolOutcome::Failure {
                code: 8,
                message: "exit status: 8".to_string(),
            });
        }
        fs::write(destination, format!("// fetched {url}\n"))?;
        Ok(ToolOutcome::Success)
    }

    fn fetch_url_list(&self, list_file: &Path, _quota: &str, _cwd: &Path) -> Result<ToolOutcome> {
        let content = fs::read_to_string(list_file)
            .with_context(|| format!("failed to read {}", list_file.display()))?;
        self.calls.borrow_mut().push(Invocation::FetchList {
            urls: content.lines().map(ToString::to_string).collect(),
            list_file: list_file.to_path_buf(),
        });
        Ok(self.list_outcome.clone())
    }

    fn substitute_in_html(&self, find: &str, replace: &str, cwd: &Path) -> Result<ToolOutcome> {
        self.calls.borrow_mut().push(Invocation::Substitute {
            find: find.to_string(),
            replace: replace.to_string(),
        });
        if !self.substitute_outcome.is_success() {
            return Ok(self.substitute_outcome.clone());
        }
        for path in FileSequence::new(cwd, is_html).iter() {
            let path = path?;
            let content = fs::read_to_string(&path)?;
            fs::write(&path, content.replace(find, replace))?;
        }
        Ok(self.substitute_outcome.clone())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::target::QuerySuffixes;
use crate::walk::{FileSequence, any_file};

/// Builders link assets as `logo.png?lossless=1`, and the fetcher saves them
/// under that literal name. For every such file whose canonical name
/// (`logo.png`) is missing, copies the bytes to the canonical path. Directory
/// names are never matched. Returns the paths created.
pub fn materialize_query_paths(root: &Path, suffixes: &QuerySuffixes) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    if suffixes.is_empty() {
        return Ok(created);
    }
    let files = FileSequence::new(root, any_file);
    for path in files.iter() {
        let path = path.context("failed to fix query paths")?;
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(suffix) = suffixes.matching(name) else {
            continue;
        };
        let canonical = path.with_file_name(&name[..name.len() - suffix.len()]);
        if canonical.exists() {
            continue;
        }
        fs::copy(&path, &canonical).with_context(|| {
            format!(
                "failed to copy {} to {}",
                path.display(),
                canonical.display()
            )
        })?;
        tracing::debug!(from = %path.display(), to = %canonical.display(), "materialized query path");
        created.push(canonical);
    }
    if !created.is_empty() {
        tracing::info!(count = created.len(), "materialized query-suffixed assets");
    }
    Ok(created)
}

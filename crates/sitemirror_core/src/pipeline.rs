use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::archive::{ArchiveReport, create_archive};
use crate::layout::{LayoutReport, normalize_layout};
use crate::materialize::materialize_query_paths;
use crate::mirror::{MirrorReport, MirrorSettings, download_site};
use crate::target::TargetDescriptor;
use crate::tools::Toolchain;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixOptions {
    /// Treat a missing `<output>/<host>/` as an already flattened tree.
    pub allow_normalized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixReport {
    pub layout: LayoutReport,
    pub materialized: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneReport {
    pub mirror: MirrorReport,
    pub fix: FixReport,
    pub archive: Option<ArchiveReport>,
}

/// Layout normalization followed by query-path materialization.
pub fn fix_site(
    toolchain: &dyn Toolchain,
    target: &TargetDescriptor,
    options: FixOptions,
) -> Result<FixReport> {
    let layout = normalize_layout(toolchain, target, options.allow_normalized)
        .context("failed to fix local site")?;
    let materialized = materialize_query_paths(&target.output_dir, &target.query_suffixes)?;
    Ok(FixReport {
        layout,
        materialized,
    })
}

/// Every stage in order: prepare, fetch + scan + rewrite, fix, archive.
pub fn clone_site(
    toolchain: &dyn Toolchain,
    target: &TargetDescriptor,
    settings: &MirrorSettings,
    fix: FixOptions,
    archive: bool,
) -> Result<CloneReport> {
    target.prepare_output_dir()?;
    let mirror = download_site(toolchain, target, settings)?;
    let fix = fix_site(toolchain, target, fix)?;
    let archive = if archive {
        Some(
            create_archive(&target.output_dir, &target.archive_path)
                .context("failed to create zip file")?,
        )
    } else {
        None
    };
    Ok(CloneReport {
        mirror,
        fix,
        archive,
    })
}

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::assets::{AssetDedup, fetch_assets};
use crate::config::{DEFAULT_DEPTH, DEFAULT_QUOTA, MirrorConfig};
use crate::imports::{ImportReport, resolve_dynamic_imports};
use crate::rewrite::rewrite_references;
use crate::target::TargetDescriptor;
use crate::tools::{SiteFetch, ToolOutcome, Toolchain};
use crate::walk::script_files;

/// Fetch policy knobs that are constant for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    pub depth: u32,
    pub quota: String,
    pub dedup: AssetDedup,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            quota: DEFAULT_QUOTA.to_string(),
            dedup: AssetDedup::Keep,
        }
    }
}

impl MirrorSettings {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            depth: config.depth(),
            quota: config.quota(),
            dedup: if config.mirror.dedupe_assets {
                AssetDedup::Unique
            } else {
                AssetDedup::Keep
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub fetch: ToolOutcome,
    pub scripts_scanned: usize,
    pub imports: ImportReport,
    pub asset_batches: usize,
    pub asset_urls: usize,
    pub scripts_rewritten: usize,
}

/// Runs the recursive fetch, then one discovery pass and one rewrite pass over
/// every script in the output tree. Passes are strictly sequential so that
/// files fetched during discovery are on disk before rewriting starts.
pub fn download_site(
    toolchain: &dyn Toolchain,
    target: &TargetDescriptor,
    settings: &MirrorSettings,
) -> Result<MirrorReport> {
    let request = SiteFetch {
        url: target.source.clone(),
        domains: target.domains.joined(),
        depth: settings.depth,
        quota: settings.quota.clone(),
        output_dir: target.output_dir.clone(),
    };
    tracing::info!(url = %request.url, domains = %request.domains, "mirroring site");
    let fetch = toolchain
        .mirror_site(&request)
        .context("failed to run recursive fetch")?
        .ensure_success("wget2")
        .with_context(|| format!("failed to download site {}", target.source))?;
    if let ToolOutcome::SuccessWithWarning { code } = fetch {
        tracing::warn!(code, "ignoring wget2 server error exit; mirror may be partial");
    }

    let mut report = MirrorReport {
        fetch,
        scripts_scanned: 0,
        imports: ImportReport::default(),
        asset_batches: 0,
        asset_urls: 0,
        scripts_rewritten: 0,
    };

    tracing::info!("downloading additional files");
    let scripts = script_files(&target.output_dir);
    for script in scripts.iter() {
        let script = script.context("error walking output directory")?;
        discover_script(toolchain, target, settings, &script, &mut report)?;
    }

    tracing::info!("fixing references");
    for script in scripts.iter() {
        let script = script.context("error walking output directory again")?;
        if rewrite_references(&script, &target.domains)
            .with_context(|| format!("error processing text replace for {}", script.display()))?
        {
            report.scripts_rewritten += 1;
        }
    }

    tracing::info!(
        scripts = report.scripts_scanned,
        imports_fetched = report.imports.fetched,
        imports_failed = report.imports.failed,
        asset_urls = report.asset_urls,
        rewritten = report.scripts_rewritten,
        "mirror complete"
    );
    Ok(report)
}

fn discover_script(
    toolchain: &dyn Toolchain,
    target: &TargetDescriptor,
    settings: &MirrorSettings,
    script: &Path,
    report: &mut MirrorReport,
) -> Result<()> {
    tracing::debug!(path = %script.display(), "scanning script");
    let content = fs::read(script)
        .with_context(|| format!("could not read file {}", script.display()))?;
    report.scripts_scanned += 1;

    let imports = resolve_dynamic_imports(toolchain, &target.output_dir, script, &content)
        .with_context(|| format!("error processing dynamic imports for {}", script.display()))?;
    report.imports.absorb(imports);

    let batch = fetch_assets(
        toolchain,
        &content,
        &target.domains,
        &target.output_dir,
        &settings.quota,
        settings.dedup,
    )
    .with_context(|| format!("error processing other assets from {}", script.display()))?;
    if batch.fetched {
        report.asset_batches += 1;
        report.asset_urls += batch.urls;
    }
    Ok(())
}

//! Runtime `import("...")` chunks. The recursive fetcher only sees static
//! references, so lazily loaded modules are missing from a fresh mirror.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::bytes::Regex;
use serde::Serialize;

use crate::tools::Toolchain;

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"import\s*\(\s*["']([^"'\s]+)["']\s*\)"#).expect("import pattern is valid")
    })
}

/// Literal specifiers of every `import("...")` / `import('...')` in `content`.
/// Computed arguments are not recognised, and neither are specifiers that are
/// not valid UTF-8. The rest of the script may hold any bytes.
pub fn extract_dynamic_imports(content: &[u8]) -> Vec<String> {
    import_pattern()
        .captures_iter(content)
        .filter_map(|captures| captures.get(1))
        .filter_map(|specifier| std::str::from_utf8(specifier.as_bytes()).ok())
        .map(ToString::to_string)
        .collect()
}

/// Where one import lands on disk and what to ask the fetcher for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub specifier: String,
    pub target_path: PathBuf,
    /// Mirror-root relative path, `/` separated. Its first segment is the
    /// host directory, so the fetcher reads it as a scheme-less URL.
    pub fetch_path: String,
}

/// Resolves `specifier` as "importing script's directory + specifier". A
/// leading `/` is concatenated like any other segment rather than restarting
/// at the root. `None` for absolute URLs and for specifiers that climb out of
/// the mirror root.
pub fn resolve_import(root: &Path, script: &Path, specifier: &str) -> Option<ResolvedImport> {
    if specifier.contains("://") || specifier.starts_with("data:") {
        return None;
    }
    let relative_script = script.strip_prefix(root).ok()?;
    let joined = relative_script
        .parent()
        .unwrap_or(Path::new(""))
        .join(specifier.trim_start_matches('/'));
    let fetch_relative = normalize_relative(&joined)?;
    let fetch_path = fetch_relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");
    if fetch_path.is_empty() {
        return None;
    }
    Some(ResolvedImport {
        specifier: specifier.to_string(),
        target_path: root.join(&fetch_relative),
        fetch_path,
    })
}

/// Lexically resolves `.` and `..`; `None` when the path escapes its base.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
            Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    Some(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub found: usize,
    pub fetched: usize,
    pub present: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportReport {
    pub fn absorb(&mut self, other: ImportReport) {
        self.found += other.found;
        self.fetched += other.fetched;
        self.present += other.present;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Fetches every dynamically imported module of `script` that is not on disk
/// yet. A failed fetch is logged and counted; it never aborts the caller.
pub fn resolve_dynamic_imports(
    toolchain: &dyn Toolchain,
    root: &Path,
    script: &Path,
    content: &[u8],
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for specifier in extract_dynamic_imports(content) {
        report.found += 1;
        let Some(resolved) = resolve_import(root, script, &specifier) else {
            tracing::debug!(script = %script.display(), specifier = %specifier, "skipping unresolvable import");
            report.skipped += 1;
            continue;
        };
        if resolved.target_path.exists() {
            report.present += 1;
            continue;
        }
        if let Some(parent) = resolved.target_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        match toolchain.fetch_url(&resolved.fetch_path, &resolved.target_path, root) {
            Ok(outcome) if outcome.is_success() => {
                tracing::info!(url = %resolved.fetch_path, "fetched dynamic import");
                report.fetched += 1;
            }
            Ok(outcome) => {
                tracing::warn!(url = %resolved.fetch_path, ?outcome, "failed to download dynamic import");
                report.failed += 1;
            }
            Err(error) => {
                tracing::warn!(url = %resolved.fetch_path, error = %format!("{error:#}"), "failed to download dynamic import");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

//! Same-site absolute URLs embedded in scripts. Builders often reference
//! images and chunks only from JS string literals, which the recursive fetcher
//! never follows.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::target::DomainSet;
use crate::tools::Toolchain;

/// What to do with a URL referenced more than once in the same script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetDedup {
    /// Every occurrence becomes a line in the batch; the fetcher's timestamp
    /// check makes repeats cheap.
    #[default]
    Keep,
    Unique,
}

/// `https://<domain>` followed by everything up to whitespace or a quote,
/// alternated over the domain set. Matches over raw bytes so scripts with
/// non-UTF-8 content are still scanned. `None` when there are no domains.
pub fn asset_pattern(domains: &DomainSet) -> Result<Option<Regex>> {
    if domains.is_empty() {
        return Ok(None);
    }
    let alternatives = domains
        .iter()
        .map(|domain| format!(r#"https://{}(?-u:[^\s"'`])*"#, regex::escape(domain)))
        .collect::<Vec<_>>();
    let pattern = Regex::new(&alternatives.join("|"))
        .with_context(|| format!("failed to build asset pattern for {}", domains.joined()))?;
    Ok(Some(pattern))
}

/// URLs in match order. A match that is not valid UTF-8 is skipped since it
/// cannot be written to the fetcher's URL list as-is.
pub fn extract_asset_urls(content: &[u8], pattern: &Regex, dedup: AssetDedup) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for found in pattern.find_iter(content) {
        let Ok(url) = std::str::from_utf8(found.as_bytes()) else {
            continue;
        };
        if dedup == AssetDedup::Unique && urls.iter().any(|seen| seen == url) {
            continue;
        }
        urls.push(url.to_string());
    }
    urls
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetBatch {
    pub urls: usize,
    pub fetched: bool,
}

/// Extracts same-site URLs from `content` and fetches them in one batch into
/// `output_dir`. The URL list lives in a temp file that is removed however
/// this returns. A failed batch is an error; there is no per-URL recovery.
pub fn fetch_assets(
    toolchain: &dyn Toolchain,
    content: &[u8],
    domains: &DomainSet,
    output_dir: &Path,
    quota: &str,
    dedup: AssetDedup,
) -> Result<AssetBatch> {
    let Some(pattern) = asset_pattern(domains)? else {
        return Ok(AssetBatch::default());
    };
    let urls = extract_asset_urls(content, &pattern, dedup);
    if urls.is_empty() {
        return Ok(AssetBatch::default());
    }

    let mut list = NamedTempFile::with_prefix("sitemirror-urls-")
        .context("failed to create temporary URL list")?;
    for url in &urls {
        writeln!(list, "{url}").context("failed to write URL to temporary list")?;
    }
    list.flush().context("failed to flush temporary URL list")?;

    tracing::debug!(count = urls.len(), list = %list.path().display(), "fetching asset batch");
    toolchain
        .fetch_url_list(list.path(), quota, output_dir)?
        .ensure_success("wget2")
        .with_context(|| format!("failed to fetch {} referenced assets", urls.len()))?;

    Ok(AssetBatch {
        urls: urls.len(),
        fetched: true,
    })
}

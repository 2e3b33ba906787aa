use std::borrow::Cow;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::bytes::{NoExpand, Regex};

use crate::target::DomainSet;

/// `https://<domain>` -> `./<domain>` over raw bytes; everything else in the
/// content is left as it was. Running it twice is a no-op because the absolute
/// form no longer occurs after the first pass.
pub fn rewrite_content<'a>(content: &'a [u8], domain: &str) -> Result<Cow<'a, [u8]>> {
    let absolute = Regex::new(&regex::escape(&format!("https://{domain}")))
        .with_context(|| format!("failed to build rewrite pattern for {domain}"))?;
    let local = format!("./{domain}");
    Ok(absolute.replace_all(content, NoExpand(local.as_bytes())))
}

/// Rewrites absolute references for every domain in place. Returns whether the
/// file changed; unchanged files are not written back.
pub fn rewrite_references(path: &Path, domains: &DomainSet) -> Result<bool> {
    let mut changed = false;
    for domain in domains.iter() {
        let content = fs::read(path).with_context(|| {
            format!("failed to read {} while rewriting {domain}", path.display())
        })?;
        if let Cow::Owned(updated) = rewrite_content(&content, domain)? {
            fs::write(path, updated).with_context(|| {
                format!("failed to write {} while rewriting {domain}", path.display())
            })?;
            changed = true;
        }
    }
    if changed {
        tracing::debug!(path = %path.display(), "rewrote absolute references");
    }
    Ok(changed)
}

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::profile::Profile;

/// Host names treated as "same site". Insertion order is kept, repeats are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainSet(Vec<String>);

impl DomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: &str) -> bool {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() || self.0.contains(&domain) {
            return false;
        }
        self.0.push(domain);
        true
    }

    pub fn extend<'a>(&mut self, domains: impl IntoIterator<Item = &'a str>) {
        for domain in domains {
            self.insert(domain);
        }
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.iter().any(|item| item == domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined form used for the fetcher's `--domains` allow-list.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl<'a> FromIterator<&'a str> for DomainSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Literal find -> replace pairs applied to mirrored HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteRules(BTreeMap<String, String>);

impl RewriteRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, find: impl Into<String>, replace: impl Into<String>) {
        self.0.insert(find.into(), replace.into());
    }

    /// Right-biased merge: entries from `other` win on equal keys.
    pub fn merged_with(&self, other: &RewriteRules) -> RewriteRules {
        let mut merged = self.0.clone();
        for (find, replace) in &other.0 {
            merged.insert(find.clone(), replace.clone());
        }
        RewriteRules(merged)
    }

    pub fn get(&self, find: &str) -> Option<&str> {
        self.0.get(find).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(find, replace)| (find.as_str(), replace.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RewriteRules {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut rules = Self::new();
        for (find, replace) in iter {
            rules.insert(find, replace);
        }
        rules
    }
}

/// Literal filename suffixes such as `?lossless=1`, in match priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuerySuffixes(Vec<String>);

impl QuerySuffixes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, suffix: &str) -> bool {
        if suffix.is_empty() || self.0.iter().any(|item| item == suffix) {
            return false;
        }
        self.0.push(suffix.to_string());
        true
    }

    pub fn extend<'a>(&mut self, suffixes: impl IntoIterator<Item = &'a str>) {
        for suffix in suffixes {
            self.push(suffix);
        }
    }

    /// First suffix (in order) that `name` ends with, as long as stripping it
    /// leaves a non-empty canonical name.
    pub fn matching(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .map(String::as_str)
            .find(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for QuerySuffixes {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut suffixes = Self::new();
        suffixes.extend(iter);
        suffixes
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetOptions {
    pub url: String,
    pub output_dir: Option<PathBuf>,
    pub clean: bool,
    pub archive_path: Option<PathBuf>,
    pub domains: Vec<String>,
    pub rewrite_rules: Vec<(String, String)>,
    pub query_suffixes: Vec<String>,
}

/// Everything one run needs to know about the site being mirrored. Built once,
/// then only replaced wholesale by [`TargetDescriptor::with_profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDescriptor {
    pub source: String,
    pub host: String,
    pub output_dir: PathBuf,
    pub clean: bool,
    pub archive_path: PathBuf,
    pub domains: DomainSet,
    pub rewrite_rules: RewriteRules,
    pub query_suffixes: QuerySuffixes,
    pub profiles: Vec<String>,
}

impl TargetDescriptor {
    pub fn new(options: TargetOptions, cwd: &Path) -> Result<Self> {
        let source = normalize_source(&options.url);
        let host = source_host(&source);
        if host.is_empty() {
            bail!("target URL has no host: {:?}", options.url);
        }

        let output_dir = match options.output_dir {
            Some(path) if path.is_absolute() => path,
            Some(path) => cwd.join(path),
            None => cwd.join(&source),
        };
        let archive_path = match options.archive_path {
            Some(path) if path.is_absolute() => path,
            Some(path) => cwd.join(path),
            None => default_archive_path(&output_dir),
        };

        let mut domains = DomainSet::new();
        domains.extend(options.domains.iter().map(String::as_str));
        domains.insert(registrable_domain(&host));

        Ok(Self {
            source,
            host,
            output_dir,
            clean: options.clean,
            archive_path,
            domains,
            rewrite_rules: options.rewrite_rules.into_iter().collect(),
            query_suffixes: options.query_suffixes.iter().map(String::as_str).collect(),
            profiles: Vec::new(),
        })
    }

    /// Returns a new descriptor with the profile folded in. Domains and
    /// suffixes only ever grow; rewrite rules from the profile override
    /// caller rules with the same key.
    pub fn with_profile(&self, profile: &Profile) -> Self {
        let mut next = self.clone();
        next.domains.extend(profile.domains.iter().map(String::as_str));
        next.query_suffixes
            .extend(profile.query_suffixes.iter().map(String::as_str));
        next.rewrite_rules = self.rewrite_rules.merged_with(&profile.rewrite_rules());
        next.profiles.push(profile.name.clone());
        next
    }

    /// Nested directory the recursive fetcher writes into.
    pub fn nested_dir(&self) -> PathBuf {
        self.output_dir.join(&self.host)
    }

    /// Creates the output directory, wiping its contents first when `clean` is set.
    pub fn prepare_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        if self.clean {
            remove_contents(&self.output_dir)?;
            tracing::info!(path = %self.output_dir.display(), "cleaned output directory");
        }
        Ok(())
    }
}

/// Strips the scheme plus trailing `.`, ` ` and `/` characters.
pub fn normalize_source(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    without_scheme
        .trim_end_matches(['.', ' ', '/'])
        .to_string()
}

fn source_host(source: &str) -> String {
    let authority = source.split(['/', '?', '#']).next().unwrap_or("");
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|ch| ch.is_ascii_digit()) => host,
        _ => authority,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// eTLD+1 of `host` per the public suffix list; hosts without a registrable
/// part (bare TLDs, `localhost`, IPs) are returned unchanged.
pub fn registrable_domain(host: &str) -> &str {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    psl::domain_str(host).unwrap_or(host)
}

fn default_archive_path(output_dir: &Path) -> PathBuf {
    let mut name = output_dir
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "site".into());
    name.push(".zip");
    output_dir.with_file_name(name)
}

fn remove_contents(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

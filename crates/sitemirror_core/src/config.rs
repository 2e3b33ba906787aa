use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::profile::{Profile, ProfileRegistry};

pub const DEFAULT_CONFIG_FILENAME: &str = "sitemirror.toml";
pub const DEFAULT_DEPTH: u32 = 5;
pub const DEFAULT_QUOTA: &str = "120m";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MirrorConfig {
    #[serde(default)]
    pub mirror: MirrorSection,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MirrorSection {
    pub depth: Option<u32>,
    pub quota: Option<String>,
    pub wget_path: Option<PathBuf>,
    #[serde(default)]
    pub dedupe_assets: bool,
}

impl MirrorConfig {
    /// Recursion depth: env SITEMIRROR_DEPTH > config > DEFAULT_DEPTH.
    pub fn depth(&self) -> u32 {
        env_value("SITEMIRROR_DEPTH")
            .and_then(|value| value.parse::<u32>().ok())
            .or(self.mirror.depth)
            .unwrap_or(DEFAULT_DEPTH)
    }

    /// Byte quota in wget notation: env SITEMIRROR_QUOTA > config > DEFAULT_QUOTA.
    pub fn quota(&self) -> String {
        env_value("SITEMIRROR_QUOTA")
            .or_else(|| self.mirror.quota.clone())
            .unwrap_or_else(|| DEFAULT_QUOTA.to_string())
    }

    /// Explicit wget2 binary: env SITEMIRROR_WGET2 > config > None (PATH lookup).
    pub fn wget_path(&self) -> Option<PathBuf> {
        env_value("SITEMIRROR_WGET2")
            .map(PathBuf::from)
            .or_else(|| self.mirror.wget_path.clone())
    }

    pub fn registry(&self) -> ProfileRegistry {
        ProfileRegistry::builtin().with_custom(&self.profiles)
    }
}

fn env_value(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Explicit path > env SITEMIRROR_CONFIG > `<cwd>/sitemirror.toml`.
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(value) = env_value("SITEMIRROR_CONFIG") {
        return PathBuf::from(value);
    }
    cwd.join(DEFAULT_CONFIG_FILENAME)
}

/// Load and parse a MirrorConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MirrorConfig> {
    if !config_path.exists() {
        return Ok(MirrorConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MirrorConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), profiles = parsed.profiles.len(), "loaded config");
    Ok(parsed)
}

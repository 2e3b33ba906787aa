use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::target::RewriteRules;

/// Profile name that selects nothing.
pub const NO_PROFILE: &str = "none";

/// Site-builder specific additions to a run: extra asset hosts, HTML rewrite
/// rules and query suffixes the builder appends to asset URLs.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub replace: BTreeMap<String, String>,
    #[serde(default)]
    pub query_suffixes: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl Profile {
    pub fn rewrite_rules(&self) -> RewriteRules {
        self.replace
            .iter()
            .map(|(find, replace)| (find.clone(), replace.clone()))
            .collect()
    }
}

const FRAMER_DOMAINS: &[&str] = &[
    "framerusercontent.com",
    "events.framer.com",
    "framer.app",
    "framer.website",
];

const FRAMER_QUERY_SUFFIXES: &[&str] = &["?lossless=1"];

fn framer() -> Profile {
    profile(
        "framer",
        FRAMER_DOMAINS,
        &[
            ("../events.framer.com", "./events.framer.com"),
            ("../framerusercontent", "./framerusercontent"),
            ("./framer.com/m/", "framer.com/m/"),
        ],
        FRAMER_QUERY_SUFFIXES,
    )
}

fn framer_remove_watermark() -> Profile {
    profile(
        "framer-remove-watermark",
        FRAMER_DOMAINS,
        &[
            ("../events.framer.com", "./events.framer.com"),
            ("../framerusercontent", "./framerusercontent"),
            (
                r#"<div id="__framer-badge-container">"#,
                r#"<div id="__framer-badge-container" style="display: none">"#,
            ),
        ],
        FRAMER_QUERY_SUFFIXES,
    )
}

fn webflow() -> Profile {
    profile("webflow", &["website-files.com"], &[], &[])
}

fn profile(
    name: &str,
    domains: &[&str],
    replace: &[(&str, &str)],
    query_suffixes: &[&str],
) -> Profile {
    Profile {
        name: name.to_string(),
        version: 1,
        domains: domains.iter().map(ToString::to_string).collect(),
        replace: replace
            .iter()
            .map(|(find, replace)| (find.to_string(), replace.to_string()))
            .collect(),
        query_suffixes: query_suffixes.iter().map(ToString::to_string).collect(),
    }
}

/// Known profiles by name: the built-in set, optionally extended (or
/// overridden by name) with profiles from the config file.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Profile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileRegistry {
    pub fn builtin() -> Self {
        let profiles = [framer(), framer_remove_watermark(), webflow()]
            .into_iter()
            .map(|profile| (profile.name.clone(), profile))
            .collect();
        Self { profiles }
    }

    pub fn with_custom(mut self, custom: &BTreeMap<String, Profile>) -> Self {
        for (name, profile) in custom {
            let mut profile = profile.clone();
            profile.name = name.clone();
            if self.profiles.contains_key(name) {
                tracing::debug!(profile = %name, "config profile overrides built-in");
            }
            self.profiles.insert(name.clone(), profile);
        }
        self
    }

    /// `Ok(None)` for [`NO_PROFILE`]; an [`MirrorError::UnknownProfile`] for
    /// anything not registered.
    pub fn lookup(&self, name: &str) -> Result<Option<&Profile>> {
        let name = name.trim();
        if name.eq_ignore_ascii_case(NO_PROFILE) {
            return Ok(None);
        }
        match self.profiles.get(name) {
            Some(profile) => Ok(Some(profile)),
            None => Err(MirrorError::UnknownProfile {
                name: name.to_string(),
                known: self.names().join(", "),
            }
            .into()),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }
}

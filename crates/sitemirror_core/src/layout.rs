use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::MirrorError;
use crate::target::TargetDescriptor;
use crate::tools::Toolchain;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayoutReport {
    pub rules_applied: usize,
    /// `false` when the tree was already flat and that was tolerated.
    pub flattened: bool,
    pub moved: Vec<PathBuf>,
    pub move_failures: Vec<PathBuf>,
}

/// Applies every rewrite rule to the mirrored HTML, then flattens
/// `<output>/<host>/` into `<output>/`. With `allow_normalized`, a missing
/// nested directory is logged and reported as `flattened: false` instead of
/// failing with [`MirrorError::NestedDirectoryMissing`].
pub fn normalize_layout(
    toolchain: &dyn Toolchain,
    target: &TargetDescriptor,
    allow_normalized: bool,
) -> Result<LayoutReport> {
    let rules_applied = replace_in_html(toolchain, target)?;
    let mut report = match flatten_nested_dir(target) {
        Ok(report) => report,
        Err(error) if allow_normalized && MirrorError::is_nested_directory_missing(&error) => {
            tracing::warn!("{error}; assuming the layout is already normalized");
            LayoutReport::default()
        }
        Err(error) => return Err(error),
    };
    report.rules_applied = rules_applied;
    Ok(report)
}

/// One in-place substitution pass per rule. The first failing rule stops the
/// remaining ones.
fn replace_in_html(toolchain: &dyn Toolchain, target: &TargetDescriptor) -> Result<usize> {
    let mut applied = 0;
    for (find, replace) in target.rewrite_rules.iter() {
        tracing::debug!(find, replace, "rewriting html");
        toolchain
            .substitute_in_html(find, replace, &target.output_dir)
            .and_then(|outcome| outcome.ensure_success("sed"))
            .with_context(|| format!("failed to update {find} references"))?;
        applied += 1;
    }
    Ok(applied)
}

/// Promotes every child of the nested host directory to the output root and
/// removes the nested directory. An empty or absent nested directory yields
/// [`MirrorError::NestedDirectoryMissing`].
fn flatten_nested_dir(target: &TargetDescriptor) -> Result<LayoutReport> {
    let nested = target.nested_dir();
    let mut children = Vec::new();
    if nested.is_dir() {
        let entries =
            fs::read_dir(&nested).with_context(|| format!("failed to read {}", nested.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read {}", nested.display()))?;
            children.push(entry.path());
        }
    }
    if children.is_empty() {
        return Err(MirrorError::NestedDirectoryMissing { path: nested }.into());
    }
    children.sort();

    let mut report = LayoutReport {
        flattened: true,
        ..LayoutReport::default()
    };
    for child in children {
        let Some(name) = child.file_name() else {
            continue;
        };
        let destination = target.output_dir.join(name);
        match move_entry(&child, &destination) {
            Ok(()) => report.moved.push(destination),
            Err(error) => {
                tracing::warn!(path = %child.display(), error = %format!("{error:#}"), "failed to move file");
                report.move_failures.push(child);
            }
        }
    }

    fs::remove_dir_all(&nested)
        .with_context(|| format!("failed to remove folder {}", nested.display()))?;
    tracing::info!(moved = report.moved.len(), from = %nested.display(), "flattened mirror layout");
    Ok(report)
}

fn move_entry(from: &Path, to: &Path) -> Result<()> {
    if to.is_dir() && from.is_dir() {
        // A directory of the same name already sits at the root: merge into it.
        let entries =
            fs::read_dir(from).with_context(|| format!("failed to read {}", from.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read {}", from.display()))?;
            move_entry(&entry.path(), &to.join(entry.file_name()))?;
        }
        return Ok(());
    }
    fs::rename(from, to)
        .with_context(|| format!("failed to move {} to {}", from.display(), to.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetOptions;
    use crate::testing::{Invocation, RecordingToolchain};
    use crate::tools::ToolOutcome;
    use tempfile::tempdir;

    fn target(root: &Path, rules: &[(&str, &str)]) -> TargetDescriptor {
        TargetDescriptor::new(
            TargetOptions {
                url: "example.com".to_string(),
                output_dir: Some(root.join("out")),
                rewrite_rules: rules
                    .iter()
                    .map(|(find, replace)| (find.to_string(), replace.to_string()))
                    .collect(),
                ..TargetOptions::default()
            },
            root,
        )
        .expect("target")
    }

    #[test]
    fn nested_host_directory_is_promoted() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[]);
        let nested = target.output_dir.join("example.com");
        fs::create_dir_all(nested.join("assets")).expect("mkdir");
        fs::write(nested.join("index.html"), "<html></html>").expect("write index");
        fs::write(nested.join("assets/app.js"), "").expect("write js");

        let report = flatten_nested_dir(&target).expect("flatten");

        assert!(target.output_dir.join("index.html").exists());
        assert!(target.output_dir.join("assets/app.js").exists());
        assert!(!nested.exists());
        assert_eq!(report.moved.len(), 2);
        assert!(report.move_failures.is_empty());
    }

    #[test]
    fn sibling_domain_directories_are_left_alone() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[]);
        fs::create_dir_all(target.output_dir.join("example.com")).expect("mkdir");
        fs::write(target.output_dir.join("example.com/index.html"), "x").expect("write");
        fs::create_dir_all(target.output_dir.join("framerusercontent.com/images")).expect("mkdir");
        fs::write(target.output_dir.join("framerusercontent.com/images/a.png"), "png")
            .expect("write");

        flatten_nested_dir(&target).expect("flatten");
        assert!(target.output_dir.join("framerusercontent.com/images/a.png").exists());
    }

    #[test]
    fn already_flat_tree_is_a_distinguishable_error() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[]);
        fs::create_dir_all(&target.output_dir).expect("mkdir");
        fs::write(target.output_dir.join("index.html"), "x").expect("write");

        let error = flatten_nested_dir(&target).expect_err("nothing to move");
        assert!(MirrorError::is_nested_directory_missing(&error));
        assert!(target.output_dir.join("index.html").exists());
    }

    #[test]
    fn existing_directory_at_root_is_merged() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[]);
        fs::create_dir_all(target.output_dir.join("assets")).expect("mkdir root assets");
        fs::write(target.output_dir.join("assets/old.js"), "").expect("write old");
        fs::create_dir_all(target.output_dir.join("example.com/assets")).expect("mkdir nested");
        fs::write(target.output_dir.join("example.com/assets/new.js"), "").expect("write new");

        flatten_nested_dir(&target).expect("flatten");
        assert!(target.output_dir.join("assets/old.js").exists());
        assert!(target.output_dir.join("assets/new.js").exists());
        assert!(!target.output_dir.join("example.com").exists());
    }

    #[test]
    fn rules_run_once_each_before_flattening() {
        let temp = tempdir().expect("tempdir");
        let target = target(
            temp.path(),
            &[
                ("../framerusercontent", "./framerusercontent"),
                (
                    r#"<div id="__framer-badge-container">"#,
                    r#"<div id="__framer-badge-container" style="display: none">"#,
                ),
            ],
        );
        let nested = target.output_dir.join("example.com");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(
            nested.join("index.html"),
            r#"<img src="../framerusercontent.com/a.png"><div id="__framer-badge-container">"#,
        )
        .expect("write");

        let toolchain = RecordingToolchain::default();
        let report = normalize_layout(&toolchain, &target, false).expect("normalize");

        assert_eq!(report.rules_applied, 2);
        assert!(report.flattened);
        let substitutions = toolchain
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Invocation::Substitute { .. }))
            .count();
        assert_eq!(substitutions, 2);
        let html = fs::read_to_string(target.output_dir.join("index.html")).expect("read");
        assert_eq!(
            html,
            r#"<img src="./framerusercontent.com/a.png"><div id="__framer-badge-container" style="display: none">"#
        );
    }

    #[test]
    fn failing_rule_stops_the_remaining_rules() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[("a", "b"), ("c", "d")]);
        fs::create_dir_all(target.output_dir.join("example.com")).expect("mkdir");
        fs::write(target.output_dir.join("example.com/index.html"), "ac").expect("write");
        let toolchain = RecordingToolchain {
            substitute_outcome: ToolOutcome::Failure {
                code: 4,
                message: "exit status: 4".to_string(),
            },
            ..RecordingToolchain::default()
        };

        let error = normalize_layout(&toolchain, &target, false).expect_err("rule failure");

        assert!(error.to_string().contains("failed to update a references"));
        assert_eq!(
            toolchain.calls(),
            vec![Invocation::Substitute {
                find: "a".to_string(),
                replace: "b".to_string(),
            }]
        );
        assert!(target.output_dir.join("example.com/index.html").exists());
    }

    #[test]
    fn failed_move_is_recorded_and_nested_directory_still_removed() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[]);
        let nested = target.output_dir.join("example.com");
        fs::create_dir_all(nested.join("assets")).expect("mkdir nested assets");
        fs::write(nested.join("assets/app.js"), "").expect("write js");
        fs::write(nested.join("index.html"), "x").expect("write index");
        fs::write(target.output_dir.join("assets"), "not a directory").expect("write blocker");

        let report = flatten_nested_dir(&target).expect("flatten");

        assert_eq!(report.move_failures, vec![nested.join("assets")]);
        assert_eq!(report.moved, vec![target.output_dir.join("index.html")]);
        assert!(!nested.exists());
        assert_eq!(
            fs::read_to_string(target.output_dir.join("assets")).expect("blocker kept"),
            "not a directory"
        );
    }

    #[test]
    fn already_flat_tree_can_be_tolerated() {
        let temp = tempdir().expect("tempdir");
        let target = target(temp.path(), &[("x", "y")]);
        fs::create_dir_all(&target.output_dir).expect("mkdir");
        fs::write(target.output_dir.join("index.html"), "x").expect("write");
        let toolchain = RecordingToolchain::default();

        let error = normalize_layout(&toolchain, &target, false).expect_err("strict");
        assert!(MirrorError::is_nested_directory_missing(&error));

        let report = normalize_layout(&toolchain, &target, true).expect("tolerant");
        assert!(!report.flattened);
        assert_eq!(report.rules_applied, 1);
        assert_eq!(
            fs::read_to_string(target.output_dir.join("index.html")).expect("read"),
            "y"
        );
    }
}

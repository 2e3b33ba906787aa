use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs"];

/// Regular files under `root`, filtered by a name predicate. Each call to
/// [`FileSequence::iter`] starts a fresh walk, so the same sequence can be
/// consumed once per pipeline pass.
#[derive(Debug, Clone)]
pub struct FileSequence {
    root: PathBuf,
    filter: fn(&str) -> bool,
}

impl FileSequence {
    pub fn new(root: impl Into<PathBuf>, filter: fn(&str) -> bool) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    /// Lazily yields matching paths in a stable (name-sorted) order. Walk
    /// errors are yielded with the failing path attached; callers are expected
    /// to stop at the first one.
    pub fn iter(&self) -> impl Iterator<Item = Result<PathBuf>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(error) => {
                        let path = error
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| self.root.clone());
                        return Some(
                            Err::<PathBuf, _>(error)
                                .with_context(|| format!("failed to walk {}", path.display())),
                        );
                    }
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let keep = (self.filter)(&entry.file_name().to_string_lossy());
                if keep {
                    Some(Ok(entry.into_path()))
                } else {
                    None
                }
            })
    }
}

pub fn is_script(name: &str) -> bool {
    has_extension(name, SCRIPT_EXTENSIONS)
}

pub fn is_html(name: &str) -> bool {
    has_extension(name, &["html"])
}

pub fn any_file(_name: &str) -> bool {
    true
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && extensions.contains(&ext),
        None => false,
    }
}

/// `.js` and `.mjs` files under the mirror root.
pub fn script_files(root: impl Into<PathBuf>) -> FileSequence {
    FileSequence::new(root, is_script)
}

//! Errors callers need to tell apart. Everything else travels as `anyhow::Error`
//! with path context attached; these are recovered with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("required tool `{tool}` was not found in PATH")]
    ToolMissing { tool: String },

    #[error("{tool} exited with code {code}: {message}")]
    FetchFailed {
        tool: String,
        code: i32,
        message: String,
    },

    /// Nothing to promote under `<output>/<host>/`. Either the mirror is
    /// incomplete or the layout was already normalized by an earlier run.
    #[error("no files found to move under {}", path.display())]
    NestedDirectoryMissing { path: PathBuf },

    #[error("profile `{name}` not found (known: {known})")]
    UnknownProfile { name: String, known: String },
}

impl MirrorError {
    pub fn is_nested_directory_missing(error: &anyhow::Error) -> bool {
        matches!(
            error.downcast_ref::<MirrorError>(),
            Some(MirrorError::NestedDirectoryMissing { .. })
        )
    }
}

//! Classified failures of the explorer module.
//!
//! Most fallible functions in this crate return [`anyhow::Result`] and annotate
//! errors with context. When a failure needs to be told apart by the caller, a
//! [`ModuleError`] is placed at the root of the chain and can be recovered with
//! `err.downcast_ref::<ModuleError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error(
        "Permission denied while writing {}. Re-run the command with elevated privileges \
         (e.g. sudo) or fix the ownership of the data directory.",
        .path.display()
    )]
    PermissionDenied { path: PathBuf },

    #[error("Failed to spawn `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program} {}` exited with code {}: {stderr}", .args.join(" "), .code.map_or("<signal>".to_string(), |c| c.to_string()))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid version tag: {0:?}")]
    InvalidVersionTag(String),

    #[error("No version tag found: {0}")]
    NoVersionTag(String),

    #[error("Target network returned an invalid block height: {0:?}")]
    InvalidBlockHeight(String),

    #[error("Failed to query the target network height: {0}")]
    TargetHeightUnavailable(String),

    #[error("Indexer did not converge after {0} attempts")]
    ReadinessAttemptsExhausted(u32),

    #[error("The explorer module is not installed for the current network")]
    NotInstalled,
}

impl ModuleError {
    /// Rewrites a provisioning failure into [`ModuleError::PermissionDenied`] when an
    /// [`std::io::Error`] of kind `PermissionDenied` is part of its chain.
    ///
    /// Any other error is returned unchanged.
    pub fn classify_permission(err: anyhow::Error, path: impl Into<PathBuf>) -> anyhow::Error {
        let denied = err.chain().any(|cause| {
            cause
                .downcast_ref::<std::io::Error>()
                .is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
        });

        if denied {
            ModuleError::PermissionDenied { path: path.into() }.into()
        } else {
            err
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionId;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(
        "`{program}` was not found. Install the assistant CLI and make sure it is on your PATH \
         (or set \"command\" in the marginalia config to its full path)."
    )]
    ToolNotInstalled { program: String },

    #[error("session {session_id} is already in use: {detail}")]
    SessionConflict { session_id: SessionId, detail: String },

    #[error("workspace directory {path} was not found; reopen the workspace")]
    WorkspaceMissing { path: PathBuf },

    #[error("assistant failed: {detail}")]
    ToolFailed { detail: String },

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    #[must_use]
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::ToolNotInstalled { .. } | Self::WorkspaceMissing { .. }
        ) || is_user_correctable(&self.to_string())
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("prompt template must contain the {placeholder} placeholder")]
    MissingPlaceholder { placeholder: &'static str },

    #[error("prompt template contains {count} {placeholder} placeholders; expected exactly one")]
    MultiplePlaceholders {
        placeholder: &'static str,
        count: usize,
    },

    #[error("I/O error on prompt template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const USER_CORRECTABLE_HINTS: &[&str] = &[
    "not found",
    "not installed",
    "not on path",
    "on your path",
    "$path",
    "permission denied",
    "not logged in",
    "login",
    "api key",
];

/// Whether a failure looks like something the user has to fix before a retry can succeed.
///
/// Advisory only: it decides whether a "Retry" affordance is shown, never whether
/// retrying is allowed.
pub fn is_user_correctable(message: &str) -> bool {
    let lower = message.to_lowercase();
    USER_CORRECTABLE_HINTS.iter().any(|hint| lower.contains(hint))
}

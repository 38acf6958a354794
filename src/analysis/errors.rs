//! Analysis errors
//!
//! Uses thiserror so the server can decide per variant whether a failure is worth telling
//! the user about. Only actionable failures produce a notice; the rest are logged and end
//! in an empty diagnostic set.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to start {}: {source}", .binary.display())]
    SpawnFailed {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Analyzer exited with {}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Malformed analyzer output: {reason}")]
    MalformedPayload { reason: String },

    #[error("I/O error while preparing analysis: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedded compiler failed: {reason}")]
    Backend { reason: String, notify: bool },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl AnalysisError {
    pub fn malformed(reason: impl ToString) -> Self {
        Self::MalformedPayload {
            reason: reason.to_string(),
        }
    }

    /// Text to show in the editor, if this failure is one the user can act on.
    pub fn user_notice(&self) -> Option<String> {
        match self {
            Self::SpawnFailed { binary, .. } => {
                Some(format!("Failed to start {}", binary.display()))
            }
            Self::Backend {
                reason,
                notify: true,
            } => Some(reason.clone()),
            _ => None,
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

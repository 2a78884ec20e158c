use std::io;

use thiserror::Error;

/// Why a source could not be listed or opened.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("source `{0}` is not selectable")]
    NotSelectable(String),

    #[error("source `{0}` resolves outside the base directory")]
    OutsideBase(String),

    #[error("command source has no program")]
    EmptyCommand,

    #[error("failed to launch `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse {file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("no function encloses line {line}")]
    NoEnclosingFunction { line: usize },

    #[error("failed to print syntax tree: {0}")]
    Print(String),

    #[error("invalid config {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A parameter whose binding shape cannot be listed in the START snapshot.
///
/// Not fatal: the parameter is left out and the toggle continues.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[error("parameter {index} ({shape}) omitted from the START snapshot")]
pub struct UnresolvableParameter {
    /// Zero-based position in the parameter list.
    pub index: usize,
    pub shape: &'static str,
}

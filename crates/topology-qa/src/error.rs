use std::path::PathBuf;
use topology_qa_lib::QaError;

/// Errors surfaced by the command line tool
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid WKT in {} line {line}: {message}", path.display())]
    Wkt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid fence geometry: {0}")]
    Fence(String),

    #[error(transparent)]
    Qa(#[from] QaError),

    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Computation cancelled")]
    Cancelled,
}

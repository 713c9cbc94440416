use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed transaction at index {index}: {reason}")]
    MalformedTransaction { index: usize, reason: String },

    #[error("Transaction source mismatch: expected '{expected}', found '{found}'")]
    SourceMismatch { expected: String, found: String },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Scraper for '{source_name}' failed: {message}")]
    Scraper { source_name: String, message: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PnlError {
    #[error("Unsupported file format (mime: '{mime}', filename: '{filename}'). Please upload CSV or Excel files.")]
    UnsupportedFormat { mime: String, filename: String },

    #[error("File is empty or contains no valid data")]
    EmptyDocument,

    #[error("No valid P&L data found. Please ensure your file contains Revenue, COGS, and Operating Expenses columns.")]
    NoValidRows,

    #[error("File of {size} bytes exceeds the upload limit of {limit} bytes")]
    SizeExceeded { size: usize, limit: usize },

    #[error("Structure inference unavailable: {0}")]
    StructureInferenceUnavailable(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Spreadsheet decoding error: {0}")]
    Spreadsheet(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PnlError>;

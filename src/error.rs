use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to fetch data for {lcsc_id}: {reason}")]
    FetchFailure { lcsc_id: String, reason: String },

    #[error("No CAD data received for component {0}")]
    EmptyData(String),

    #[error("{kind} '{name}' already exists for {lcsc_id}. Set overwrite to update.")]
    AlreadyExists {
        kind: &'static str,
        name: String,
        lcsc_id: String,
    },

    #[error("{count} symbols named '{name}' in {path}, refusing to pick one")]
    AmbiguousSymbol {
        name: String,
        count: usize,
        path: String,
    },

    #[error("Missing permissions to create '{path}': {source}")]
    PermissionDenied {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Missing expected data: {0}")]
    MissingData(String),

    #[error("3D model conversion failed: {0}")]
    ModelConversionError(String),

    #[error("Conversion queue is no longer running")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

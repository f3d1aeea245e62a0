use island_map_lib::MapError;

/// Everything that can stop a command
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error("Invalid feed: {0}")]
    InvalidFeed(String),

    #[error("Unknown point of interest: {0}")]
    UnknownPoi(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

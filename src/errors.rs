use thiserror::Error;

#[derive(Debug, Error)]
pub enum PalettaError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stored state: {0}")]
    Corrupt(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Item #{0} is already in your collection")]
    AlreadyExists(i64),

    #[error("Stale listing: rendered at revision {found}, store is at revision {expected}")]
    StaleSnapshot { expected: u64, found: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl PalettaError {
    /// True for failures of the persistence layer itself, as opposed to
    /// rejections decided by the store.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            PalettaError::Storage(_)
                | PalettaError::Io(_)
                | PalettaError::Serialization(_)
                | PalettaError::Corrupt(_)
                | PalettaError::Network(_)
                | PalettaError::Remote { .. }
        )
    }
}

impl From<reqwest::Error> for PalettaError {
    fn from(e: reqwest::Error) -> Self {
        PalettaError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PalettaError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown entity '{id}'")]
    UnknownEntity { id: String },

    #[error("Unknown planet '{id}'")]
    UnknownPlanet { id: String },

    #[error("Invalid action: {reason}")]
    InvalidAction { reason: String },

    #[error("Run not initialized")]
    RunNotInitialized,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidAction { reason: reason.into() }
    }
}

pub type SimResult<T> = Result<T, SimError>;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Server {host}:{port} unreachable after {attempts} attempts")]
    Unreachable {
        host: String,
        port: u16,
        attempts: u32,
    },
    #[error("Can not login into the server after {attempts} attempts")]
    AuthExhausted { attempts: u32 },
    #[error("Required {kind} '{name}' does not exist on the server")]
    PrerequisiteMissing { kind: &'static str, name: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Import of {file} was rejected: {source}")]
    Import {
        file: String,
        #[source]
        source: ApiError,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Interrupted by user")]
    Interrupted,
}

impl ProvisionError {
    pub fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        ProvisionError::PrerequisiteMissing {
            kind,
            name: name.into(),
        }
    }

    /// Transient API failures are the only recoverable class; callers that
    /// want a particular API failure to abort the run say so explicitly.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProvisionError::Api(_))
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

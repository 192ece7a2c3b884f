use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("not authorized: {0}")]
    Auth(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unrecognized response shape: {0}")]
    EnvelopeShape(String),
    #[error("a mutation for task {id} is already in flight")]
    MutationInFlight { id: String },
    #[error("no delete is pending confirmation")]
    NoPendingDelete,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

use std::{error::Error, fmt};

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("oracle returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode oracle reply: {0}")]
    Decode(String),
    #[error("oracle returned an empty reply")]
    EmptyReply,
}

#[derive(Debug)]
pub enum AuthError {
    Validation(String),
    EmailTaken,
    InvalidCredentials,
    Hash(String),
    Store(anyhow::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AuthError::*;
        match self {
            Validation(s) => write!(f, "{}", s),
            EmailTaken => write!(f, "Email is already registered"),
            InvalidCredentials => write!(f, "Invalid email or password"),
            Hash(s) => write!(f, "HashError: {}", s),
            Store(e) => write!(f, "StoreError: {}", e),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use AuthError::*;
        match self {
            Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(error: anyhow::Error) -> Self {
        AuthError::Store(error)
    }
}

impl From<libsql::Error> for AuthError {
    fn from(error: libsql::Error) -> Self {
        AuthError::Store(error.into())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(error: argon2::password_hash::Error) -> Self {
        AuthError::Hash(error.to_string())
    }
}

/// True when a store error came from a UNIQUE constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.to_string().contains("UNIQUE constraint failed"))
}

use thiserror::Error;

use crate::retry::Transient;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Session token has no subject")]
    MissingSubject,
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        SessionError::InvalidToken(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum UserContextError {
    #[error("User context provider unreachable: {0}")]
    Unreachable(String),

    #[error("User context provider timeout")]
    Timeout,

    #[error("User context rejected (status {status})")]
    Rejected { status: u16 },

    #[error("User context provider returned status {status}")]
    Status { status: u16 },

    #[error("Invalid response from user context provider: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UserContextError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UserContextError::Timeout
        } else {
            UserContextError::Unreachable(err.to_string())
        }
    }
}

impl Transient for UserContextError {
    fn is_transient(&self) -> bool {
        match self {
            UserContextError::Unreachable(_) | UserContextError::Timeout => true,
            UserContextError::Status { status } => *status >= 500,
            UserContextError::Rejected { .. } | UserContextError::InvalidResponse(_) => false,
        }
    }
}

use thiserror::Error;

use crate::retry::Transient;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Tenant not found in directory: {0}")]
    NotFound(String),

    #[error("Tenant directory unreachable: {0}")]
    Unreachable(String),

    #[error("Tenant directory timeout")]
    Timeout,

    #[error("Tenant directory returned status {status}")]
    Status { status: u16 },

    #[error("Invalid response from tenant directory: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DirectoryError::Timeout
        } else {
            DirectoryError::Unreachable(err.to_string())
        }
    }
}

impl Transient for DirectoryError {
    fn is_transient(&self) -> bool {
        match self {
            DirectoryError::Unreachable(_) | DirectoryError::Timeout => true,
            DirectoryError::Status { status } => *status >= 500,
            DirectoryError::NotFound(_) | DirectoryError::InvalidResponse(_) => false,
        }
    }
}

/// Every variant means the request has no usable tenant.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No subdomain in host '{0}'")]
    NoSubdomain(String),

    #[error("Invalid subdomain '{0}'")]
    InvalidSubdomain(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

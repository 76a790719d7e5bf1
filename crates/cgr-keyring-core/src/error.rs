//! Error types for cgr-keyring-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to get token for {service}: {source}")]
    Resolution {
        service: String,
        #[source]
        source: cgr_keyring_issuer::IssuerError,
    },

    #[error("{0} is not supported by the cgr-keyring backend")]
    Unsupported(&'static str),
}

impl CoreError {
    /// The issuer failure behind a resolution error
    pub fn issuer_error(&self) -> Option<&cgr_keyring_issuer::IssuerError> {
        match self {
            CoreError::Resolution { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

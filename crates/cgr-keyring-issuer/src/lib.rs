//! Token issuer trait and implementations for cgr-keyring
//!
//! This crate provides an abstraction over external token tools
//! (`chainctl` by default) so that credential resolution can be exercised
//! against a stub in tests.

mod cli_issuer;
mod error;
mod runner;
mod types;

pub use cli_issuer::CliIssuer;
pub use error::*;
pub use runner::{CommandRunner, SystemCommandRunner};
pub use types::*;

use async_trait::async_trait;

pub use tokio_util::sync::CancellationToken;

/// Trait for token issuers
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Obtain a bearer token scoped to `audience`.
    ///
    /// A single attempt; no retries and no internal timeout. Fails with
    /// [`IssuerError::Cancelled`] if `cancel` fires first.
    async fn issue(&self, audience: &str, cancel: &CancellationToken) -> Result<Token>;

    /// Check that the tool is installed and working, returning its version.
    ///
    /// Fails with [`IssuerError::Cancelled`] if `cancel` fires first.
    async fn ping(&self, cancel: &CancellationToken) -> Result<String>;

    /// Get issuer information
    fn info(&self) -> IssuerInfo;
}

//! Keyring-style credential backend interface
//!
//! Mirrors the password lookup protocol package managers use to consult a
//! keyring. Tokens are managed by the issuer, so storing or deleting
//! passwords is rejected.

use crate::resolver::CredentialResolver;
use crate::{CoreError, Result};
use async_trait::async_trait;
use cgr_keyring_config::TOKEN_USERNAME;
use cgr_keyring_issuer::Token;

/// Priority reported to hosts that rank multiple keyring backends
pub const BACKEND_PRIORITY: u32 = 9;

/// Username/password pair returned by [`KeyringBackend::get_credential`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: Token,
}

impl Credential {
    /// Credential presenting `token` under the fixed token username
    pub fn for_token(token: Token) -> Self {
        Self {
            username: TOKEN_USERNAME.to_string(),
            password: token,
        }
    }
}

/// Keyring backend operations
#[async_trait]
pub trait KeyringBackend: Send + Sync {
    /// Backend priority; higher wins when several backends are installed
    fn priority(&self) -> u32;

    /// Password for `service`, or `None` to defer to other backends
    async fn get_password(&self, service: &str, account: &str) -> Result<Option<Token>>;

    /// Credential for `service`, or `None` to defer to other backends
    async fn get_credential(&self, service: &str, account: &str) -> Result<Option<Credential>> {
        Ok(self
            .get_password(service, account)
            .await?
            .map(Credential::for_token))
    }

    async fn set_password(&self, service: &str, account: &str, password: &str) -> Result<()>;

    async fn delete_password(&self, service: &str, account: &str) -> Result<()>;
}

#[async_trait]
impl KeyringBackend for CredentialResolver {
    fn priority(&self) -> u32 {
        BACKEND_PRIORITY
    }

    async fn get_password(&self, service: &str, account: &str) -> Result<Option<Token>> {
        Ok(self.resolve(service, account).await?.into_token())
    }

    async fn set_password(&self, _service: &str, _account: &str, _password: &str) -> Result<()> {
        Err(CoreError::Unsupported("Setting passwords"))
    }

    async fn delete_password(&self, _service: &str, _account: &str) -> Result<()> {
        Err(CoreError::Unsupported("Deleting passwords"))
    }
}

//! Keyring protocol commands: get, set, del

use anyhow::Result;
use cgr_keyring_core::{Credential, CredentialResolver, KeyringBackend};
use cgr_keyring_issuer::CancellationToken;
use std::io::Write;

/// Print the token for `service`.
///
/// Returns `false` when the service is not handled by this backend, in which
/// case nothing is printed.
pub async fn get(
    resolver: &CredentialResolver,
    service: &str,
    account: &str,
    json: bool,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<bool> {
    let Some(token) = resolver
        .resolve_with_cancel(service, account, cancel)
        .await?
        .into_token()
    else {
        return Ok(false);
    };

    if json {
        let credential = Credential::for_token(token);
        let value = serde_json::json!({
            "username": credential.username,
            "password": credential.password.as_str(),
        });
        writeln!(out, "{}", value)?;
    } else {
        writeln!(out, "{}", token.as_str())?;
    }
    Ok(true)
}

/// Store a password; always rejected because tokens are issuer-managed
pub async fn set(resolver: &CredentialResolver, service: &str, account: &str) -> Result<()> {
    resolver.set_password(service, account, "").await?;
    Ok(())
}

/// Delete a password; always rejected because tokens are issuer-managed
pub async fn delete(resolver: &CredentialResolver, service: &str, account: &str) -> Result<()> {
    resolver.delete_password(service, account).await?;
    Ok(())
}

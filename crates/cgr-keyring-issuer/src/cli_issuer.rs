//! Token issuer backed by the `chainctl` command line tool
//!
//! Runs `<tool> auth token --audience=<audience>` and treats the trimmed
//! standard output as the bearer token.

use crate::{
    CommandRunner, IssuerError, IssuerInfo, Result, SystemCommandRunner, Token, TokenIssuer,
};
use async_trait::async_trait;
use cgr_keyring_config::IssuerConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Issues tokens by shelling out to an external tool
pub struct CliIssuer {
    /// Executable name or path
    tool: String,
    /// Fixed audience overriding the one requested by the caller
    audience: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl CliIssuer {
    /// Create an issuer running `tool` as a real child process
    pub fn new(tool: impl Into<String>) -> Self {
        Self::with_runner(tool, Arc::new(SystemCommandRunner::new()))
    }

    /// Create an issuer running `tool` through a custom runner
    pub fn with_runner(tool: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            tool: tool.into(),
            audience: None,
            runner,
        }
    }

    /// Create an issuer from the `[issuer]` configuration section
    pub fn from_config(config: &IssuerConfig) -> Self {
        let mut issuer = Self::new(config.tool.clone());
        issuer.audience = config.audience.clone();
        issuer
    }

    /// Always request tokens for this audience
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Arguments for a token request
    fn token_args(audience: &str) -> Vec<String> {
        vec![
            "auth".to_string(),
            "token".to_string(),
            format!("--audience={}", audience),
        ]
    }
}

#[async_trait]
impl TokenIssuer for CliIssuer {
    async fn issue(&self, audience: &str, cancel: &CancellationToken) -> Result<Token> {
        let audience = self.audience.as_deref().unwrap_or(audience);
        let args = Self::token_args(audience);
        tracing::debug!("Executing: {} {}", self.tool, args.join(" "));

        let output = self.runner.run(&self.tool, &args, cancel).await?;
        if !output.is_success() {
            tracing::debug!("{} failed: {}", self.tool, output.stderr.trim());
            return Err(IssuerError::execution(
                &self.tool,
                output.exit_code,
                &output.stderr,
            ));
        }

        let token = output.stdout.trim();
        if token.is_empty() {
            return Err(IssuerError::Issuance(self.tool.clone()));
        }

        Ok(Token::new(token))
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<String> {
        let output = self
            .runner
            .run(&self.tool, &["version".to_string()], cancel)
            .await?;
        if !output.is_success() {
            return Err(IssuerError::execution(
                &self.tool,
                output.exit_code,
                &output.stderr,
            ));
        }
        Ok(output.stdout.trim().to_string())
    }

    fn info(&self) -> IssuerInfo {
        IssuerInfo {
            tool: self.tool.clone(),
            audience: self.audience.clone(),
        }
    }
}

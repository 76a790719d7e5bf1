//! Test support utilities for cgr-keyring-core
//!
//! Provides MockIssuer for exercising the resolver and hook without a real
//! token tool on the PATH.

use async_trait::async_trait;
use cgr_keyring_issuer::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configurable mock token issuer for testing
pub struct MockIssuer {
    /// Audiences passed to `issue`, in call order
    pub calls: Arc<Mutex<Vec<String>>>,
    /// Results returned by successive `issue` calls
    results: Mutex<VecDeque<Result<Token>>>,
    /// Returned once `results` is exhausted
    fallback: Option<Token>,
    /// Simulated tool latency
    delay: Option<Duration>,
    /// Simulated latency of `ping`
    ping_delay: Option<Duration>,
    /// Whether `ping` reports the tool as installed
    tool_available: bool,
}

impl MockIssuer {
    /// Mock whose `issue` fails until results are pushed
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            results: Mutex::new(VecDeque::new()),
            fallback: None,
            delay: None,
            ping_delay: None,
            tool_available: true,
        }
    }

    /// Mock that always issues `token`
    pub fn with_token(token: &str) -> Self {
        Self {
            fallback: Some(Token::new(token)),
            ..Self::new()
        }
    }

    /// Sleep this long inside `issue`, honouring cancellation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep this long inside `ping`, honouring cancellation
    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    /// Make `ping` fail as if the tool were not installed
    pub fn without_tool(mut self) -> Self {
        self.tool_available = false;
        self
    }

    /// Queue a result for the next `issue` call
    pub fn push_result(&self, result: Result<Token>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Number of `issue` calls so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Audiences requested so far
    pub fn audiences(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenIssuer for MockIssuer {
    async fn issue(&self, audience: &str, cancel: &CancellationToken) -> Result<Token> {
        self.calls.lock().unwrap().push(audience.to_string());

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(IssuerError::Cancelled),
            }
        }

        if let Some(result) = self.results.lock().unwrap().pop_front() {
            return result;
        }
        match &self.fallback {
            Some(token) => Ok(token.clone()),
            None => Err(IssuerError::Issuance("mock".to_string())),
        }
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<String> {
        if let Some(delay) = self.ping_delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(IssuerError::Cancelled),
            }
        }

        if self.tool_available {
            Ok("mock version 1.0.0".to_string())
        } else {
            Err(IssuerError::ToolNotFound("mock".to_string()))
        }
    }

    fn info(&self) -> IssuerInfo {
        IssuerInfo {
            tool: "mock".to_string(),
            audience: None,
        }
    }
}

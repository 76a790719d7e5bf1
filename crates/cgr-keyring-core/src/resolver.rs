//! Credential resolution
//!
//! Gates requests on the domain matcher, serves tokens from the in-process
//! cache and falls back to the token issuer on a miss. Failures are never
//! cached, so the next call retries issuance.

use crate::cache::{CacheEntry, TokenCache};
use crate::eligibility::DomainMatcher;
use crate::{CoreError, Result};
use cgr_keyring_config::ResolverConfig;
use cgr_keyring_issuer::{CancellationToken, IssuerError, Token, TokenIssuer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a credential lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A token for the requested service
    Token(Token),
    /// The service is not ours; the caller should try other credential sources
    NotHandled,
}

impl Resolution {
    pub fn is_handled(&self) -> bool {
        matches!(self, Resolution::Token(_))
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            Resolution::Token(token) => Some(token),
            Resolution::NotHandled => None,
        }
    }

    pub fn into_token(self) -> Option<Token> {
        match self {
            Resolution::Token(token) => Some(token),
            Resolution::NotHandled => None,
        }
    }
}

/// Resolves credentials for eligible services, caching issued tokens
pub struct CredentialResolver {
    matcher: DomainMatcher,
    issuer: Arc<dyn TokenIssuer>,
    cache: TokenCache,
    /// Outer limit on a single issuance
    timeout: Option<Duration>,
}

impl CredentialResolver {
    /// Create a resolver for the default domain suffix, without a timeout
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            matcher: DomainMatcher::default(),
            issuer,
            cache: TokenCache::new(),
            timeout: None,
        }
    }

    /// Create a resolver from the `[resolver]` configuration section
    pub fn from_config(config: &ResolverConfig, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self::new(issuer)
            .with_matcher(DomainMatcher::new(&config.domain_suffix))
            .with_timeout(config.timeout())
    }

    pub fn with_matcher(mut self, matcher: DomainMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn matcher(&self) -> &DomainMatcher {
        &self.matcher
    }

    pub fn issuer(&self) -> &dyn TokenIssuer {
        self.issuer.as_ref()
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Resolve a credential for `service`.
    ///
    /// `account` is part of the keyring protocol but does not affect the
    /// lookup.
    pub async fn resolve(&self, service: &str, account: &str) -> Result<Resolution> {
        self.resolve_with_cancel(service, account, &CancellationToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), aborting when `cancel` fires.
    ///
    /// A cancelled issuance kills the tool and fails with a resolution error
    /// wrapping [`IssuerError::Cancelled`].
    pub async fn resolve_with_cancel(
        &self,
        service: &str,
        account: &str,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let Some(key) = self.matcher.normalized_host(service) else {
            tracing::debug!(
                "Not handling {}: not an https {} service",
                service,
                self.matcher.suffix()
            );
            return Ok(Resolution::NotHandled);
        };

        let slot = self.cache.slot(&key);
        // A ready lock wins over cancellation so cached hits always return
        let mut entry = tokio::select! {
            biased;
            guard = slot.lock() => guard,
            _ = cancel.cancelled() => {
                return Err(CoreError::Resolution {
                    service: service.to_string(),
                    source: IssuerError::Cancelled,
                });
            }
        };

        if let Some(cached) = entry.as_ref() {
            tracing::debug!("Using cached token for {}", key);
            return Ok(Resolution::Token(cached.token.clone()));
        }

        if cancel.is_cancelled() {
            return Err(CoreError::Resolution {
                service: service.to_string(),
                source: IssuerError::Cancelled,
            });
        }

        tracing::debug!("Issuing token for {} (account {})", key, account);
        let token = self.issue(&key, cancel).await.map_err(|source| {
            tracing::warn!("Failed to get token for {}: {}", service, source);
            CoreError::Resolution {
                service: service.to_string(),
                source,
            }
        })?;

        *entry = Some(CacheEntry::new(token.clone()));
        Ok(Resolution::Token(token))
    }

    /// Check that the token tool works, under the same timeout as issuance.
    ///
    /// Fails with [`IssuerError::Cancelled`] when `cancel` fires or the
    /// timeout elapses; the tool is killed in both cases.
    pub async fn ping(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, IssuerError> {
        self.bounded("Tool check", self.issuer.ping(cancel)).await
    }

    async fn issue(
        &self,
        audience: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Token, IssuerError> {
        let what = format!("Token issuance for {}", audience);
        self.bounded(&what, self.issuer.issue(audience, cancel)).await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = std::result::Result<T, IssuerError>>,
    ) -> std::result::Result<T, IssuerError> {
        match self.timeout {
            // Dropping the timed out future kills the child process.
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                tracing::warn!("{} timed out after {:?}", what, limit);
                Err(IssuerError::Cancelled)
            }),
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockIssuer;
    use std::time::Instant;

    fn resolver_with(mock: &Arc<MockIssuer>) -> CredentialResolver {
        CredentialResolver::new(mock.clone())
    }

    #[tokio::test]
    async fn test_resolve_and_cache() {
        let mock = Arc::new(MockIssuer::with_token("tok-123"));
        let resolver = resolver_with(&mock);

        let first = resolver.resolve("https://libraries.cgr.dev", "user").await.unwrap();
        assert_eq!(first, Resolution::Token(Token::new("tok-123")));

        let second = resolver.resolve("https://libraries.cgr.dev", "user").await.unwrap();
        assert_eq!(second, Resolution::Token(Token::new("tok-123")));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_audience_is_the_host() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);

        resolver
            .resolve("https://Libraries.CGR.dev/python/simple", "user")
            .await
            .unwrap();
        assert_eq!(mock.audiences(), vec!["libraries.cgr.dev".to_string()]);
    }

    #[tokio::test]
    async fn test_same_host_shares_cache_entry() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);

        resolver.resolve("https://libraries.cgr.dev/python", "a").await.unwrap();
        resolver.resolve("https://LIBRARIES.cgr.dev/java/", "b").await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_hosts_issue_separately() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);

        resolver.resolve("https://libraries.cgr.dev", "user").await.unwrap();
        resolver.resolve("https://java.cgr.dev", "user").await.unwrap();
        assert_eq!(mock.call_count(), 2);
        assert_eq!(resolver.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_ineligible_services_not_handled() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);

        for service in [
            "https://pypi.org",
            "http://libraries.cgr.dev",
            "https://libraries.cgr.devious.com",
            "garbage",
        ] {
            let result = resolver.resolve(service, "user").await.unwrap();
            assert_eq!(result, Resolution::NotHandled, "{service}");
        }
        assert_eq!(mock.call_count(), 0);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_ineligible_after_cache_fill_still_not_handled() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);

        resolver.resolve("https://libraries.cgr.dev", "user").await.unwrap();
        let result = resolver.resolve("http://libraries.cgr.dev", "user").await.unwrap();
        assert_eq!(result, Resolution::NotHandled);
    }

    #[tokio::test]
    async fn test_tool_failure_is_not_cached() {
        let mock = Arc::new(MockIssuer::new());
        mock.push_result(Err(IssuerError::execution("chainctl", Some(1), "auth failed")));
        mock.push_result(Ok(Token::new("tok-after-retry")));
        let resolver = resolver_with(&mock);

        let err = resolver
            .resolve("https://libraries.cgr.dev", "user")
            .await
            .unwrap_err();
        assert!(matches!(
            err.issuer_error(),
            Some(IssuerError::ToolExecution { exit_code: Some(1), .. })
        ));
        assert!(resolver.cache().get("libraries.cgr.dev").is_none());

        let retried = resolver.resolve("https://libraries.cgr.dev", "user").await.unwrap();
        assert_eq!(retried.token().unwrap().as_str(), "tok-after-retry");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_output_surfaces_issuance_error() {
        let mock = Arc::new(MockIssuer::new());
        mock.push_result(Err(IssuerError::Issuance("chainctl".to_string())));
        let resolver = resolver_with(&mock);

        let err = resolver
            .resolve("https://libraries.cgr.dev", "user")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Resolution { .. }));
        assert!(matches!(err.issuer_error(), Some(IssuerError::Issuance(_))));
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_surfaces_not_found() {
        let mock = Arc::new(MockIssuer::new());
        mock.push_result(Err(IssuerError::ToolNotFound("chainctl".to_string())));
        let resolver = resolver_with(&mock);

        let err = resolver
            .resolve("https://libraries.cgr.dev", "user")
            .await
            .unwrap_err();
        assert!(matches!(err.issuer_error(), Some(IssuerError::ToolNotFound(_))));
        assert!(err.to_string().contains("https://libraries.cgr.dev"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_cancelled() {
        let mock = Arc::new(MockIssuer::with_token("tok").with_delay(Duration::from_secs(30)));
        let resolver = resolver_with(&mock).with_timeout(Some(Duration::from_millis(50)));

        let started = Instant::now();
        let err = resolver
            .resolve("https://libraries.cgr.dev", "user")
            .await
            .unwrap_err();
        assert!(matches!(err.issuer_error(), Some(IssuerError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_token_aborts_issuance() {
        let mock = Arc::new(MockIssuer::with_token("tok").with_delay(Duration::from_secs(30)));
        let resolver = resolver_with(&mock);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = resolver
            .resolve_with_cancel("https://libraries.cgr.dev", "user", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.issuer_error(), Some(IssuerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_from_config_uses_suffix_and_timeout() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let config = ResolverConfig {
            domain_suffix: "internal.example.com".to_string(),
            timeout_secs: 5,
        };
        let resolver = CredentialResolver::from_config(&config, mock.clone());

        assert_eq!(resolver.matcher().suffix(), ".internal.example.com");
        let result = resolver
            .resolve("https://libraries.cgr.dev", "user")
            .await
            .unwrap();
        assert_eq!(result, Resolution::NotHandled);
        let result = resolver
            .resolve("https://pypi.internal.example.com", "user")
            .await
            .unwrap();
        assert!(result.is_handled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_issue_once() {
        let mock = Arc::new(MockIssuer::with_token("tok-123").with_delay(Duration::from_millis(50)));
        let resolver = Arc::new(resolver_with(&mock));

        let tasks = (0..16).map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                resolver
                    .resolve("https://libraries.cgr.dev", "user")
                    .await
                    .unwrap()
            })
        });
        let results = futures::future::join_all(tasks).await;

        for result in results {
            assert_eq!(result.unwrap().token().unwrap().as_str(), "tok-123");
        }
        assert_eq!(mock.call_count(), 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_hit_survives_cancelled_token() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);
        resolver.resolve("https://libraries.cgr.dev", "user").await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        for _ in 0..32 {
            let result = resolver
                .resolve_with_cancel("https://libraries.cgr.dev", "user", &cancel)
                .await
                .unwrap();
            assert_eq!(result.token().unwrap().as_str(), "tok");
        }
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_miss_does_not_issue() {
        let mock = Arc::new(MockIssuer::with_token("tok"));
        let resolver = resolver_with(&mock);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver
            .resolve_with_cancel("https://libraries.cgr.dev", "user", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.issuer_error(), Some(IssuerError::Cancelled)));
        assert_eq!(mock.call_count(), 0);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_ping_times_out() {
        let mock = Arc::new(MockIssuer::with_token("tok").with_ping_delay(Duration::from_secs(30)));
        let resolver = resolver_with(&mock).with_timeout(Some(Duration::from_millis(50)));

        let started = Instant::now();
        let err = resolver.ping(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, IssuerError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_ping_stops_on_cancel() {
        let mock = Arc::new(MockIssuer::with_token("tok").with_ping_delay(Duration::from_secs(30)));
        let resolver = resolver_with(&mock);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = resolver.ping(&cancel).await.unwrap_err();
        assert!(matches!(err, IssuerError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

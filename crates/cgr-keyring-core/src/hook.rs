//! Environment setup hook
//!
//! Resolves tokens for a fixed list of package indexes and writes them into
//! an environment (a child process environment or a shell export script).
//! Failures are reported but never abort setup; the environment may have
//! its own fallback credentials.

use crate::resolver::{CredentialResolver, Resolution};
use cgr_keyring_config::HookTarget;
use cgr_keyring_issuer::CancellationToken;
use std::collections::BTreeMap;
use url::Url;

/// Prefix of derived variable names
pub const ENV_VAR_PREFIX: &str = "CGR_KEYRING_TOKEN";

/// Destination for resolved credentials
pub trait CredentialSink {
    fn set_var(&mut self, name: &str, value: &str);
}

/// In-memory variable set, e.g. for a child process environment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvMap {
    vars: BTreeMap<String, String>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl CredentialSink for EnvMap {
    fn set_var(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }
}

/// POSIX shell script exporting each variable, suitable for `eval`
#[derive(Debug, Default, Clone)]
pub struct ExportScript {
    lines: Vec<String>,
}

impl ExportScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{}\n", line))
            .collect()
    }
}

impl CredentialSink for ExportScript {
    fn set_var(&mut self, name: &str, value: &str) {
        self.lines
            .push(format!("export {}={}", name, shell_words::quote(value)));
    }
}

/// Result of running the hook, for user-visible reporting
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HookStatus {
    /// Variables written to the sink
    pub injected: Vec<String>,
    /// Targets outside the handled domain
    pub not_handled: Vec<String>,
    /// Targets whose resolution failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Whether the token tool answered the preflight check
    pub tool_available: bool,
}

/// Injects resolved tokens at environment setup time
pub struct EnvironmentHook<'a> {
    resolver: &'a CredentialResolver,
    targets: Vec<HookTarget>,
}

impl<'a> EnvironmentHook<'a> {
    pub fn new(resolver: &'a CredentialResolver, targets: Vec<HookTarget>) -> Self {
        Self { resolver, targets }
    }

    pub fn targets(&self) -> &[HookTarget] {
        &self.targets
    }

    /// Check that the token tool is installed. Logs a warning on failure.
    ///
    /// Bounded by the resolver's timeout and by `cancel`.
    pub async fn preflight(&self, cancel: &CancellationToken) -> bool {
        match self.resolver.ping(cancel).await {
            Ok(version) => {
                tracing::debug!("Token tool available: {}", version);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "{} is not working properly ({}). Authentication to *{} repositories may fail.",
                    self.resolver.issuer().info().tool,
                    e,
                    self.resolver.matcher().suffix()
                );
                false
            }
        }
    }

    /// Resolve every target and write tokens into `sink`
    pub async fn run(&self, sink: &mut dyn CredentialSink, cancel: &CancellationToken) -> HookStatus {
        let mut status = HookStatus {
            tool_available: self.preflight(cancel).await,
            ..HookStatus::default()
        };

        for target in &self.targets {
            match self
                .resolver
                .resolve_with_cancel(&target.service, &target.account, cancel)
                .await
            {
                Ok(Resolution::Token(token)) => {
                    let name = env_var_name(target);
                    sink.set_var(&name, token.as_str());
                    tracing::info!("Injected credential for {} into {}", target.service, name);
                    status.injected.push(name);
                }
                Ok(Resolution::NotHandled) => {
                    tracing::warn!(
                        "Skipping {}: not an https {} service",
                        target.service,
                        self.resolver.matcher().suffix()
                    );
                    status.not_handled.push(target.service.clone());
                }
                Err(e) => {
                    tracing::warn!("Continuing without credential for {}: {}", target.service, e);
                    status.failed.push((target.service.clone(), e.to_string()));
                }
            }
        }

        status
    }
}

/// Variable name for a target: the configured one, or
/// `CGR_KEYRING_TOKEN_<HOST>` with the host upper-cased and every
/// non-alphanumeric character replaced by `_`.
pub fn env_var_name(target: &HookTarget) -> String {
    if let Some(name) = &target.env_var {
        return name.clone();
    }

    let host = Url::parse(&target.service)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| target.service.clone());
    let suffix: String = host
        .trim_end_matches('.')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", ENV_VAR_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockIssuer;
    use cgr_keyring_issuer::{IssuerError, Token};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn default_target() -> HookTarget {
        HookTarget::new("https://libraries.cgr.dev", "_token")
    }

    #[test]
    fn test_env_var_name_derived_from_host() {
        assert_eq!(
            env_var_name(&default_target()),
            "CGR_KEYRING_TOKEN_LIBRARIES_CGR_DEV"
        );
        assert_eq!(
            env_var_name(&HookTarget::new("https://evil-libraries.cgr.dev/python", "x")),
            "CGR_KEYRING_TOKEN_EVIL_LIBRARIES_CGR_DEV"
        );
    }

    #[test]
    fn test_env_var_name_override() {
        let target = default_target().with_env_var("UV_INDEX_CGR_PASSWORD");
        assert_eq!(env_var_name(&target), "UV_INDEX_CGR_PASSWORD");
    }

    #[test]
    fn test_export_script_quotes_values() {
        let mut script = ExportScript::new();
        script.set_var("A", "plain");
        script.set_var("B", "it's a $secret");
        assert_eq!(
            script.render(),
            "export A=plain\nexport B='it'\\''s a $secret'\n"
        );
    }

    #[tokio::test]
    async fn test_run_injects_token() {
        let mock = Arc::new(MockIssuer::with_token("tok-123"));
        let resolver = CredentialResolver::new(mock.clone());
        let hook = EnvironmentHook::new(&resolver, vec![default_target()]);

        let mut env = EnvMap::new();
        let status = hook.run(&mut env, &CancellationToken::new()).await;

        assert_eq!(env.get("CGR_KEYRING_TOKEN_LIBRARIES_CGR_DEV"), Some("tok-123"));
        assert_eq!(status.injected, vec!["CGR_KEYRING_TOKEN_LIBRARIES_CGR_DEV".to_string()]);
        assert!(status.failed.is_empty());
        assert!(status.tool_available);
    }

    #[tokio::test]
    async fn test_run_skips_ineligible_targets() {
        let mock = Arc::new(MockIssuer::with_token("tok-123"));
        let resolver = CredentialResolver::new(mock.clone());
        let hook = EnvironmentHook::new(
            &resolver,
            vec![HookTarget::new("https://pypi.org/simple", "_token")],
        );

        let mut env = EnvMap::new();
        let status = hook.run(&mut env, &CancellationToken::new()).await;

        assert!(env.is_empty());
        assert_eq!(status.not_handled, vec!["https://pypi.org/simple".to_string()]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_continues_after_failure() {
        let mock = Arc::new(MockIssuer::new());
        mock.push_result(Err(IssuerError::execution("chainctl", Some(1), "denied")));
        mock.push_result(Ok(Token::new("java-token")));
        let resolver = CredentialResolver::new(mock.clone());
        let hook = EnvironmentHook::new(
            &resolver,
            vec![
                default_target(),
                HookTarget::new("https://java.cgr.dev", "_token").with_env_var("JAVA_TOKEN"),
            ],
        );

        let mut env = EnvMap::new();
        let status = hook.run(&mut env, &CancellationToken::new()).await;

        assert_eq!(status.failed.len(), 1);
        assert_eq!(status.failed[0].0, "https://libraries.cgr.dev");
        assert!(status.failed[0].1.contains("denied"));
        assert_eq!(env.get("JAVA_TOKEN"), Some("java-token"));
        assert_eq!(env.get("CGR_KEYRING_TOKEN_LIBRARIES_CGR_DEV"), None);
    }

    #[tokio::test]
    async fn test_preflight_reports_missing_tool() {
        let mock = Arc::new(MockIssuer::with_token("tok").without_tool());
        let resolver = CredentialResolver::new(mock);
        let hook = EnvironmentHook::new(&resolver, vec![default_target()]);

        assert!(!hook.preflight(&CancellationToken::new()).await);

        // Resolution is still attempted; the preflight is advisory only
        let mut env = EnvMap::new();
        let status = hook.run(&mut env, &CancellationToken::new()).await;
        assert!(!status.tool_available);
        assert_eq!(status.injected.len(), 1);
    }

    #[tokio::test]
    async fn test_preflight_returns_promptly_on_cancel() {
        let mock = Arc::new(MockIssuer::with_token("tok").with_ping_delay(Duration::from_secs(30)));
        let resolver = CredentialResolver::new(mock.clone());
        let hook = EnvironmentHook::new(&resolver, vec![default_target()]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let mut env = EnvMap::new();
        let status = hook.run(&mut env, &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!status.tool_available);
        // Resolution after an interrupt fails instead of running the tool
        assert!(env.is_empty());
        assert_eq!(status.failed.len(), 1);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_preflight_bounded_by_timeout() {
        let mock = Arc::new(MockIssuer::with_token("tok").with_ping_delay(Duration::from_secs(30)));
        let resolver =
            CredentialResolver::new(mock).with_timeout(Some(Duration::from_millis(50)));
        let hook = EnvironmentHook::new(&resolver, vec![default_target()]);

        let started = Instant::now();
        assert!(!hook.preflight(&CancellationToken::new()).await);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

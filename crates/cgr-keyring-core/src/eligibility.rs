//! Decides which service identifiers this backend handles
//!
//! A service is eligible when it is an `https` URL whose host ends with the
//! configured domain suffix on a label boundary. Everything else is left to
//! other credential sources.

use cgr_keyring_config::DEFAULT_DOMAIN_SUFFIX;
use url::Url;

const SECURE_SCHEME: &str = "https";

/// Domain suffix predicate over service identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMatcher {
    /// Lower-cased suffix, always with a leading dot
    suffix: String,
}

impl DomainMatcher {
    /// Create a matcher for `suffix`, with or without a leading dot
    pub fn new(suffix: &str) -> Self {
        let bare = suffix
            .trim()
            .trim_start_matches('.')
            .trim_end_matches('.')
            .to_ascii_lowercase();
        Self {
            suffix: format!(".{}", bare),
        }
    }

    /// The normalized suffix, e.g. `.cgr.dev`
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Whether `service` should be handled by this backend.
    ///
    /// Never fails: unparsable identifiers are simply not eligible.
    pub fn is_eligible(&self, service: &str) -> bool {
        self.normalized_host(service).is_some()
    }

    /// Cache key for an eligible service: its host, lower-cased, without a
    /// trailing dot. `None` when the service is not eligible.
    pub fn normalized_host(&self, service: &str) -> Option<String> {
        let url = Url::parse(service.trim()).ok()?;
        if url.scheme() != SECURE_SCHEME {
            return None;
        }

        let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        if host.ends_with(&self.suffix) {
            Some(host)
        } else {
            None
        }
    }
}

impl Default for DomainMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_SUFFIX)
    }
}

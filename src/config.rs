//! Client configuration: rate-limit detection, retry policy and the page
//! budgets used by scope resolution and read-verification.

use crate::retry::RetryConfig;

/// Default base URL of the service.
pub const DEFAULT_BASE_URL: &str = "https://www.last.fm";

/// Configuration for rate limit detection behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether to detect rate limits by HTTP status codes (429, 403)
    pub detect_by_status: bool,
    /// Whether to detect rate limits by response body patterns
    pub detect_by_patterns: bool,
    /// Lower-case patterns to look for in response bodies
    pub patterns: Vec<String>,
    /// Seconds to wait when the backend doesn't send `Retry-After`
    pub default_retry_after: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            detect_by_status: true,
            detect_by_patterns: true,
            patterns: [
                "you've tried to log in too many times",
                "you're requesting too many pages",
                "slow down",
                "too fast",
                "rate limit",
                "throttled",
                "temporarily blocked",
                "temporarily restricted",
                "captcha",
                "verify you're human",
                "prove you're not a robot",
                "security check",
                "service temporarily unavailable",
                "quota exceeded",
                "limit exceeded",
                "daily limit",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            default_retry_after: 60,
        }
    }
}

impl RateLimitConfig {
    /// Create config with all detection disabled
    pub fn disabled() -> Self {
        Self {
            detect_by_status: false,
            detect_by_patterns: false,
            patterns: vec![],
            ..Default::default()
        }
    }

    /// Create config with only status code detection
    pub fn status_only() -> Self {
        Self {
            detect_by_patterns: false,
            patterns: vec![],
            ..Default::default()
        }
    }

    /// Replace the built-in patterns
    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// The first configured pattern found in `body`, if pattern detection is on.
    pub fn matched_pattern(&self, body: &str) -> Option<&str> {
        if !self.detect_by_patterns {
            return None;
        }
        let body_lower = body.to_lowercase();
        self.patterns
            .iter()
            .find(|pattern| body_lower.contains(&pattern.to_lowercase()))
            .map(String::as_str)
    }
}

/// Unified configuration for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Retry policy for edit submissions
    pub retry: RetryConfig,
    /// Rate limit detection configuration
    pub rate_limit: RateLimitConfig,
    /// Pages read per listing when resolving an edit's scope: the scrobble log
    /// for a timestamped edit, otherwise each track's scrobble page
    pub resolve_max_pages: u32,
    /// Recent-scrobble pages re-read to verify an ambiguous edit response
    pub verify_max_pages: u32,
    /// Redirects followed on a single GET before giving up
    pub max_redirects: u32,
    /// Expected entities per listing page, when known up front
    ///
    /// With `None` the pagination engine learns the size from the first page.
    pub page_size: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            resolve_max_pages: 10,
            verify_max_pages: 2,
            max_redirects: 5,
            page_size: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config with retries disabled
    pub fn with_retries_disabled() -> Self {
        Self {
            retry: RetryConfig::disabled(),
            ..Default::default()
        }
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry = retry_config;
        self
    }

    /// Set custom rate limit configuration
    pub fn with_rate_limit_config(mut self, rate_limit_config: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit_config;
        self
    }

    /// Set custom retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Set custom retry delays (seconds)
    pub fn with_retry_delays(mut self, base_delay: u64, max_delay: u64) -> Self {
        self.retry.base_delay = base_delay;
        self.retry.max_delay = max_delay;
        self
    }

    pub fn with_resolve_max_pages(mut self, pages: u32) -> Self {
        self.resolve_max_pages = pages;
        self
    }

    pub fn with_verify_max_pages(mut self, pages: u32) -> Self {
        self.verify_max_pages = pages;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

//! Client configuration, populated from defaults or environment variables.

use std::time::Duration;

use crate::error::Result;

/// MITRE's public CWE REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://cwe-api.mitre.org/api/v1";

/// Runtime configuration for the CWE client stack.
///
/// The defaults are polite towards the public service: one request every ten
/// seconds, three retries one second apart, and a thirty-second timeout.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `CWE_API_BASE` | [`DEFAULT_BASE_URL`] | Base URL prefixed to every endpoint path |
/// | `CWE_TIMEOUT_SECS` | `30` | Per-request timeout |
/// | `CWE_RATE_LIMIT_MS` | `10000` | Minimum interval between requests; `0` disables pacing |
/// | `CWE_REQUESTS_PER_SECOND` | (absent) | Alternative to `CWE_RATE_LIMIT_MS`; wins when set |
/// | `CWE_MAX_RETRIES` | `3` | Extra attempts after the first failure |
/// | `CWE_RETRY_DELAY_MS` | `1000` | Pause before each retry |
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub base_url: String,

    /// Timeout applied by the underlying HTTP client to each attempt.
    pub timeout: Duration,

    /// Minimum spacing between two outbound requests.
    pub rate_limit_interval: Duration,

    /// How many times a failed request is retried. `0` means one attempt.
    pub max_retries: u32,

    /// Pause before each retry, on top of the rate-limit interval.
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            rate_limit_interval: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Populate config from environment variables, applying defaults where
    /// absent or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut config = Self {
            base_url: std::env::var("CWE_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: env_parse::<u64>("CWE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            rate_limit_interval: env_parse::<u64>("CWE_RATE_LIMIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_limit_interval),
            max_retries: env_parse("CWE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: env_parse::<u64>("CWE_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        };

        if let Some(rps) = env_parse::<f64>("CWE_REQUESTS_PER_SECOND") {
            config = config.with_requests_per_second(rps);
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    /// Express the rate limit as a request rate. A rate `<= 0` disables pacing.
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.rate_limit_interval = interval_for_rate(rps);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Build the underlying HTTP client with the configured timeout.
    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

/// Spacing between requests for a given rate; zero for non-positive rates.
///
/// Rates so small that the interval does not fit a [`Duration`] saturate to
/// [`Duration::MAX`].
pub(crate) fn interval_for_rate(rps: f64) -> Duration {
    if rps.is_finite() && rps > 0.0 {
        Duration::try_from_secs_f64(1.0 / rps).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

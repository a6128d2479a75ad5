use std::time::Duration;

use secrecy::SecretString;

use crate::client::consts::{
    BASE_URL, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_RECONNECT_MS, MAX_RECONNECTS_VAR,
    OUTBOUND_CAPACITY_VAR, RECONNECT_MS_VAR, TOKEN_VAR, URL_VAR,
};
use crate::error::ConfigError;

/// How the controller retries after the transport closes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
    backoff_factor: f64,
    max_delay: Duration,
}

impl Default for ReconnectPolicy {
    /// Fixed 2000 ms delay, retrying forever.
    fn default() -> Self {
        Self::fixed(Duration::from_millis(DEFAULT_RECONNECT_MS))
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            backoff_factor: 1.0,
            max_delay: delay,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Multiplies the delay by `factor` after every failed attempt, up to `max_delay`.
    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor.max(1.0);
        self.max_delay = max_delay.max(self.delay);
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (starting at 1), or `None` once the
    /// attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        if attempt == 1 || self.backoff_factor == 1.0 {
            return Some(self.delay);
        }
        let exponent = (attempt - 1).min(64) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return Some(self.max_delay);
        }
        Some(Duration::from_secs_f64(secs))
    }
}

pub struct ClientConfig {
    base_url: String,
    token: Option<SecretString>,
    outbound_capacity: usize,
    reconnect: ReconnectPolicy,
}

pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.config.token = Some(SecretString::from(token.to_string()));
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity.max(1);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            token: None,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Reads the `LIVE_SESSION_*` variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Some(url) = lookup(URL_VAR) {
            builder = builder.with_base_url(&url);
        }
        if let Some(token) = lookup(TOKEN_VAR).filter(|t| !t.is_empty()) {
            builder = builder.with_token(&token);
        }
        if let Some(capacity) = lookup(OUTBOUND_CAPACITY_VAR) {
            builder = builder.with_outbound_capacity(parse_var(OUTBOUND_CAPACITY_VAR, &capacity)?);
        }
        let delay = match lookup(RECONNECT_MS_VAR) {
            Some(ms) => Duration::from_millis(parse_var(RECONNECT_MS_VAR, &ms)?),
            None => Duration::from_millis(DEFAULT_RECONNECT_MS),
        };
        let mut reconnect = ReconnectPolicy::fixed(delay);
        if let Some(max) = lookup(MAX_RECONNECTS_VAR) {
            reconnect = reconnect.with_max_attempts(parse_var(MAX_RECONNECTS_VAR, &max)?);
        }
        Ok(builder.with_reconnect(reconnect).build())
    }

    /// Replaces the base URL and keeps the token, queue size and reconnect policy.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

//! Configuration for the sync engine.

use crate::signer::StaticCredentials;
use acctreg_protocol::ProtocolVariant;
use rand::Rng;
use std::time::Duration;

/// Default remote endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default signing region.
pub const DEFAULT_SIGNING_REGION: &str = "us-west-2";

/// Default signing service.
pub const DEFAULT_SIGNING_SERVICE: &str = "execute-api";

/// How requests to the remote catalog are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Plain requests.
    Direct,
    /// SigV4-signed requests.
    Signed {
        /// Signing region.
        region: String,
        /// Signing service.
        service: String,
    },
}

impl AuthMode {
    /// Signed mode for the given region and the default service.
    pub fn signed(region: impl Into<String>) -> Self {
        AuthMode::Signed {
            region: region.into(),
            service: DEFAULT_SIGNING_SERVICE.to_string(),
        }
    }

    /// Returns true if requests are signed.
    pub fn is_signed(&self) -> bool {
        matches!(self, AuthMode::Signed { .. })
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote catalog URL, optionally with extra query parameters.
    pub base_url: String,
    /// Response shape spoken by the remote.
    pub variant: ProtocolVariant,
    /// Request authentication.
    pub auth: AuthMode,
    /// Static credentials; the ambient chain is used when absent.
    pub static_credentials: Option<StaticCredentials>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Response read timeout.
    pub read_timeout: Duration,
    /// Maximum pages followed in one fetch.
    pub max_pages: usize,
    /// Override for the delta query parameter name.
    pub delta_param: Option<String>,
    /// Delay between scheduled polls.
    pub sync_interval: Duration,
    /// Backoff applied after failures.
    pub backoff: BackoffConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            variant: ProtocolVariant::default(),
            auth: AuthMode::Direct,
            static_credentials: None,
            connect_timeout: Duration::from_millis(2000),
            read_timeout: Duration::from_millis(6000),
            max_pages: 1000,
            delta_param: None,
            sync_interval: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the protocol variant.
    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Enables SigV4 signing.
    pub fn with_signing(mut self, region: impl Into<String>, service: impl Into<String>) -> Self {
        self.auth = AuthMode::Signed {
            region: region.into(),
            service: service.into(),
        };
        self
    }

    /// Sets static credentials for signing.
    pub fn with_static_credentials(mut self, credentials: StaticCredentials) -> Self {
        self.static_credentials = Some(credentials);
        self
    }

    /// Sets the connect and read timeouts.
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Sets the page ceiling.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Overrides the delta query parameter name.
    pub fn with_delta_param(mut self, name: impl Into<String>) -> Self {
        self.delta_param = Some(name.into());
        self
    }

    /// Sets the poll interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Name of the delta query parameter.
    pub fn delta_param(&self) -> &str {
        self.delta_param
            .as_deref()
            .unwrap_or_else(|| self.variant.delta_param())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Exponential backoff with subtractive jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay unit multiplied by `2^retry`.
    pub base_delay: Duration,
    /// Upper bound before jitter.
    pub max_delay: Duration,
    /// Jitter is drawn from `[0, max_jitter)`.
    pub max_jitter: Duration,
}

impl BackoffConfig {
    /// Creates a backoff configuration with the given cap.
    pub fn new(max_delay: Duration) -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay,
            max_jitter: Duration::from_millis(1000),
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the jitter bound.
    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Delay before jitter after `retry_count` consecutive failures:
    /// `min(max_delay, 2^retry_count * base_delay)`.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Subtracts `jitter` from `delay` without reaching zero unless `delay`
    /// is zero.
    pub fn apply_jitter(delay: Duration, jitter: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        let reduced = delay.saturating_sub(jitter);
        if reduced.is_zero() {
            delay.min(Duration::from_millis(1))
        } else {
            reduced
        }
    }

    /// Draws a jitter value.
    pub fn sample_jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let bound = self.max_jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(0..bound))
    }

    /// Jittered delay for the given retry count.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let jitter = self.sample_jitter(&mut rand::thread_rng());
        Self::apply_jitter(self.delay_for_retry(retry_count), jitter)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(3_600_000))
    }
}

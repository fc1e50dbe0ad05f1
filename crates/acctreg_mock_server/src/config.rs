//! Server configuration.

use acctreg_protocol::ProtocolVariant;
use std::time::Duration;

/// Default URL the catalog answers on.
pub const DEFAULT_CATALOG_URL: &str = "http://localhost:8080/accounts";

/// Credentials incoming requests must be signed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequirement {
    /// Expected access key id.
    pub access_key_id: String,
    /// Secret used to recompute signatures.
    pub secret_access_key: String,
    /// Expected scope region.
    pub region: String,
    /// Expected scope service.
    pub service: String,
    /// Largest accepted difference between `X-Amz-Date` and the server clock;
    /// `None` disables the check.
    pub max_clock_skew: Option<Duration>,
}

/// Configuration for the mock catalog.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Absolute URL of the accounts collection; used to build next links.
    pub base_url: String,
    /// Response shape served.
    pub variant: ProtocolVariant,
    /// Accounts per page (pagination-link variant).
    pub page_size: usize,
    /// Name of the delta parameter; the variant's default when `None`.
    pub delta_param: Option<String>,
    /// Signature check, if enabled.
    pub signing: Option<SigningRequirement>,
}

impl ServerConfig {
    /// Creates a configuration serving `variant` at `base_url`.
    pub fn new(base_url: impl Into<String>, variant: ProtocolVariant) -> Self {
        Self {
            base_url: base_url.into(),
            variant,
            page_size: 100,
            delta_param: None,
            signing: None,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Overrides the delta parameter name.
    pub fn with_delta_param(mut self, name: impl Into<String>) -> Self {
        self.delta_param = Some(name.into());
        self
    }

    /// Requires SigV4 signatures made with the given key pair and scope.
    pub fn with_signing(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        self.signing = Some(SigningRequirement {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
            service: service.into(),
            max_clock_skew: Some(Duration::from_secs(15 * 60)),
        });
        self
    }

    /// Name of the delta parameter.
    pub fn delta_param(&self) -> &str {
        self.delta_param
            .as_deref()
            .unwrap_or_else(|| self.variant.delta_param())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_URL, ProtocolVariant::default())
    }
}

//! CLI settings file.
//!
//! Every field is optional; command-line flags override what the file says.

use acctreg_engine::protocol::ProtocolVariant;
use acctreg_engine::{BackoffConfig, DefaultsConfig, StaticCredentials, SyncConfig, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("cannot read settings {path}: {source}")]
    Read {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid settings JSON.
    #[error("cannot parse settings {path}: {source}")]
    Parse {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The referenced defaults file is invalid.
    #[error(transparent)]
    Defaults(#[from] SyncError),
}

/// Request signing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSettings {
    /// Signing region.
    pub region: String,
    /// Signing service.
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    acctreg_engine::DEFAULT_SIGNING_SERVICE.to_string()
}

/// Backoff settings in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffSettings {
    /// Delay unit.
    pub base_delay_ms: Option<u64>,
    /// Cap before jitter.
    pub max_delay_ms: Option<u64>,
    /// Jitter bound.
    pub max_jitter_ms: Option<u64>,
}

/// Settings for every command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Remote catalog URL.
    pub base_url: Option<String>,
    /// Protocol variant.
    pub variant: Option<ProtocolVariant>,
    /// Signing; requests are sent unsigned when absent.
    pub signing: Option<SigningSettings>,
    /// Static access key; the ambient chain is used when absent.
    pub access_key_id: Option<String>,
    /// Static secret key.
    pub secret_access_key: Option<String>,
    /// Static session token.
    pub session_token: Option<String>,
    /// Defaults file, relative to the settings file.
    pub defaults_file: Option<PathBuf>,
    /// Inline defaults, used when no defaults file is named.
    pub defaults: Option<DefaultsConfig>,
    /// Page ceiling.
    pub max_pages: Option<usize>,
    /// Delta parameter override.
    pub delta_param: Option<String>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
    /// Read timeout.
    pub read_timeout_ms: Option<u64>,
    /// Delay between polls.
    pub sync_interval_ms: Option<u64>,
    /// Backoff after failures.
    pub backoff: Option<BackoffSettings>,

    #[serde(skip)]
    pub(crate) base_dir: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.base_dir = path.parent().map(Path::to_path_buf);
        Ok(settings)
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, url: Option<String>, variant: Option<ProtocolVariant>) {
        if url.is_some() {
            self.base_url = url;
        }
        if variant.is_some() {
            self.variant = variant;
        }
    }

    /// Static credentials, if both keys are set.
    pub fn static_credentials(&self) -> Option<StaticCredentials> {
        let (id, secret) = (self.access_key_id.as_ref()?, self.secret_access_key.as_ref()?);
        let mut credentials = StaticCredentials::new(id, secret);
        credentials.session_token = self.session_token.clone();
        Some(credentials)
    }

    /// Builds the engine configuration.
    pub fn sync_config(&self) -> SyncConfig {
        let mut config = match &self.base_url {
            Some(url) => SyncConfig::new(url.as_str()),
            None => SyncConfig::default(),
        };
        if let Some(variant) = self.variant {
            config = config.with_variant(variant);
        }
        if let Some(signing) = &self.signing {
            config = config.with_signing(signing.region.as_str(), signing.service.as_str());
        }
        if let Some(credentials) = self.static_credentials() {
            config = config.with_static_credentials(credentials);
        }
        if let Some(max_pages) = self.max_pages {
            config = config.with_max_pages(max_pages);
        }
        if let Some(param) = &self.delta_param {
            config = config.with_delta_param(param.as_str());
        }
        let connect = self
            .connect_timeout_ms
            .map_or(config.connect_timeout, Duration::from_millis);
        let read = self
            .read_timeout_ms
            .map_or(config.read_timeout, Duration::from_millis);
        config = config.with_timeouts(connect, read);
        if let Some(ms) = self.sync_interval_ms {
            config = config.with_sync_interval(Duration::from_millis(ms));
        }
        if let Some(backoff) = &self.backoff {
            config = config.with_backoff(backoff.to_config());
        }
        config
    }

    /// Loads the deployment defaults.
    pub fn defaults(&self) -> Result<DefaultsConfig, SettingsError> {
        match &self.defaults_file {
            Some(file) => {
                let path = match &self.base_dir {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file.clone(),
                };
                Ok(DefaultsConfig::load(&path)?)
            }
            None => Ok(self.defaults.clone().unwrap_or_default()),
        }
    }

    /// The configured variant or the default one.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant.unwrap_or_default()
    }
}

impl BackoffSettings {
    fn to_config(&self) -> BackoffConfig {
        let defaults = BackoffConfig::default();
        let mut config =
            BackoffConfig::new(self.max_delay_ms.map_or(defaults.max_delay, Duration::from_millis));
        if let Some(ms) = self.base_delay_ms {
            config = config.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_jitter_ms {
            config = config.with_max_jitter(Duration::from_millis(ms));
        }
        config
    }
}

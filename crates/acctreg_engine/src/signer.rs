//! Credential sources and the SigV4 request signer.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use acctreg_protocol::sigv4::{self, SigningKeys, SigningRequest};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// A resolved access key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl StaticCredentials {
    /// Creates long-term credentials.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attaches a session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Something that can produce credentials on demand.
pub trait CredentialSource: Send + Sync {
    /// Resolves the current credentials.
    fn credentials(&self) -> SyncResult<StaticCredentials>;

    /// Short label for logs.
    fn describe(&self) -> &'static str;
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> SyncResult<StaticCredentials> {
        if self.access_key_id.trim().is_empty() || self.secret_access_key.trim().is_empty() {
            return Err(SyncError::AuthenticationUnavailable(
                "static credentials are blank".into(),
            ));
        }
        Ok(self.clone())
    }

    fn describe(&self) -> &'static str {
        "static"
    }
}

/// The ambient credential chain: environment variables, then the shared
/// credentials file.
///
/// Resolution happens on every call, so a regenerated signer observes
/// rotated credentials.
#[derive(Debug, Clone, Default)]
pub struct AmbientCredentials {
    profile: Option<String>,
    credentials_file: Option<PathBuf>,
}

impl AmbientCredentials {
    /// Creates a chain using `AWS_PROFILE` and the default file location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a fixed profile name.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Uses a fixed shared credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Resolves credentials against the given environment lookup.
    pub fn resolve_with<F>(&self, env: F) -> SyncResult<StaticCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let (Some(id), Some(secret)) = (
            non_empty("AWS_ACCESS_KEY_ID"),
            non_empty("AWS_SECRET_ACCESS_KEY"),
        ) {
            debug!("resolved credentials from environment");
            let mut creds = StaticCredentials::new(id, secret);
            creds.session_token = non_empty("AWS_SESSION_TOKEN");
            return Ok(creds);
        }

        let profile = self
            .profile
            .clone()
            .or_else(|| non_empty("AWS_PROFILE"))
            .unwrap_or_else(|| "default".to_string());
        let path = self
            .credentials_file
            .clone()
            .or_else(|| non_empty("AWS_SHARED_CREDENTIALS_FILE").map(PathBuf::from))
            .or_else(|| {
                non_empty("HOME")
                    .or_else(|| non_empty("USERPROFILE"))
                    .map(|home| PathBuf::from(home).join(".aws").join("credentials"))
            })
            .ok_or_else(|| {
                SyncError::AuthenticationUnavailable(
                    "no credentials in environment and no home directory".into(),
                )
            })?;

        let text = std::fs::read_to_string(&path).map_err(|e| {
            SyncError::AuthenticationUnavailable(format!(
                "no credentials in environment and {} unreadable: {e}",
                path.display()
            ))
        })?;
        let creds = parse_profile(&text, &profile).ok_or_else(|| {
            SyncError::AuthenticationUnavailable(format!(
                "profile [{profile}] in {} has no access key",
                path.display()
            ))
        })?;
        debug!(profile = %profile, file = %path.display(), "resolved credentials from shared file");
        Ok(creds)
    }
}

impl CredentialSource for AmbientCredentials {
    fn credentials(&self) -> SyncResult<StaticCredentials> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    fn describe(&self) -> &'static str {
        "ambient"
    }
}

fn parse_profile(text: &str, profile: &str) -> Option<StaticCredentials> {
    let mut in_profile = false;
    let mut values: BTreeMap<String, String> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let section = section.trim();
            in_profile = section == profile || section == format!("profile {profile}");
            continue;
        }
        if in_profile {
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
    }

    let id = values.remove("aws_access_key_id")?;
    let secret = values.remove("aws_secret_access_key")?;
    let mut creds = StaticCredentials::new(id, secret);
    creds.session_token = values.remove("aws_session_token");
    Some(creds)
}

/// Chooses static credentials when configured, otherwise the ambient chain.
pub fn credential_source(config: &SyncConfig) -> Arc<dyn CredentialSource> {
    match &config.static_credentials {
        Some(creds) => Arc::new(creds.clone()),
        None => Arc::new(AmbientCredentials::new()),
    }
}

/// Signs catalog requests with a fixed set of resolved credentials.
///
/// A new signer is built to pick up rotated credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: StaticCredentials,
    region: String,
    service: String,
    fixed_time: Option<DateTime<Utc>>,
}

impl RequestSigner {
    /// Resolves credentials from `source` and builds a signer.
    pub fn new(
        source: &dyn CredentialSource,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> SyncResult<Self> {
        let credentials = source.credentials()?;
        let region = region.into();
        let service = service.into();
        debug!(
            source = source.describe(),
            access_key_id = %credentials.access_key_id,
            region = %region,
            service = %service,
            "created request signer"
        );
        Ok(Self {
            credentials,
            region,
            service,
            fixed_time: None,
        })
    }

    /// Pins the signing time.
    pub fn with_fixed_time(mut self, time: DateTime<Utc>) -> Self {
        self.fixed_time = Some(time);
        self
    }

    /// Access key id in use.
    pub fn access_key_id(&self) -> &str {
        &self.credentials.access_key_id
    }

    /// Produces the headers for a GET of `url` with `query`.
    pub fn sign(&self, url: &Url, query: &[(String, String)]) -> SyncResult<BTreeMap<String, String>> {
        let request = SigningRequest {
            method: "GET",
            url,
            query,
            region: &self.region,
            service: &self.service,
            time: self.fixed_time.unwrap_or_else(Utc::now),
        };
        let keys = SigningKeys {
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            session_token: self.credentials.session_token.as_deref(),
        };
        let signature = sigv4::sign(&request, &keys)?;
        trace!(canonical_request = %signature.canonical_request, "signed request");
        Ok(signature.headers)
    }
}

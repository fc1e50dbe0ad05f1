//! SigV4 verification of incoming catalog requests.
//!
//! The verifier recomputes the signature from the request URL and headers
//! with the shared secret, the same way a cloud API gateway does, and
//! compares it with the one in the `Authorization` header.

use crate::config::SigningRequirement;
use crate::error::{ServerError, ServerResult};
use acctreg_protocol::sigv4::{self, SigningKeys, SigningRequest};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};
use url::Url;

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Verifies SigV4 signatures against one known key pair.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    requirement: SigningRequirement,
}

impl SignatureVerifier {
    /// Creates a verifier.
    pub fn new(requirement: SigningRequirement) -> Self {
        Self { requirement }
    }

    /// Checks the signature of a GET of `url`.
    pub fn verify(&self, url: &Url, headers: &BTreeMap<String, String>) -> ServerResult<()> {
        let fail = |reason: String| {
            warn!(url = %url, reason = %reason, "rejecting unsigned or mis-signed request");
            ServerError::AuthenticationFailed(reason)
        };

        let authorization = header(headers, "authorization")
            .ok_or_else(|| fail("missing Authorization header".into()))?;
        let parsed =
            sigv4::parse_authorization(authorization).map_err(|e| fail(e.to_string()))?;

        let req = &self.requirement;
        if parsed.access_key_id != req.access_key_id {
            return Err(fail(format!("unknown access key {}", parsed.access_key_id)));
        }
        if parsed.region != req.region || parsed.service != req.service {
            return Err(fail(format!(
                "credential scope {}/{} does not match {}/{}",
                parsed.region, parsed.service, req.region, req.service
            )));
        }

        let amz_date =
            header(headers, "x-amz-date").ok_or_else(|| fail("missing X-Amz-Date".into()))?;
        let time = sigv4::parse_amz_date(amz_date).map_err(|e| fail(e.to_string()))?;
        if let Some(max_skew) = req.max_clock_skew {
            let delta = Utc::now().signed_duration_since(time);
            let skew = delta
                .to_std()
                .or_else(|_| (-delta).to_std())
                .unwrap_or_default();
            if skew > max_skew {
                return Err(fail(format!("request time {amz_date} is too far from now")));
            }
        }

        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let request = SigningRequest {
            method: "GET",
            url,
            query: &query,
            region: &req.region,
            service: &req.service,
            time,
        };
        let keys = SigningKeys {
            access_key_id: &req.access_key_id,
            secret_access_key: &req.secret_access_key,
            session_token: header(headers, "x-amz-security-token"),
        };
        let expected = sigv4::sign(&request, &keys).map_err(|e| fail(e.to_string()))?;

        if expected.signature != parsed.signature {
            return Err(fail("signature mismatch".into()));
        }
        debug!(access_key_id = %parsed.access_key_id, "signature verified");
        Ok(())
    }
}

/// Refuses the next N requests with 403, to simulate expired credentials.
#[derive(Debug, Default)]
pub struct ForbiddenSwitch {
    remaining: AtomicU32,
}

impl ForbiddenSwitch {
    /// Creates a switch that lets everything through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses the next `count` requests.
    pub fn reject_next(&self, count: u32) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    /// Consumes one refusal if any are left.
    pub fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Refusals still pending.
    pub fn pending(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

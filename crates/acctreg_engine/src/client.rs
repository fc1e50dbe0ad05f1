//! Remote account client.
//!
//! Fetches account pages from the remote catalog, optionally signing every
//! request, and classifies failures into [`SyncError`] variants:
//!
//! - no response at all → `Unreachable`
//! - non-2xx status → `RemoteError`
//! - undecodable body or missing bookmark → `MalformedResponse`
//!
//! In signed mode a `403` triggers exactly one retry with a freshly built
//! signer, which picks up rotated credentials.

use crate::config::{AuthMode, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpResponse};
use crate::signer::{credential_source, CredentialSource, RequestSigner};
use crate::transport::{AccountSource, FetchedBatch};
use acctreg_protocol::sigv4::canonical_query;
use acctreg_protocol::{Page, ProtocolVariant, Watermark};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Client for the remote account catalog.
pub struct RemoteAccountClient<C: HttpClient> {
    config: SyncConfig,
    http: C,
    credentials: Arc<dyn CredentialSource>,
    signer: Mutex<Option<RequestSigner>>,
}

impl<C: HttpClient> RemoteAccountClient<C> {
    /// Creates a client; the credential source follows the configuration.
    pub fn new(config: SyncConfig, http: C) -> Self {
        let credentials = credential_source(&config);
        Self {
            config,
            http,
            credentials,
            signer: Mutex::new(None),
        }
    }

    /// Replaces the credential source.
    pub fn with_credential_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = source;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &C {
        &self.http
    }

    /// Fetches one page.
    ///
    /// When `watermark` is set the delta parameter is appended unless `url`
    /// already carries it.
    pub fn fetch_page(&self, url: &str, watermark: Option<&Watermark>) -> SyncResult<Page> {
        let (target, query) = self.prepare(url, watermark)?;
        debug!(url = %target, "fetching account page");

        let mut response = self.send(&target, &query, false)?;
        if response.status == 403 && self.config.auth.is_signed() {
            warn!(url = %target, "remote returned 403; regenerating signer and retrying once");
            response = self.send(&target, &query, true)?;
        }

        if !response.is_success() {
            let err = SyncError::remote(response.status, &response.body);
            if err.is_client_error() {
                error!(error = %err, "remote rejected the request; this is likely a client configuration problem");
            } else {
                error!(error = %err, "remote server error");
            }
            return Err(err);
        }

        Page::decode(self.config.variant, &response.body).map_err(SyncError::from)
    }

    /// Fetches every account changed after `watermark`.
    pub fn fetch_all(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch> {
        match self.config.variant {
            ProtocolVariant::PaginationLink => self.fetch_linked(watermark),
            ProtocolVariant::Bookmark => self.fetch_bookmarked(watermark),
        }
    }

    fn fetch_linked(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch> {
        let mut batch = FetchedBatch::default();
        let mut next = Some(self.config.base_url.clone());

        while let Some(url) = next.take() {
            if batch.pages >= self.config.max_pages {
                return Err(SyncError::MalformedResponse(format!(
                    "pagination exceeded {} pages; last next url {url}",
                    self.config.max_pages
                )));
            }
            let page = self.fetch_page(&url, watermark)?;
            batch.pages += 1;
            debug!(
                page = batch.pages,
                accounts = page.accounts.len(),
                "received account page"
            );
            next = page.next_url().map(str::to_string);
            batch.accounts.extend(page.accounts);
        }

        info!(
            accounts = batch.accounts.len(),
            pages = batch.pages,
            "fetched accounts from remote"
        );
        Ok(batch)
    }

    fn fetch_bookmarked(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch> {
        let page = self.fetch_page(&self.config.base_url, watermark)?;
        let bookmark = page.bookmark();
        if bookmark.is_none() {
            return Err(SyncError::MalformedResponse(
                "response from remote host did not contain a valid bookmark".into(),
            ));
        }
        info!(
            accounts = page.accounts.len(),
            bookmark = ?bookmark,
            "fetched accounts from remote"
        );
        Ok(FetchedBatch {
            accounts: page.accounts,
            bookmark,
            pages: 1,
        })
    }

    /// Parses `url`, merges the delta parameter and re-encodes the query
    /// strictly so the wire form matches the signed form.
    fn prepare(
        &self,
        url: &str,
        watermark: Option<&Watermark>,
    ) -> SyncResult<(Url, Vec<(String, String)>)> {
        let mut target = Url::parse(url)
            .map_err(|e| SyncError::Configuration(format!("invalid remote url {url:?}: {e}")))?;

        let mut query: Vec<(String, String)> = target
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if let Some(mark) = watermark {
            let param = self.config.delta_param();
            if !query.iter().any(|(k, _)| k == param) {
                query.push((param.to_string(), mark.as_query_value()));
            }
        }

        if query.is_empty() {
            target.set_query(None);
        } else {
            target.set_query(Some(&canonical_query(&query)));
        }
        Ok((target, query))
    }

    fn send(
        &self,
        target: &Url,
        query: &[(String, String)],
        regenerate: bool,
    ) -> SyncResult<HttpResponse> {
        let headers = match &self.config.auth {
            AuthMode::Direct => BTreeMap::new(),
            AuthMode::Signed { region, service } => {
                let mut slot = self.signer.lock();
                if regenerate || slot.is_none() {
                    *slot = Some(RequestSigner::new(
                        self.credentials.as_ref(),
                        region.clone(),
                        service.clone(),
                    )?);
                }
                match slot.as_ref() {
                    Some(signer) => signer.sign(target, query)?,
                    None => {
                        return Err(SyncError::AuthenticationUnavailable(
                            "signer unavailable".into(),
                        ))
                    }
                }
            }
        };

        self.http.get(target.as_str(), &headers).map_err(|e| {
            warn!(url = %target, error = %e, "remote unreachable");
            SyncError::Unreachable(e)
        })
    }
}

impl<C: HttpClient> AccountSource for RemoteAccountClient<C> {
    fn fetch(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch> {
        self.fetch_all(watermark)
    }

    fn variant(&self) -> ProtocolVariant {
        self.config.variant
    }
}

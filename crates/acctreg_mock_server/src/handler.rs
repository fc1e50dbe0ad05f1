//! Request handling for the catalog endpoint.

use crate::auth::{ForbiddenSwitch, SignatureVerifier};
use crate::catalog::AccountCatalog;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use acctreg_protocol::{parse_timestamp, Page, PageCursor, ProtocolVariant};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Query parameter carrying the page index of a next link.
pub const PAGE_PARAM: &str = "page";

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Account catalog (shared across all handlers).
    pub catalog: Arc<AccountCatalog>,
    /// Injected 403 responses.
    pub forbidden: ForbiddenSwitch,
    verifier: Option<SignatureVerifier>,
    requests: AtomicU64,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, catalog: Arc<AccountCatalog>) -> Self {
        let verifier = config.signing.clone().map(SignatureVerifier::new);
        Self {
            config,
            catalog,
            forbidden: ForbiddenSwitch::new(),
            verifier,
            requests: AtomicU64::new(0),
        }
    }

    /// Number of requests received.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Handler for catalog requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a GET of the accounts collection and returns the JSON body.
    pub fn handle_get(&self, url: &str, headers: &BTreeMap<String, String>) -> ServerResult<Vec<u8>> {
        self.context.requests.fetch_add(1, Ordering::SeqCst);
        let url = Url::parse(url).map_err(|e| ServerError::InvalidRequest(format!("bad url: {e}")))?;
        self.check_path(&url)?;

        if self.context.forbidden.take() {
            return Err(ServerError::Forbidden("credentials expired".into()));
        }
        if let Some(verifier) = &self.context.verifier {
            verifier.verify(&url, headers)?;
        }

        let params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        match self.context.config.variant {
            ProtocolVariant::Bookmark => self.bookmark_page(&params),
            ProtocolVariant::PaginationLink => self.link_page(&url, &params),
        }
    }

    fn check_path(&self, url: &Url) -> ServerResult<()> {
        let base = Url::parse(&self.context.config.base_url)
            .map_err(|e| ServerError::Internal(format!("bad base url: {e}")))?;
        if base.path().trim_end_matches('/') != url.path().trim_end_matches('/') {
            return Err(ServerError::NotFound(url.path().to_string()));
        }
        Ok(())
    }

    fn param<'a>(&self, params: &'a [(String, String)], name: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn bookmark_page(&self, params: &[(String, String)]) -> ServerResult<Vec<u8>> {
        let delta = self.context.config.delta_param();
        let after = match self.param(params, delta) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ServerError::InvalidRequest(format!("{delta} must be an unsigned integer, got {raw:?}"))
            })?,
            None => 0,
        };

        let accounts = self.context.catalog.changed_after_bookmark(after);
        let bookmark = self.context.catalog.cursor().max(after);
        debug!(after, bookmark, accounts = accounts.len(), "serving bookmark page");

        Page::new(accounts, PageCursor::Bookmark(bookmark))
            .encode(ProtocolVariant::Bookmark)
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    fn link_page(&self, url: &Url, params: &[(String, String)]) -> ServerResult<Vec<u8>> {
        let delta = self.context.config.delta_param();
        let since = match self.param(params, delta) {
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                ServerError::InvalidRequest(format!("{delta} is not a timestamp: {raw:?}"))
            })?),
            None => None,
        };
        let page = match self.param(params, PAGE_PARAM) {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ServerError::InvalidRequest(format!("bad page index {raw:?}")))?,
            None => 0,
        };

        let size = self.context.config.page_size.max(1);
        let matching = self.context.catalog.changed_after_time(since);
        let start = page.saturating_mul(size);
        let accounts: Vec<_> = matching.iter().skip(start).take(size).cloned().collect();

        let cursor = if start.saturating_add(size) < matching.len() {
            PageCursor::NextUrl(next_link(url, params, page + 1))
        } else {
            PageCursor::End
        };
        debug!(
            page,
            accounts = accounts.len(),
            total = matching.len(),
            "serving link page"
        );

        Page::new(accounts, cursor)
            .encode(ProtocolVariant::PaginationLink)
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// `url` with the page parameter set to `page` and every other parameter
/// kept.
fn next_link(url: &Url, params: &[(String, String)], page: usize) -> String {
    let mut next = url.clone();
    {
        let mut query = next.query_pairs_mut();
        query.clear();
        for (key, value) in params.iter().filter(|(key, _)| key != PAGE_PARAM) {
            query.append_pair(key, value);
        }
        query.append_pair(PAGE_PARAM, &page.to_string());
    }
    next.to_string()
}

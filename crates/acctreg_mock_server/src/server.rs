//! Main catalog server.

use crate::catalog::AccountCatalog;
use crate::config::ServerConfig;
use crate::handler::{HandlerContext, RequestHandler};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// The mock account catalog.
///
/// Answers GETs of the accounts collection in the configured protocol
/// variant. Requests are handed in as a full URL plus headers, which lets a
/// client route them here without a socket.
///
/// # Example
///
/// ```
/// use acctreg_mock_server::{AccountServer, ServerConfig};
/// use acctreg_protocol::{ProtocolVariant, RawAccount};
/// use std::collections::BTreeMap;
///
/// let config = ServerConfig::new("http://catalog.local/hello", ProtocolVariant::Bookmark);
/// let server = AccountServer::new(config);
/// server.catalog().upsert(RawAccount::new("dev", "123456789012", "deploy"));
///
/// let (status, body) = server.respond("http://catalog.local/hello?after=0", &BTreeMap::new());
/// assert_eq!(status, 200);
/// assert!(String::from_utf8(body).unwrap().contains("\"bookmark\":1"));
/// ```
pub struct AccountServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl AccountServer {
    /// Creates a server with an empty catalog.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_catalog(config, Arc::new(AccountCatalog::new()))
    }

    /// Creates a server around an existing catalog.
    pub fn with_catalog(config: ServerConfig, catalog: Arc<AccountCatalog>) -> Self {
        let context = Arc::new(HandlerContext::new(config, catalog));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// The account catalog.
    pub fn catalog(&self) -> &AccountCatalog {
        &self.context.catalog
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Handles a GET; errors are returned as strings.
    pub fn handle_get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<Vec<u8>, String> {
        self.handler
            .handle_get(url, headers)
            .map_err(|e| e.to_string())
    }

    /// Handles a GET and returns status and body as an HTTP server would.
    pub fn respond(&self, url: &str, headers: &BTreeMap<String, String>) -> (u16, Vec<u8>) {
        match self.handler.handle_get(url, headers) {
            Ok(body) => (200, body),
            Err(e) => {
                debug!(url, error = %e, "request refused");
                (e.status_code(), e.to_string().into_bytes())
            }
        }
    }

    /// Refuses the next `count` requests with 403.
    pub fn reject_next(&self, count: u32) {
        self.context.forbidden.reject_next(count);
    }

    /// Returns the number of requests received.
    pub fn request_count(&self) -> u64 {
        self.context.request_count()
    }
}

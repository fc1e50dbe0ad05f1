//! HTTP client abstraction.
//!
//! The remote account client only needs a bodiless GET with headers. The
//! actual HTTP stack is behind [`HttpClient`] so tests can route requests to
//! an in-process catalog without a socket.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// A response as seen by the account client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    ///
    /// `Err` means no response was received at all (connect failure,
    /// timeout); any received status is returned as `Ok`.
    fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse, String>;

    /// Checks if the client is usable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Blocking `reqwest` client with bounded timeouts.
///
/// Must not be driven from inside an async task; use `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client with the given connect and read timeouts.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .user_agent(concat!("acctreg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Configuration(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Builds a client from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(config.connect_timeout, config.read_timeout)
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse, String> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            // reqwest derives the same Host value from the URL.
            if name.eq_ignore_ascii_case("host") {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?;
        trace!(url, status, bytes = body.len(), "http response");
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Trait for in-process servers that can answer loopback requests.
pub trait LoopbackServer {
    /// Handles a GET request for the full URL.
    fn handle_get(&self, url: &str, headers: &BTreeMap<String, String>) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// The wrapped server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse, String> {
        Ok(self.server.handle_get(url, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct EchoServer {
        seen: Mutex<Vec<String>>,
    }

    impl LoopbackServer for EchoServer {
        fn handle_get(&self, url: &str, _headers: &BTreeMap<String, String>) -> HttpResponse {
            self.seen.lock().push(url.to_string());
            HttpResponse::new(200, url.as_bytes().to_vec())
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn loopback_routes_full_url() {
        let client = LoopbackClient::new(EchoServer {
            seen: Mutex::new(Vec::new()),
        });
        let response = client
            .get("http://catalog/accounts?after=1", &BTreeMap::new())
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.body, b"http://catalog/accounts?after=1");
        assert_eq!(client.server().seen.lock().len(), 1);
        assert!(client.is_healthy());
    }

    #[test]
    fn reqwest_client_sends_headers() {
        let rt = runtime();
        let server = rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/accounts"))
                .and(query_param("after", "5"))
                .and(header("x-amz-date", "20200908T080808Z"))
                .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"accounts":[]}"#))
                .expect(1)
                .mount(&server)
                .await;
            server
        });

        let client = ReqwestClient::new(Duration::from_secs(2), Duration::from_secs(6)).unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("X-Amz-Date".to_string(), "20200908T080808Z".to_string());
        headers.insert("Host".to_string(), "ignored.example.com".to_string());
        let response = client
            .get(&format!("{}/accounts?after=5", server.uri()), &headers)
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"accounts":[]}"#);
        rt.block_on(server.verify());
    }

    #[test]
    fn reqwest_client_reports_status_as_response() {
        let rt = runtime();
        let server = rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
                .mount(&server)
                .await;
            server
        });

        let client = ReqwestClient::new(Duration::from_secs(2), Duration::from_secs(6)).unwrap();
        let response = client.get(&server.uri(), &BTreeMap::new()).unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[test]
    fn reqwest_client_unreachable_is_err() {
        let client =
            ReqwestClient::new(Duration::from_millis(200), Duration::from_millis(200)).unwrap();
        assert!(client
            .get("http://127.0.0.1:1/accounts", &BTreeMap::new())
            .is_err());
    }
}

//! Source abstraction for account batches.

use crate::error::{SyncError, SyncResult};
use acctreg_protocol::{ProtocolVariant, RawAccount, Watermark};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Everything one fetch returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedBatch {
    /// Accounts across all pages, in page order.
    pub accounts: Vec<RawAccount>,
    /// Bookmark returned by the remote (bookmark variant only).
    pub bookmark: Option<u64>,
    /// Number of pages requested.
    pub pages: usize,
}

impl FetchedBatch {
    /// Creates a single-page batch.
    pub fn new(accounts: Vec<RawAccount>) -> Self {
        Self {
            accounts,
            bookmark: None,
            pages: 1,
        }
    }

    /// Sets the bookmark.
    pub fn with_bookmark(mut self, bookmark: u64) -> Self {
        self.bookmark = Some(bookmark);
        self
    }
}

/// Something that can fetch the accounts changed since a watermark.
///
/// This abstracts the network layer, allowing the coordinator to run against
/// the HTTP client or a scripted source in tests.
pub trait AccountSource: Send + Sync {
    /// Fetches every account changed after `watermark` (all when `None`).
    fn fetch(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch>;

    /// The protocol variant this source speaks.
    fn variant(&self) -> ProtocolVariant;
}

/// A scripted source for testing.
///
/// Queued results are returned in order; once the queue is empty every fetch
/// returns an empty batch.
#[derive(Debug, Default)]
pub struct MockSource {
    variant: ProtocolVariant,
    responses: Mutex<VecDeque<SyncResult<FetchedBatch>>>,
    requests: Mutex<Vec<Option<Watermark>>>,
}

impl MockSource {
    /// Creates a mock source for the given variant.
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful batch.
    pub fn push_batch(&self, batch: FetchedBatch) {
        self.responses.lock().push_back(Ok(batch));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: SyncError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Watermarks passed to each fetch so far.
    pub fn requests(&self) -> Vec<Option<Watermark>> {
        self.requests.lock().clone()
    }

    /// Number of fetches so far.
    pub fn fetch_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl AccountSource for MockSource {
    fn fetch(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch> {
        self.requests.lock().push(watermark.cloned());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchedBatch::default()))
    }

    fn variant(&self) -> ProtocolVariant {
        self.variant
    }
}

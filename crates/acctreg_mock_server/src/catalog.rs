//! The account catalog behind the mock server.

use crate::error::{ServerError, ServerResult};
use acctreg_protocol::{parse_timestamp, RawAccount, STATUS_SUSPENDED};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// First synthetic `updatedAt` handed out (2020-01-01T00:00:00Z).
const EPOCH_SECONDS: i64 = 1_577_836_800;

#[derive(Debug, Clone)]
struct Entry {
    sequence: u64,
    account: RawAccount,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    last_sequence: u64,
}

/// Latest version of every account, each tagged with the sequence number of
/// its last change.
///
/// Sequence numbers double as bookmarks. Changes without an explicit
/// `updatedAt` are stamped one second apart, starting at 2020-01-01, so
/// timestamps increase with the sequence.
#[derive(Debug, Default)]
pub struct AccountCatalog {
    inner: RwLock<Inner>,
}

impl AccountCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding `accounts`, in order.
    pub fn with_accounts<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = RawAccount>,
    {
        let catalog = Self::new();
        for account in accounts {
            catalog.upsert(account);
        }
        catalog
    }

    /// Inserts or replaces an account; returns its new sequence number.
    ///
    /// Records without a name are stored under a synthetic key so invalid
    /// data can be served too.
    pub fn upsert(&self, mut account: RawAccount) -> u64 {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;
        let sequence = inner.last_sequence;

        if account.updated_at.is_none() {
            account.updated_at = Some(stamp(sequence));
        }
        if account.deleted_at.is_none() {
            account.deleted_at = Some(0);
        }
        let key = account
            .name()
            .map_or_else(|| format!("#{sequence}"), str::to_string);
        debug!(account = %key, sequence, "catalog upsert");
        inner.entries.insert(key, Entry { sequence, account });
        sequence
    }

    /// Marks an account suspended.
    pub fn suspend(&self, name: &str) -> ServerResult<u64> {
        self.modify(name, |account| {
            account.status = Some(STATUS_SUSPENDED.to_string());
        })
    }

    /// Sets the deletion marker of an account.
    pub fn mark_deleted(&self, name: &str, deleted_at: i64) -> ServerResult<u64> {
        self.modify(name, |account| account.deleted_at = Some(deleted_at))
    }

    fn modify<F>(&self, name: &str, change: F) -> ServerResult<u64>
    where
        F: FnOnce(&mut RawAccount),
    {
        let mut inner = self.inner.write();
        let sequence = inner.last_sequence + 1;
        let entry = inner
            .entries
            .get_mut(name)
            .ok_or_else(|| ServerError::NotFound(format!("account {name}")))?;
        change(&mut entry.account);
        entry.account.updated_at = Some(stamp(sequence));
        entry.sequence = sequence;
        inner.last_sequence = sequence;
        Ok(sequence)
    }

    /// Latest version of one account.
    pub fn get(&self, name: &str) -> Option<RawAccount> {
        self.inner.read().entries.get(name).map(|e| e.account.clone())
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Sequence number of the latest change.
    pub fn cursor(&self) -> u64 {
        self.inner.read().last_sequence
    }

    /// Accounts changed after `bookmark`, oldest change first.
    pub fn changed_after_bookmark(&self, bookmark: u64) -> Vec<RawAccount> {
        self.select(|entry| entry.sequence > bookmark)
    }

    /// Accounts whose `updatedAt` is strictly later than `after`, oldest
    /// change first. Everything is returned when `after` is `None`.
    pub fn changed_after_time(&self, after: Option<DateTime<FixedOffset>>) -> Vec<RawAccount> {
        let Some(after) = after else {
            return self.select(|_| true);
        };
        self.select(|entry| {
            entry
                .account
                .updated_at
                .as_deref()
                .and_then(parse_timestamp)
                .is_some_and(|at| at > after)
        })
    }

    fn select<F>(&self, keep: F) -> Vec<RawAccount>
    where
        F: Fn(&Entry) -> bool,
    {
        let inner = self.inner.read();
        let mut entries: Vec<&Entry> = inner.entries.values().filter(|e| keep(e)).collect();
        entries.sort_by_key(|e| e.sequence);
        entries.into_iter().map(|e| e.account.clone()).collect()
    }
}

/// Synthetic RFC 3339 timestamp for a sequence number.
fn stamp(sequence: u64) -> String {
    let epoch = DateTime::<Utc>::from_timestamp(EPOCH_SECONDS, 0).unwrap_or_default();
    let offset = i64::try_from(sequence).unwrap_or(i64::MAX / 2_000);
    (epoch + Duration::seconds(offset)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

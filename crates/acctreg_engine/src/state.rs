//! Sync coordinator state machine.

use crate::config::BackoffConfig;
use crate::convert::{AccountConverter, Conversion};
use crate::defaults::DefaultsConfig;
use crate::definition::{PrimaryDefinition, SecondaryDefinition};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{reconcile, AccountSets, Reconciliation};
use crate::transport::{AccountSource, FetchedBatch};
use acctreg_protocol::{latest_timestamp, ProtocolVariant, Watermark};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a sync cycle is, or how the last one ended.
///
/// [`SyncCoordinator::phase`] reports the live phase, which is back at `Idle`
/// once a cycle ends. [`SyncCoordinator::last_outcome`] keeps the terminal
/// phase of the last cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    /// No cycle is running. As an outcome: the last cycle had nothing to commit.
    Idle,
    /// Fetching pages from the remote.
    Fetching,
    /// Converting raw accounts.
    Converting,
    /// Merging into the current sets.
    Reconciling,
    /// The last cycle committed new sets.
    Committed,
    /// The last cycle failed and the coordinator is waiting to retry.
    BackingOff,
    /// The last cycle failed on a non-retryable error; backoff still applies.
    Failed,
}

impl SyncPhase {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Fetching | SyncPhase::Converting | SyncPhase::Reconciling
        )
    }

    /// Returns true if the last cycle failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncPhase::BackingOff | SyncPhase::Failed)
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that committed new sets.
    pub cycles_completed: u64,
    /// Cycles that ended without changes.
    pub cycles_unchanged: u64,
    /// Calls skipped because of backoff.
    pub cycles_skipped: u64,
    /// Failed cycles.
    pub failures: u64,
    /// Raw accounts received.
    pub accounts_fetched: u64,
    /// Pages received.
    pub pages_fetched: u64,
    /// Accounts rejected by validation.
    pub accounts_rejected: u64,
    /// Time of the last commit.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// What a call to [`SyncCoordinator::try_synchronize`] did.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Skipped without I/O; still backing off.
    BackingOff {
        /// Time until the next attempt is allowed.
        remaining: Duration,
    },
    /// The remote had nothing new, or nothing convertible.
    Unchanged,
    /// New sets were committed.
    Changed(Reconciliation),
}

impl SyncOutcome {
    /// Returns true if new sets were committed.
    pub fn is_changed(&self) -> bool {
        matches!(self, SyncOutcome::Changed(_))
    }
}

/// Point-in-time view of the coordinator's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Live phase.
    pub phase: SyncPhase,
    /// Terminal phase of the last cycle.
    pub last_outcome: SyncPhase,
    /// Watermark sent on the next fetch.
    pub last_sync: Option<Watermark>,
    /// Watermark of the last commit, awaiting `mark_synced`.
    pub last_attempted: Option<Watermark>,
    /// Consecutive failures.
    pub retry_count: u32,
    /// Time until the next attempt is allowed.
    pub backoff_remaining: Option<Duration>,
    /// Whether a commit has happened.
    pub initial_sync_done: bool,
    /// Names deleted by the remote and absent from both sets.
    pub deleted: Vec<String>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    last_sync: Option<Watermark>,
    last_attempted: Option<Watermark>,
    retry_count: u32,
    next_eligible: Option<Instant>,
    initial_sync_done: bool,
    deleted: BTreeSet<String>,
}

/// Keeps the local account sets in step with the remote catalog.
///
/// One mutex serializes every cycle. Readers take cloned snapshots under a
/// separate read lock, which a commit swaps in one step.
pub struct SyncCoordinator<S: AccountSource> {
    source: Arc<S>,
    converter: AccountConverter,
    backoff: BackoffConfig,
    state: Mutex<CoordinatorState>,
    accounts: RwLock<AccountSets>,
    phase: RwLock<SyncPhase>,
    outcome: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
}

impl<S: AccountSource> SyncCoordinator<S> {
    /// Creates a coordinator seeded with the locally configured accounts.
    pub fn new(source: S, defaults: DefaultsConfig) -> Self {
        let converter = AccountConverter::new(source.variant(), defaults);
        Self::with_converter(source, converter)
    }

    /// Creates a coordinator around a prepared converter.
    pub fn with_converter(source: S, converter: AccountConverter) -> Self {
        let seed = AccountSets::from_definitions(
            converter.defaults().accounts.iter().cloned(),
            converter.defaults().ecs_accounts.iter().cloned(),
        );
        debug!(
            primary = seed.primary.len(),
            secondary = seed.secondary.len(),
            "seeded local accounts"
        );
        Self {
            source: Arc::new(source),
            converter,
            backoff: BackoffConfig::default(),
            state: Mutex::new(CoordinatorState::default()),
            accounts: RwLock::new(seed),
            phase: RwLock::new(SyncPhase::Idle),
            outcome: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Resumes from a previously persisted watermark.
    pub fn with_watermark(self, watermark: Watermark) -> Self {
        {
            let mut state = self.state.lock();
            state.last_sync = Some(watermark.clone());
            state.last_attempted = Some(watermark);
        }
        self
    }

    /// The account source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Gets the live phase; `Idle` between cycles.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Gets how the last cycle ended.
    pub fn last_outcome(&self) -> SyncPhase {
        *self.outcome.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the current bookkeeping.
    pub fn status(&self) -> SyncStatus {
        let state = self.state.lock();
        let now = Instant::now();
        SyncStatus {
            phase: self.phase(),
            last_outcome: self.last_outcome(),
            last_sync: state.last_sync.clone(),
            last_attempted: state.last_attempted.clone(),
            retry_count: state.retry_count,
            backoff_remaining: state
                .next_eligible
                .filter(|at| *at > now)
                .map(|at| at - now),
            initial_sync_done: state.initial_sync_done,
            deleted: state.deleted.iter().cloned().collect(),
        }
    }

    /// Snapshot of the primary definitions.
    pub fn ec2_accounts(&self) -> Vec<PrimaryDefinition> {
        self.accounts.read().primary.values().cloned().collect()
    }

    /// Snapshot of the secondary definitions.
    pub fn ecs_accounts(&self) -> Vec<SecondaryDefinition> {
        self.accounts.read().secondary.values().cloned().collect()
    }

    /// Snapshot of both sets.
    pub fn accounts(&self) -> AccountSets {
        self.accounts.read().clone()
    }

    /// Runs one cycle; returns true if new sets were committed and should be
    /// propagated.
    ///
    /// Failures are logged and drive backoff; they never escape.
    pub fn synchronize(&self) -> bool {
        match self.try_synchronize() {
            Ok(outcome) => outcome.is_changed(),
            Err(_) => false,
        }
    }

    /// Runs one cycle and reports what happened.
    ///
    /// On `Err` the backoff has already been applied.
    pub fn try_synchronize(&self) -> SyncResult<SyncOutcome> {
        let mut state = self.state.lock();

        let now = Instant::now();
        if let Some(until) = state.next_eligible {
            if now < until {
                let remaining = until - now;
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "backing off; skipping sync"
                );
                self.stats.write().cycles_skipped += 1;
                if self.last_outcome() != SyncPhase::Failed {
                    self.finish(SyncPhase::BackingOff);
                }
                return Ok(SyncOutcome::BackingOff { remaining });
            }
        }

        self.set_phase(SyncPhase::Fetching);
        let batch = match self.source.fetch(state.last_sync.as_ref()) {
            Ok(batch) => batch,
            Err(e) => return Err(self.fail(&mut state, e)),
        };
        {
            let mut stats = self.stats.write();
            stats.accounts_fetched += batch.accounts.len() as u64;
            stats.pages_fetched += batch.pages as u64;
        }

        if batch.accounts.is_empty() {
            self.caught_up(&mut state, &batch);
            return Ok(SyncOutcome::Unchanged);
        }

        let watermark = match self.watermark_of(&batch) {
            Ok(mark) => mark,
            Err(e) => return Err(self.fail(&mut state, e)),
        };

        self.set_phase(SyncPhase::Converting);
        let conversion = match self.converter.convert(&batch.accounts) {
            Ok(conversion) => conversion,
            Err(e) => return Err(self.fail(&mut state, e)),
        };
        self.stats.write().accounts_rejected += conversion.rejected.len() as u64;
        if conversion.is_empty() {
            info!(
                accounts = batch.accounts.len(),
                "remote accounts resulted in nothing to apply"
            );
            self.unchanged();
            return Ok(SyncOutcome::Unchanged);
        }

        self.set_phase(SyncPhase::Reconciling);
        let reconciliation = self.commit(&mut state, &conversion, watermark);
        Ok(SyncOutcome::Changed(reconciliation))
    }

    /// Records that the last committed sets were durably propagated, so the
    /// next fetch asks only for later changes.
    pub fn mark_synced(&self) {
        let mut state = self.state.lock();
        if state.last_sync != state.last_attempted {
            debug!(
                from = ?state.last_sync,
                to = ?state.last_attempted,
                "advancing sync watermark"
            );
        }
        state.last_sync = state.last_attempted.clone();
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Records the terminal phase of a cycle and returns to `Idle`.
    fn finish(&self, outcome: SyncPhase) {
        debug!(outcome = ?outcome, "sync cycle finished");
        *self.outcome.write() = outcome;
        self.set_phase(SyncPhase::Idle);
    }

    fn unchanged(&self) {
        self.finish(SyncPhase::Idle);
        self.stats.write().cycles_unchanged += 1;
    }

    /// Handles a response without accounts.
    fn caught_up(&self, state: &mut CoordinatorState, batch: &FetchedBatch) {
        if self.source.variant() == ProtocolVariant::Bookmark {
            if let Some(bookmark) = batch.bookmark {
                // Nothing to propagate, so both watermarks move together.
                let mark = Watermark::latest(state.last_sync.as_ref(), Watermark::Bookmark(bookmark));
                debug!(bookmark = %mark, "caught up with remote");
                state.last_attempted = Some(mark.clone());
                state.last_sync = Some(mark);
            }
        }
        debug!("no remote changes");
        self.unchanged();
    }

    /// Watermark candidate for a non-empty batch.
    fn watermark_of(&self, batch: &FetchedBatch) -> SyncResult<Watermark> {
        match self.source.variant() {
            ProtocolVariant::Bookmark => match batch.bookmark {
                Some(bookmark) => Ok(Watermark::Bookmark(bookmark)),
                None => Err(SyncError::MalformedResponse(format!(
                    "{} accounts arrived without a bookmark",
                    batch.accounts.len()
                ))),
            },
            ProtocolVariant::PaginationLink => {
                let latest = latest_timestamp(
                    batch
                        .accounts
                        .iter()
                        .filter_map(|a| a.updated_at.as_deref()),
                );
                match latest {
                    Some(ts) => Ok(Watermark::Timestamp(ts.to_string())),
                    None => Err(SyncError::MalformedResponse(format!(
                        "none of {} accounts carried a parseable updatedAt",
                        batch.accounts.len()
                    ))),
                }
            }
        }
    }

    fn commit(
        &self,
        state: &mut CoordinatorState,
        conversion: &Conversion,
        watermark: Watermark,
    ) -> Reconciliation {
        let reconciliation = {
            let mut accounts = self.accounts.write();
            let reconciliation = reconcile(&accounts, conversion);
            *accounts = reconciliation.sets.clone();
            reconciliation
        };

        state.deleted.extend(conversion.deleted.iter().cloned());
        state
            .deleted
            .retain(|name| !reconciliation.sets.primary.contains_key(name));
        state.last_attempted = Some(Watermark::latest(state.last_attempted.as_ref(), watermark));
        state.retry_count = 0;
        state.next_eligible = None;
        state.initial_sync_done = true;

        self.finish(SyncPhase::Committed);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }
        info!(
            primary = reconciliation.sets.primary.len(),
            secondary = reconciliation.sets.secondary.len(),
            added = reconciliation.delta.primary.added.len(),
            updated = reconciliation.delta.primary.updated.len(),
            removed = reconciliation.delta.primary.removed.len(),
            watermark = ?state.last_attempted,
            "committed account sets"
        );
        reconciliation
    }

    /// Applies backoff for `error` and hands it back.
    fn fail(&self, state: &mut CoordinatorState, error: SyncError) -> SyncError {
        state.retry_count = state.retry_count.saturating_add(1);
        let delay = self.backoff.next_delay(state.retry_count);
        state.next_eligible = Some(Instant::now() + delay);

        self.finish(if error.is_retryable() {
            SyncPhase::BackingOff
        } else {
            SyncPhase::Failed
        });
        {
            let mut stats = self.stats.write();
            stats.failures += 1;
            stats.last_error = Some(error.to_string());
        }
        warn!(
            error = %error,
            retry_count = state.retry_count,
            delay_ms = delay.as_millis() as u64,
            "sync failed; backing off"
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockSource;
    use acctreg_protocol::{RawAccount, STATUS_SUSPENDED};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn account(name: &str, updated_at: &str) -> RawAccount {
        RawAccount::new(name, "1", "r")
            .with_regions(["us-west-2"])
            .with_providers(["ec2", "ecs"])
            .with_updated_at(updated_at)
    }

    fn no_backoff() -> BackoffConfig {
        BackoffConfig::default()
            .with_base_delay(Duration::ZERO)
            .with_max_jitter(Duration::ZERO)
    }

    fn link_coordinator() -> SyncCoordinator<MockSource> {
        SyncCoordinator::new(
            MockSource::new(ProtocolVariant::PaginationLink),
            DefaultsConfig::new(),
        )
    }

    #[test]
    fn phase_checks() {
        assert!(!SyncPhase::Idle.is_active());
        assert!(SyncPhase::Fetching.is_active());
        assert!(!SyncPhase::Committed.is_active());
        assert!(SyncPhase::BackingOff.is_failure());
        assert!(SyncPhase::Failed.is_failure());
        assert!(!SyncPhase::Idle.is_failure());
    }

    #[test]
    fn initial_state_uses_local_accounts() {
        let defaults = DefaultsConfig::new()
            .with_account(PrimaryDefinition::new("local", "9", "role/l"))
            .with_ecs_account(SecondaryDefinition::for_primary("local"));
        let coordinator =
            SyncCoordinator::new(MockSource::new(ProtocolVariant::PaginationLink), defaults);

        assert_eq!(coordinator.phase(), SyncPhase::Idle);
        assert_eq!(coordinator.ec2_accounts()[0].name, "local");
        assert_eq!(coordinator.ecs_accounts()[0].name, "local-ecs");
        assert!(!coordinator.status().initial_sync_done);
    }

    #[test]
    fn successful_sync_commits_and_waits_for_mark_synced() {
        let coordinator = link_coordinator();
        coordinator.source().push_batch(FetchedBatch::new(vec![
            account("a", "2020-08-12T10:00:00Z"),
            account("b", "2020-08-12T12:00:00.5Z"),
            account("c", "not a time"),
        ]));

        assert!(coordinator.synchronize());
        assert_eq!(coordinator.phase(), SyncPhase::Idle);
        assert_eq!(coordinator.last_outcome(), SyncPhase::Committed);
        assert_eq!(coordinator.ec2_accounts().len(), 3);
        assert_eq!(coordinator.ecs_accounts().len(), 3);

        let status = coordinator.status();
        assert_eq!(
            status.last_attempted,
            Some(Watermark::Timestamp("2020-08-12T12:00:00.5Z".into()))
        );
        assert_eq!(status.last_sync, None);
        assert!(status.initial_sync_done);

        // Without mark_synced the next fetch repeats the old cursor.
        coordinator.synchronize();
        coordinator.mark_synced();
        coordinator.synchronize();
        assert_eq!(
            coordinator.source().requests(),
            vec![
                None,
                None,
                Some(Watermark::Timestamp("2020-08-12T12:00:00.5Z".into()))
            ]
        );
    }

    #[test]
    fn empty_batch_is_unchanged() {
        let coordinator = link_coordinator();
        assert!(!coordinator.synchronize());
        assert_eq!(coordinator.stats().cycles_unchanged, 1);
        assert!(!coordinator.status().initial_sync_done);
    }

    #[test]
    fn bookmark_caught_up_advances_both_watermarks() {
        let coordinator = SyncCoordinator::new(
            MockSource::new(ProtocolVariant::Bookmark),
            DefaultsConfig::new(),
        );
        coordinator
            .source()
            .push_batch(FetchedBatch::new(vec![]).with_bookmark(12));

        assert!(!coordinator.synchronize());
        let status = coordinator.status();
        assert_eq!(status.last_sync, Some(Watermark::Bookmark(12)));
        assert_eq!(status.last_attempted, Some(Watermark::Bookmark(12)));
    }

    #[test]
    fn bookmark_batch_commits_response_bookmark() {
        let coordinator = SyncCoordinator::new(
            MockSource::new(ProtocolVariant::Bookmark),
            DefaultsConfig::new(),
        );
        let raw = RawAccount::new("b", "1", "r")
            .with_regions(["us-west-2"])
            .with_deleted_at(0);
        coordinator
            .source()
            .push_batch(FetchedBatch::new(vec![raw]).with_bookmark(40));

        assert!(coordinator.synchronize());
        coordinator.mark_synced();
        assert_eq!(coordinator.status().last_sync, Some(Watermark::Bookmark(40)));
        assert!(coordinator.ec2_accounts()[0].lambda_enabled);
    }

    #[test]
    fn failure_backs_off_without_io() {
        let coordinator = link_coordinator();
        coordinator
            .source()
            .push_error(SyncError::Unreachable("connection refused".into()));

        assert!(!coordinator.synchronize());
        assert_eq!(coordinator.phase(), SyncPhase::Idle);
        assert_eq!(coordinator.last_outcome(), SyncPhase::BackingOff);
        let status = coordinator.status();
        assert_eq!(status.retry_count, 1);
        // 2s base for the first retry, minus under 1s of jitter.
        let remaining = status.backoff_remaining.unwrap();
        assert!(remaining > Duration::from_millis(900));
        assert!(remaining <= Duration::from_secs(2));

        assert!(matches!(
            coordinator.try_synchronize().unwrap(),
            SyncOutcome::BackingOff { .. }
        ));
        assert_eq!(coordinator.source().fetch_count(), 1);
        assert_eq!(coordinator.last_outcome(), SyncPhase::BackingOff);
        assert_eq!(coordinator.status().phase, SyncPhase::Idle);
        assert_eq!(coordinator.stats().cycles_skipped, 1);
        assert_eq!(coordinator.stats().failures, 1);
    }

    #[test]
    fn success_after_failure_resets_backoff() {
        let coordinator = link_coordinator().with_backoff(no_backoff());
        coordinator
            .source()
            .push_error(SyncError::remote(500, b"boom"));
        coordinator
            .source()
            .push_batch(FetchedBatch::new(vec![account("a", "2020-01-01T00:00:00Z")]));

        assert!(!coordinator.synchronize());
        assert_eq!(coordinator.status().retry_count, 1);
        assert!(coordinator.synchronize());
        let status = coordinator.status();
        assert_eq!(status.retry_count, 0);
        assert_eq!(status.backoff_remaining, None);
        assert!(coordinator.stats().last_error.is_none());
    }

    #[test]
    fn link_batch_without_timestamps_is_a_failure() {
        let coordinator = link_coordinator().with_backoff(no_backoff());
        let mut raw = account("a", "x");
        raw.updated_at = None;
        coordinator.source().push_batch(FetchedBatch::new(vec![raw]));

        let err = coordinator.try_synchronize().unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
        assert!(coordinator.ec2_accounts().is_empty());
        assert_eq!(coordinator.status().retry_count, 1);
    }

    #[test]
    fn configuration_error_backs_off_like_any_failure() {
        let defaults = DefaultsConfig::new().with_key_pair_template("{{name}}");
        let mut raw = account("a", "2020-01-01T00:00:00Z");
        raw.environment = Some("{{environment}}!".into());
        raw.default_key_pair = Some("{{environment}}".into());

        let coordinator = SyncCoordinator::new(
            MockSource::new(ProtocolVariant::PaginationLink),
            defaults,
        );
        coordinator.source().push_batch(FetchedBatch::new(vec![raw]));

        assert!(!coordinator.synchronize());
        assert_eq!(coordinator.last_outcome(), SyncPhase::Failed);
        assert_eq!(coordinator.status().retry_count, 1);
        assert!(coordinator.status().backoff_remaining.is_some());
    }

    #[test]
    fn nothing_to_do_does_not_commit() {
        let coordinator = link_coordinator();
        let mut bad = account("bad", "2020-01-01T00:00:00Z");
        bad.regions = None;
        coordinator.source().push_batch(FetchedBatch::new(vec![bad]));

        assert!(!coordinator.synchronize());
        let status = coordinator.status();
        assert_eq!(status.last_attempted, None);
        assert!(!status.initial_sync_done);
        assert_eq!(coordinator.stats().accounts_rejected, 1);
    }

    #[test]
    fn deletions_remove_seeded_accounts() {
        let defaults = DefaultsConfig::new()
            .with_account(PrimaryDefinition::new("old", "9", "role/o"))
            .with_ecs_account(SecondaryDefinition::for_primary("old"))
            .with_account(PrimaryDefinition::new("keep", "8", "role/k"));
        let coordinator =
            SyncCoordinator::new(MockSource::new(ProtocolVariant::PaginationLink), defaults);
        coordinator.source().push_batch(FetchedBatch::new(vec![account(
            "old",
            "2020-01-01T00:00:00Z",
        )
        .with_status(STATUS_SUSPENDED)]));

        let outcome = coordinator.try_synchronize().unwrap();
        let SyncOutcome::Changed(reconciliation) = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(reconciliation.delta.primary.removed, vec!["old"]);
        assert_eq!(
            coordinator
                .ec2_accounts()
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>(),
            vec!["keep"]
        );
        assert!(coordinator.ecs_accounts().is_empty());
        assert_eq!(coordinator.status().deleted, vec!["old"]);
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let coordinator = link_coordinator();
        coordinator
            .source()
            .push_batch(FetchedBatch::new(vec![account("a", "2021-01-01T00:00:00Z")]));
        coordinator
            .source()
            .push_batch(FetchedBatch::new(vec![account("b", "2020-01-01T00:00:00Z")]));

        assert!(coordinator.synchronize());
        assert!(coordinator.synchronize());
        assert_eq!(
            coordinator.status().last_attempted,
            Some(Watermark::Timestamp("2021-01-01T00:00:00Z".into()))
        );
    }

    #[test]
    fn resumes_from_persisted_watermark() {
        let coordinator = SyncCoordinator::new(
            MockSource::new(ProtocolVariant::Bookmark),
            DefaultsConfig::new(),
        )
        .with_watermark(Watermark::Bookmark(77));
        coordinator.synchronize();
        assert_eq!(
            coordinator.source().requests(),
            vec![Some(Watermark::Bookmark(77))]
        );
    }

    #[test]
    fn skip_after_failure_keeps_failed_outcome() {
        let defaults = DefaultsConfig::new().with_key_pair_template("{{name}}");
        let mut raw = account("a", "2020-01-01T00:00:00Z");
        raw.environment = Some("{{environment}}!".into());
        raw.default_key_pair = Some("{{environment}}".into());
        let coordinator = SyncCoordinator::new(
            MockSource::new(ProtocolVariant::PaginationLink),
            defaults,
        );
        coordinator.source().push_batch(FetchedBatch::new(vec![raw]));

        assert!(!coordinator.synchronize());
        assert!(matches!(
            coordinator.try_synchronize().unwrap(),
            SyncOutcome::BackingOff { .. }
        ));
        assert_eq!(coordinator.last_outcome(), SyncPhase::Failed);
    }

    #[test]
    fn bookmark_batch_without_bookmark_is_a_failure() {
        let coordinator = SyncCoordinator::new(
            MockSource::new(ProtocolVariant::Bookmark),
            DefaultsConfig::new(),
        )
        .with_backoff(no_backoff());
        coordinator
            .source()
            .push_batch(FetchedBatch::new(vec![account("a", "2020-01-01T00:00:00Z")]));

        let err = coordinator.try_synchronize().unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
        let status = coordinator.status();
        assert!(!status.initial_sync_done);
        assert_eq!(status.last_attempted, None);
        assert!(coordinator.ec2_accounts().is_empty());
    }

    /// Records whether two fetches were ever in flight at once.
    struct OverlapSource {
        inner: MockSource,
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl AccountSource for OverlapSource {
        fn fetch(&self, watermark: Option<&Watermark>) -> SyncResult<FetchedBatch> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_micros(200));
            let result = self.inner.fetch(watermark);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn variant(&self) -> ProtocolVariant {
            self.inner.variant()
        }
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let inner = MockSource::new(ProtocolVariant::PaginationLink);
        for i in 0..50 {
            inner.push_batch(FetchedBatch::new(vec![account(
                &format!("acct-{i:02}"),
                &format!("2020-01-01T00:00:{i:02}Z"),
            )]));
        }
        let coordinator = SyncCoordinator::new(
            OverlapSource {
                inner,
                in_flight: AtomicUsize::new(0),
                overlapped: AtomicBool::new(false),
            },
            DefaultsConfig::new(),
        );
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let sets = coordinator.accounts();
                    assert_eq!(sets.primary.len(), sets.secondary.len());
                    for secondary in sets.secondary.values() {
                        assert!(sets.primary.contains_key(&secondary.aws_account));
                    }
                }
            });

            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        for _ in 0..10 {
                            if coordinator.synchronize() {
                                coordinator.mark_synced();
                            }
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
            reader.join().unwrap();
        });

        assert!(!coordinator.source().overlapped.load(Ordering::SeqCst));
        assert_eq!(coordinator.source().inner.fetch_count(), 80);
        assert_eq!(coordinator.ec2_accounts().len(), 50);
        assert_eq!(coordinator.ecs_accounts().len(), 50);
        assert_eq!(coordinator.stats().cycles_completed, 50);
        assert_eq!(
            coordinator.status().last_sync,
            Some(Watermark::Timestamp("2020-01-01T00:00:49Z".into()))
        );
    }
}

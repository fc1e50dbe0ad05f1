//! Credential repositories and the on-demand lookup path.
//!
//! A repository is where reconciled definitions end up for the rest of the
//! host application. [`propagate`] makes it match one reconciliation, and
//! [`LazyLoadRepository`] triggers a sync when a lookup misses.

use crate::definition::{secondary_name_for, CredentialDefinition};
use crate::error::SyncResult;
use crate::reconcile::{AccountSets, Reconciliation};
use crate::state::{SyncCoordinator, SyncOutcome};
use crate::transport::AccountSource;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage for credential definitions.
pub trait CredentialRepository: Send + Sync {
    /// Inserts or replaces a definition.
    fn save(&self, definition: CredentialDefinition) -> SyncResult<()>;

    /// Looks up a definition by name.
    fn get(&self, name: &str) -> SyncResult<Option<CredentialDefinition>>;

    /// Every stored definition.
    fn all(&self) -> SyncResult<Vec<CredentialDefinition>>;

    /// Removes a definition; returns true if it existed.
    fn remove(&self, name: &str) -> SyncResult<bool>;
}

/// An in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryCredentialRepository {
    definitions: RwLock<BTreeMap<String, CredentialDefinition>>,
}

impl MemoryCredentialRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored definitions.
    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

impl CredentialRepository for MemoryCredentialRepository {
    fn save(&self, definition: CredentialDefinition) -> SyncResult<()> {
        self.definitions
            .write()
            .insert(definition.name().to_string(), definition);
        Ok(())
    }

    fn get(&self, name: &str) -> SyncResult<Option<CredentialDefinition>> {
        Ok(self.definitions.read().get(name).cloned())
    }

    fn all(&self) -> SyncResult<Vec<CredentialDefinition>> {
        Ok(self.definitions.read().values().cloned().collect())
    }

    fn remove(&self, name: &str) -> SyncResult<bool> {
        Ok(self.definitions.write().remove(name).is_some())
    }
}

/// Counts of what [`propagate`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    /// Definitions saved.
    pub saved: usize,
    /// Definitions removed.
    pub removed: usize,
}

/// Makes `repository` match the sets committed by `reconciliation`.
///
/// The stored definitions are compared against the full sets rather than the
/// delta, so changes left behind by an earlier failed propagation are written
/// on the next commit.
pub fn propagate<R>(repository: &R, reconciliation: &Reconciliation) -> SyncResult<PropagationSummary>
where
    R: CredentialRepository + ?Sized,
{
    mirror(repository, &reconciliation.sets)
}

/// Writes every definition of `sets` that `repository` lacks or holds in a
/// different form, and removes stored definitions absent from `sets`.
///
/// Removals run first so a definition that moved between maps ends up
/// saved.
pub fn mirror<R>(repository: &R, sets: &AccountSets) -> SyncResult<PropagationSummary>
where
    R: CredentialRepository + ?Sized,
{
    let stored: BTreeMap<String, CredentialDefinition> = repository
        .all()?
        .into_iter()
        .map(|definition| (definition.name().to_string(), definition))
        .collect();
    let mut summary = PropagationSummary::default();

    for name in stored.keys() {
        if !sets.primary.contains_key(name) && !sets.secondary.contains_key(name) {
            repository.remove(name)?;
            summary.removed += 1;
        }
    }

    let wanted = sets
        .primary
        .values()
        .cloned()
        .map(CredentialDefinition::from)
        .chain(sets.secondary.values().cloned().map(CredentialDefinition::from));
    for definition in wanted {
        if stored.get(definition.name()) != Some(&definition) {
            repository.save(definition)?;
            summary.saved += 1;
        }
    }

    debug!(saved = summary.saved, removed = summary.removed, "propagated account changes");
    Ok(summary)
}

/// A repository front that syncs on a lookup miss.
///
/// The miss path runs a sync, propagates any committed changes, marks the
/// coordinator synced and retries the lookup once.
pub struct LazyLoadRepository<S: AccountSource, R: CredentialRepository> {
    coordinator: Arc<SyncCoordinator<S>>,
    repository: Arc<R>,
}

impl<S: AccountSource, R: CredentialRepository> LazyLoadRepository<S, R> {
    /// Creates a lazy-loading front.
    pub fn new(coordinator: Arc<SyncCoordinator<S>>, repository: Arc<R>) -> Self {
        Self {
            coordinator,
            repository,
        }
    }

    /// The wrapped repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Seeds the repository with the coordinator's current sets; returns the
    /// number of definitions written.
    pub fn load_initial(&self) -> SyncResult<usize> {
        let summary = mirror(self.repository.as_ref(), &self.coordinator.accounts())?;
        Ok(summary.saved)
    }

    /// Runs a sync and propagates the result; returns true if anything was
    /// committed.
    pub fn refresh(&self) -> SyncResult<bool> {
        let outcome = match self.coordinator.try_synchronize() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "sync for lookup failed");
                return Ok(false);
            }
        };
        match outcome {
            SyncOutcome::Changed(reconciliation) => {
                let summary = propagate(self.repository.as_ref(), &reconciliation)?;
                self.coordinator.mark_synced();
                info!(
                    saved = summary.saved,
                    removed = summary.removed,
                    "refreshed credential repository"
                );
                Ok(true)
            }
            SyncOutcome::Unchanged | SyncOutcome::BackingOff { .. } => Ok(false),
        }
    }

    /// Looks up `name`, syncing once on a miss.
    pub fn get_one(&self, name: &str) -> SyncResult<Option<CredentialDefinition>> {
        if let Some(found) = self.repository.get(name)? {
            return Ok(Some(found));
        }
        debug!(account = name, "lookup missed; syncing");
        if self.refresh()? {
            return self.repository.get(name);
        }
        Ok(None)
    }

    /// Looks up the secondary definition of a primary account.
    pub fn get_secondary_of(&self, primary: &str) -> SyncResult<Option<CredentialDefinition>> {
        self.get_one(&secondary_name_for(primary))
    }

    /// Every stored definition, after a refresh.
    pub fn get_all(&self) -> SyncResult<Vec<CredentialDefinition>> {
        self.refresh()?;
        self.repository.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Conversion;
    use crate::defaults::DefaultsConfig;
    use crate::definition::{PrimaryDefinition, SecondaryDefinition};
    use crate::reconcile::{reconcile, AccountSets};
    use crate::transport::{FetchedBatch, MockSource};
    use acctreg_protocol::{ProtocolVariant, RawAccount, Watermark};
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` saves.
    #[derive(Default)]
    struct FlakyRepository {
        inner: MemoryCredentialRepository,
        failures: AtomicUsize,
    }

    impl CredentialRepository for FlakyRepository {
        fn save(&self, definition: CredentialDefinition) -> SyncResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(SyncError::Unreachable("credential store offline".into()));
            }
            self.inner.save(definition)
        }

        fn get(&self, name: &str) -> SyncResult<Option<CredentialDefinition>> {
            self.inner.get(name)
        }

        fn all(&self) -> SyncResult<Vec<CredentialDefinition>> {
            self.inner.all()
        }

        fn remove(&self, name: &str) -> SyncResult<bool> {
            self.inner.remove(name)
        }
    }

    fn raw(name: &str) -> RawAccount {
        RawAccount::new(name, "1", "r")
            .with_regions(["us-west-2"])
            .with_providers(["ecs"])
            .with_updated_at("2020-01-01T00:00:00Z")
    }

    #[test]
    fn memory_repository_basics() {
        let repo = MemoryCredentialRepository::new();
        repo.save(PrimaryDefinition::new("a", "1", "role/r").into())
            .unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("a").unwrap().unwrap().name(), "a");
        assert!(repo.remove("a").unwrap());
        assert!(!repo.remove("a").unwrap());
        assert!(repo.is_empty());
    }

    #[test]
    fn propagate_applies_delta() {
        let repo = MemoryCredentialRepository::new();
        let current = AccountSets::from_definitions(
            [PrimaryDefinition::new("old", "1", "role/r")],
            [SecondaryDefinition::for_primary("old")],
        );
        for definition in [
            CredentialDefinition::from(PrimaryDefinition::new("old", "1", "role/r")),
            SecondaryDefinition::for_primary("old").into(),
        ] {
            repo.save(definition).unwrap();
        }

        let mut conversion = Conversion::default();
        conversion
            .primary
            .insert("new".into(), PrimaryDefinition::new("new", "2", "role/r"));
        conversion.deleted.push("old".into());
        conversion.disable_secondary.push("new".into());

        let summary = propagate(&repo, &reconcile(&current, &conversion)).unwrap();
        assert_eq!(summary, PropagationSummary { saved: 1, removed: 2 });
        assert!(repo.get("old").unwrap().is_none());
        assert!(repo.get("old-ecs").unwrap().is_none());
        assert!(repo.get("new").unwrap().is_some());
    }

    #[test]
    fn lookup_miss_triggers_one_sync() {
        let source = MockSource::new(ProtocolVariant::PaginationLink);
        source.push_batch(FetchedBatch::new(vec![raw("remote")]));
        let coordinator = Arc::new(SyncCoordinator::new(source, DefaultsConfig::new()));
        let lazy = LazyLoadRepository::new(
            coordinator.clone(),
            Arc::new(MemoryCredentialRepository::new()),
        );

        let found = lazy.get_one("remote").unwrap().unwrap();
        assert!(found.as_primary().is_some());
        assert!(lazy.get_secondary_of("remote").unwrap().is_some());
        assert_eq!(coordinator.source().fetch_count(), 1);
        assert_eq!(
            coordinator.status().last_sync,
            Some(Watermark::Timestamp("2020-01-01T00:00:00Z".into()))
        );

        // Still missing after a sync with nothing new.
        assert!(lazy.get_one("unknown").unwrap().is_none());
        assert_eq!(coordinator.source().fetch_count(), 2);
    }

    #[test]
    fn failed_sync_reports_a_miss() {
        let source = MockSource::new(ProtocolVariant::PaginationLink);
        source.push_error(crate::error::SyncError::Unreachable("down".into()));
        let coordinator = Arc::new(SyncCoordinator::new(source, DefaultsConfig::new()));
        let lazy = LazyLoadRepository::new(coordinator, Arc::new(MemoryCredentialRepository::new()));
        assert!(lazy.get_one("x").unwrap().is_none());
    }

    #[test]
    fn initial_load_copies_seeded_accounts() {
        let defaults = DefaultsConfig::new()
            .with_account(PrimaryDefinition::new("seed", "1", "role/s"))
            .with_ecs_account(SecondaryDefinition::for_primary("seed"));
        let coordinator = Arc::new(SyncCoordinator::new(
            MockSource::new(ProtocolVariant::PaginationLink),
            defaults,
        ));
        let lazy = LazyLoadRepository::new(coordinator, Arc::new(MemoryCredentialRepository::new()));
        assert_eq!(lazy.load_initial().unwrap(), 2);
        assert_eq!(lazy.repository().len(), 2);
        assert_eq!(lazy.get_all().unwrap().len(), 2);
    }

    #[test]
    fn failed_propagation_is_written_by_the_next_commit() {
        let source = MockSource::new(ProtocolVariant::PaginationLink);
        // The watermark did not advance, so the remote sends the batch again.
        source.push_batch(FetchedBatch::new(vec![raw("remote")]));
        source.push_batch(FetchedBatch::new(vec![raw("remote")]));
        let coordinator = Arc::new(SyncCoordinator::new(source, DefaultsConfig::new()));
        let repository = Arc::new(FlakyRepository {
            failures: AtomicUsize::new(1),
            ..FlakyRepository::default()
        });
        let lazy = LazyLoadRepository::new(coordinator.clone(), repository.clone());

        assert!(lazy.refresh().is_err());
        assert_eq!(coordinator.status().last_sync, None);
        assert_eq!(coordinator.ec2_accounts().len(), 1);

        assert!(lazy.refresh().unwrap());
        assert!(repository.get("remote").unwrap().is_some());
        assert!(repository.get("remote-ecs").unwrap().is_some());
        assert_eq!(
            coordinator.status().last_sync,
            Some(Watermark::Timestamp("2020-01-01T00:00:00Z".into()))
        );
    }

    #[test]
    fn mirror_skips_unchanged_definitions() {
        let repo = MemoryCredentialRepository::new();
        let sets = AccountSets::from_definitions(
            [PrimaryDefinition::new("a", "1", "role/r")],
            [SecondaryDefinition::for_primary("a")],
        );
        repo.save(PrimaryDefinition::new("stale", "2", "role/r").into())
            .unwrap();

        assert_eq!(
            mirror(&repo, &sets).unwrap(),
            PropagationSummary { saved: 2, removed: 1 }
        );
        assert_eq!(mirror(&repo, &sets).unwrap(), PropagationSummary::default());
        assert_eq!(repo.len(), 2);
    }
}

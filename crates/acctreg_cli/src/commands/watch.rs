//! Watch command implementation.

use crate::settings::Settings;
use acctreg_engine::{
    mirror, AccountSource, MemoryCredentialRepository, Poller, ReqwestClient,
    RemoteAccountClient, SyncCoordinator, SyncResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A repository holding the coordinator's current sets.
fn local_repository<S: AccountSource>(
    coordinator: &SyncCoordinator<S>,
) -> SyncResult<Arc<MemoryCredentialRepository>> {
    let repository = Arc::new(MemoryCredentialRepository::new());
    let seeded = mirror(repository.as_ref(), &coordinator.accounts())?;
    info!(definitions = seeded.saved, "loaded local accounts");
    Ok(repository)
}

/// Runs the watch command.
pub fn run(
    settings: &Settings,
    interval_secs: Option<u64>,
    max_cycles: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.sync_config();
    let interval = interval_secs.map_or(config.sync_interval, Duration::from_secs);
    let backoff = config.backoff.clone();
    let http = ReqwestClient::from_config(&config)?;
    let client = RemoteAccountClient::new(config, http);
    let coordinator =
        Arc::new(SyncCoordinator::new(client, settings.defaults()?).with_backoff(backoff));
    let repository = local_repository(&coordinator)?;

    let mut poller = Poller::new(Arc::clone(&coordinator), interval)
        .with_repository(Arc::clone(&repository) as _);
    if let Some(cycles) = max_cycles {
        poller = poller.with_max_cycles(cycles);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(poller.run_until(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; finishing the current cycle");
        }
    }));

    println!("Watch");
    println!("=====");
    println!("Cycles:         {}", report.cycles);
    println!("Changes:        {}", report.changes);
    println!("Failures:       {}", report.failures);
    println!("Definitions:    {}", repository.len());
    if let Some(mark) = coordinator.status().last_sync {
        println!("Watermark:      {mark}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acctreg_engine::protocol::ProtocolVariant;
    use acctreg_engine::{
        CredentialRepository, DefaultsConfig, MockSource, PrimaryDefinition, SecondaryDefinition,
    };

    #[test]
    fn repository_starts_with_local_accounts() {
        let defaults = DefaultsConfig::new()
            .with_account(PrimaryDefinition::new("local", "9", "role/l"))
            .with_ecs_account(SecondaryDefinition::for_primary("local"));
        let coordinator =
            SyncCoordinator::new(MockSource::new(ProtocolVariant::PaginationLink), defaults);

        let repository = local_repository(&coordinator).unwrap();
        assert_eq!(repository.len(), 2);
        assert!(repository.get("local-ecs").unwrap().is_some());
    }
}

//! Sync command implementation.

use crate::settings::Settings;
use acctreg_engine::{
    PrimaryDefinition, ReqwestClient, RemoteAccountClient, SecondaryDefinition, SyncCoordinator,
    SyncOutcome, SyncStatus,
};
use serde::Serialize;

/// One-shot sync result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Whether new sets were committed.
    pub changed: bool,
    /// Primary names added or updated.
    pub updated: Vec<String>,
    /// Primary names removed.
    pub removed: Vec<String>,
    /// Coordinator bookkeeping after the cycle.
    pub status: SyncStatus,
    /// Primary definitions in effect.
    pub accounts: Vec<PrimaryDefinition>,
    /// Secondary definitions in effect.
    pub ecs_accounts: Vec<SecondaryDefinition>,
}

/// Runs the sync command.
pub fn run(settings: &Settings, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.sync_config();
    let http = ReqwestClient::from_config(&config)?;
    let client = RemoteAccountClient::new(config, http);
    let coordinator = SyncCoordinator::new(client, settings.defaults()?);

    let mut report = SyncReport {
        changed: false,
        updated: Vec::new(),
        removed: Vec::new(),
        status: coordinator.status(),
        accounts: Vec::new(),
        ecs_accounts: Vec::new(),
    };

    match coordinator.try_synchronize()? {
        SyncOutcome::Changed(reconciliation) => {
            let delta = reconciliation.delta.primary;
            report.changed = true;
            report.updated = delta.added.into_iter().chain(delta.updated).collect();
            report.removed = delta.removed;
            // Output is the only propagation target here.
            coordinator.mark_synced();
        }
        SyncOutcome::Unchanged | SyncOutcome::BackingOff { .. } => {}
    }
    report.status = coordinator.status();
    report.accounts = coordinator.ec2_accounts();
    report.ecs_accounts = coordinator.ecs_accounts();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

fn print_text_output(report: &SyncReport) {
    println!("Sync");
    println!("====");
    println!("Changed:        {}", report.changed);
    if let Some(mark) = &report.status.last_sync {
        println!("Watermark:      {mark}");
    }
    println!("Accounts:       {}", report.accounts.len());
    println!("ECS accounts:   {}", report.ecs_accounts.len());
    if !report.updated.is_empty() {
        println!("Updated:        {}", report.updated.join(", "));
    }
    if !report.removed.is_empty() {
        println!("Removed:        {}", report.removed.join(", "));
    }
    println!();
    for account in &report.accounts {
        println!(
            "  {:<24} {:<14} {:<28} lambda={} regions={}",
            account.name,
            account.account_id,
            account.assume_role,
            account.lambda_enabled,
            account.region_names().join(",")
        );
    }
}

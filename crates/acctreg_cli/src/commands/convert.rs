//! Convert command implementation.

use crate::settings::Settings;
use acctreg_engine::protocol::{Page, ProtocolVariant, RawAccount};
use acctreg_engine::{
    reconcile, AccountConverter, AccountSets, DefaultsConfig, PrimaryDefinition,
    SecondaryDefinition,
};
use serde::Serialize;
use std::path::Path;

/// Offline conversion result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResult {
    /// Records read.
    pub input_count: usize,
    /// Primary definitions after merging with the local seed accounts.
    pub accounts: Vec<PrimaryDefinition>,
    /// Secondary definitions after merging.
    pub ecs_accounts: Vec<SecondaryDefinition>,
    /// Names marked deleted.
    pub deleted: Vec<String>,
    /// Records skipped by validation.
    pub rejected: Vec<String>,
}

/// Runs the convert command.
pub fn run(settings: &Settings, input: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(input)
        .map_err(|e| format!("cannot read {}: {e}", input.display()))?;
    let result = convert(&bytes, settings.variant(), settings.defaults()?)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Converts a page body, or a plain array of accounts, in `variant`.
pub fn convert(
    bytes: &[u8],
    variant: ProtocolVariant,
    defaults: DefaultsConfig,
) -> Result<ConvertResult, Box<dyn std::error::Error>> {
    let accounts = match serde_json::from_slice::<Vec<RawAccount>>(bytes) {
        Ok(accounts) => accounts,
        Err(_) => Page::decode(variant, bytes)?.accounts,
    };

    let seed = AccountSets::from_definitions(
        defaults.accounts.iter().cloned(),
        defaults.ecs_accounts.iter().cloned(),
    );
    let conversion = AccountConverter::new(variant, defaults).convert(&accounts)?;
    let sets = reconcile(&seed, &conversion).sets;

    Ok(ConvertResult {
        input_count: accounts.len(),
        accounts: sets.primary.into_values().collect(),
        ecs_accounts: sets.secondary.into_values().collect(),
        deleted: conversion.deleted,
        rejected: conversion.rejected,
    })
}

fn print_text_output(result: &ConvertResult) {
    println!("Conversion");
    println!("==========");
    println!("Input records:  {}", result.input_count);
    println!("Accounts:       {}", result.accounts.len());
    println!("ECS accounts:   {}", result.ecs_accounts.len());
    println!("Deleted:        {}", result.deleted.len());
    println!("Rejected:       {}", result.rejected.len());
    println!();
    for account in &result.accounts {
        println!("  {} ({}) as {}", account.name, account.account_id, account.assume_role);
    }
    for ecs in &result.ecs_accounts {
        println!("  {} -> {}", ecs.name, ecs.aws_account);
    }
    if !result.rejected.is_empty() {
        println!();
        println!("Rejected records:");
        for name in &result.rejected {
            println!("  {name}");
        }
    }
}

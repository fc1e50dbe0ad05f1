//! Property-based test generators using proptest.
//!
//! The strategies produce raw accounts the converter accepts unless stated
//! otherwise.

use acctreg_protocol::{RawAccount, KNOWN_AWS_REGIONS, STATUS_ACTIVE, STATUS_SUSPENDED};
use proptest::prelude::*;

/// Strategy for account names.
pub fn account_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for 12-digit account ids.
pub fn account_id_strategy() -> impl Strategy<Value = String> {
    (0u64..1_000_000_000_000).prop_map(|id| format!("{id:012}"))
}

/// Strategy for a known region name.
pub fn region_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(KNOWN_AWS_REGIONS).prop_map(str::to_string)
}

/// Strategy for a non-empty list of known regions.
pub fn regions_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(region_strategy(), 1..4)
}

/// Strategy for provider tag lists, including unknown tags.
pub fn providers_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(vec!["ec2", "ecs", "lambda", "gpu"]).prop_map(str::to_string),
        1..4,
    )
}

/// Strategy for a valid, active account.
pub fn raw_account_strategy() -> impl Strategy<Value = RawAccount> {
    (
        account_name_strategy(),
        account_id_strategy(),
        regions_strategy(),
        providers_strategy(),
    )
        .prop_map(|(name, id, regions, providers)| {
            RawAccount::new(name, id, "deploy")
                .with_regions(regions)
                .with_providers(providers)
        })
}

/// Strategy for a valid account that is active or suspended.
pub fn account_with_status_strategy() -> impl Strategy<Value = RawAccount> {
    (raw_account_strategy(), any::<bool>()).prop_map(|(account, suspended)| {
        let status = if suspended { STATUS_SUSPENDED } else { STATUS_ACTIVE };
        account.with_status(status)
    })
}

/// Strategy for a batch of accounts; names may repeat.
pub fn account_batch_strategy(max: usize) -> impl Strategy<Value = Vec<RawAccount>> {
    prop::collection::vec(account_with_status_strategy(), 0..max)
}

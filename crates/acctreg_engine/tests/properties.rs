//! Property tests for conversion and reconciliation.

use acctreg_engine::protocol::ProtocolVariant;
use acctreg_engine::{reconcile, AccountConverter, AccountSets, DefaultsConfig, ROLE_PREFIX};
use acctreg_testkit::generators::{account_batch_strategy, raw_account_strategy};
use proptest::prelude::*;

fn converter(variant: ProtocolVariant) -> AccountConverter {
    AccountConverter::new(variant, DefaultsConfig::new())
}

fn variant_strategy() -> impl Strategy<Value = ProtocolVariant> {
    prop_oneof![
        Just(ProtocolVariant::PaginationLink),
        Just(ProtocolVariant::Bookmark)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_secondary_has_its_primary(
        variant in variant_strategy(),
        batch in account_batch_strategy(12),
    ) {
        let conversion = converter(variant).convert(&batch).unwrap();
        let result = reconcile(&AccountSets::new(), &conversion);
        for secondary in result.sets.secondary.values() {
            prop_assert!(result.sets.primary.contains_key(&secondary.aws_account));
        }
    }

    #[test]
    fn deleted_names_are_gone(
        variant in variant_strategy(),
        first in account_batch_strategy(8),
        second in account_batch_strategy(8),
    ) {
        let converter = converter(variant);
        let before = reconcile(&AccountSets::new(), &converter.convert(&first).unwrap()).sets;
        let conversion = converter.convert(&second).unwrap();
        let after = reconcile(&before, &conversion).sets;
        for name in &conversion.deleted {
            prop_assert!(!after.primary.contains_key(name));
            prop_assert!(!after.secondary.values().any(|s| &s.aws_account == name));
        }
    }

    #[test]
    fn reconcile_twice_changes_nothing(
        variant in variant_strategy(),
        first in account_batch_strategy(8),
        second in account_batch_strategy(8),
    ) {
        let converter = converter(variant);
        let base = reconcile(&AccountSets::new(), &converter.convert(&first).unwrap()).sets;
        let conversion = converter.convert(&second).unwrap();
        let once = reconcile(&base, &conversion);
        let twice = reconcile(&once.sets, &conversion);
        prop_assert_eq!(&once.sets, &twice.sets);
        prop_assert!(twice.delta.is_empty());
    }

    #[test]
    fn valid_accounts_convert_to_prefixed_roles(account in raw_account_strategy()) {
        let conversion = converter(ProtocolVariant::PaginationLink)
            .convert(std::slice::from_ref(&account))
            .unwrap();
        let name = account.name().unwrap();
        let primary = &conversion.primary[name];
        prop_assert!(primary.assume_role.starts_with(ROLE_PREFIX));
        prop_assert_eq!(primary.account_id.as_str(), account.account_id.as_deref().unwrap());
        prop_assert!(conversion.rejected.is_empty());
    }
}

//! Sample accounts and pre-seeded catalogs.

use acctreg_mock_server::{AccountCatalog, AccountServer, ServerConfig, DEFAULT_CATALOG_URL};
use acctreg_protocol::{ProtocolVariant, RawAccount};
use std::sync::Arc;

/// Access key the signed fixtures expect.
pub const TEST_ACCESS_KEY: &str = "AKIDTESTKIT";

/// Secret matching [`TEST_ACCESS_KEY`].
pub const TEST_SECRET_KEY: &str = "testkit-secret";

/// Scope region of the signed fixtures.
pub const TEST_REGION: &str = "us-west-2";

/// Scope service of the signed fixtures.
pub const TEST_SERVICE: &str = "execute-api";

/// The canonical example account: ECS and lambda enabled in one region.
pub fn sample_account() -> RawAccount {
    RawAccount::new("acct1", "1", "role1")
        .with_regions(["us-west-2"])
        .with_providers(["ecs", "lambda", "ec2"])
}

/// A valid active account named `name` with the `ec2` and `ecs` tags.
pub fn active_account(name: &str) -> RawAccount {
    RawAccount::new(name, format!("{:012}", name.len()), "deploy")
        .with_regions(["us-east-1", "us-west-2"])
        .with_providers(["ec2", "ecs"])
}

/// `count` active accounts named `account-0`, `account-1`, and so on.
pub fn numbered_accounts(count: usize) -> Vec<RawAccount> {
    (0..count)
        .map(|i| active_account(&format!("account-{i}")))
        .collect()
}

/// A catalog holding `count` numbered accounts.
pub fn seeded_catalog(count: usize) -> Arc<AccountCatalog> {
    Arc::new(AccountCatalog::with_accounts(numbered_accounts(count)))
}

/// An unsigned server at [`DEFAULT_CATALOG_URL`] serving `variant`, holding
/// `count` numbered accounts, one per page.
pub fn seeded_server(variant: ProtocolVariant, count: usize) -> AccountServer {
    let config = ServerConfig::new(DEFAULT_CATALOG_URL, variant).with_page_size(1);
    AccountServer::with_catalog(config, seeded_catalog(count))
}

/// Like [`seeded_server`] but requiring signatures made with the test keys.
pub fn signed_server(variant: ProtocolVariant, count: usize) -> AccountServer {
    let config = ServerConfig::new(DEFAULT_CATALOG_URL, variant)
        .with_page_size(1)
        .with_signing(TEST_ACCESS_KEY, TEST_SECRET_KEY, TEST_REGION, TEST_SERVICE);
    AccountServer::with_catalog(config, seeded_catalog(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn numbered_accounts_have_unique_names() {
        let accounts = numbered_accounts(3);
        let names: Vec<_> = accounts.iter().filter_map(|a| a.name()).collect();
        assert_eq!(names, vec!["account-0", "account-1", "account-2"]);
    }

    #[test]
    fn seeded_server_pages_one_by_one() {
        let server = seeded_server(ProtocolVariant::PaginationLink, 2);
        assert_eq!(server.catalog().len(), 2);
        let (status, body) = server.respond(DEFAULT_CATALOG_URL, &BTreeMap::new());
        assert_eq!(status, 200);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["Accounts"].as_array().unwrap().len(), 1);
        assert!(json["Pagination"]["NextUrl"]
            .as_str()
            .unwrap()
            .ends_with("page=1"));
    }

    #[test]
    fn signed_server_refuses_unsigned_requests() {
        let server = signed_server(ProtocolVariant::Bookmark, 1);
        let (status, _) = server.respond(DEFAULT_CATALOG_URL, &BTreeMap::new());
        assert_eq!(status, 403);
    }
}

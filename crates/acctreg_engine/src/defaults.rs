//! Deployment-wide defaults applied to converted accounts.

use crate::definition::{LifecycleHook, PrimaryDefinition, SecondaryDefinition};
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Defaults and locally configured accounts.
///
/// Template fields may reference `{{name}}`, `{{accountId}}`,
/// `{{environment}}` and `{{accountType}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultsConfig {
    /// Template for the default key pair.
    pub default_key_pair_template: Option<String>,
    /// Template for the Edda endpoint.
    pub default_edda_template: Option<String>,
    /// Template for the Front50 endpoint.
    pub default_front50_template: Option<String>,
    /// Template for the discovery endpoint.
    pub default_discovery_template: Option<String>,
    /// Template for the role to assume.
    pub default_assume_role: Option<String>,
    /// Template for the session name.
    pub default_session_name: Option<String>,
    /// Template for the bastion host.
    pub default_bastion_host_template: Option<String>,
    /// Template for lifecycle hook role ARNs.
    #[serde(rename = "defaultLifecycleHookRoleARNTemplate")]
    pub default_lifecycle_hook_role_arn_template: Option<String>,
    /// Template for lifecycle hook notification targets.
    #[serde(rename = "defaultLifecycleHookNotificationTargetARNTemplate")]
    pub default_lifecycle_hook_notification_target_arn_template: Option<String>,
    /// Security groups for accounts that name none.
    pub default_security_groups: Option<Vec<String>>,
    /// Lifecycle hooks for accounts that name none.
    pub default_lifecycle_hooks: Option<Vec<LifecycleHook>>,
    /// Regions accepted on top of the built-in catalog.
    pub extra_regions: Vec<String>,
    /// Locally configured primary accounts, used until the first sync.
    pub accounts: Vec<PrimaryDefinition>,
    /// Locally configured secondary accounts, used until the first sync.
    pub ecs_accounts: Vec<SecondaryDefinition>,
}

impl DefaultsConfig {
    /// Creates empty defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults from a JSON file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SyncError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })
    }

    /// Sets the key pair template.
    pub fn with_key_pair_template(mut self, template: impl Into<String>) -> Self {
        self.default_key_pair_template = Some(template.into());
        self
    }

    /// Sets the Edda template.
    pub fn with_edda_template(mut self, template: impl Into<String>) -> Self {
        self.default_edda_template = Some(template.into());
        self
    }

    /// Sets the default security groups.
    pub fn with_security_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_security_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the default lifecycle hooks.
    pub fn with_lifecycle_hooks(mut self, hooks: Vec<LifecycleHook>) -> Self {
        self.default_lifecycle_hooks = Some(hooks);
        self
    }

    /// Adds a locally configured primary account.
    pub fn with_account(mut self, account: PrimaryDefinition) -> Self {
        self.accounts.push(account);
        self
    }

    /// Adds a locally configured secondary account.
    pub fn with_ecs_account(mut self, account: SecondaryDefinition) -> Self {
        self.ecs_accounts.push(account);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_builder() {
        let defaults = DefaultsConfig::new()
            .with_key_pair_template("{{name}}-keypair")
            .with_security_groups(["sg-1", "sg-2"])
            .with_account(PrimaryDefinition::new("local", "1", "role/r"));

        assert_eq!(
            defaults.default_key_pair_template.as_deref(),
            Some("{{name}}-keypair")
        );
        assert_eq!(defaults.default_security_groups.as_ref().unwrap().len(), 2);
        assert_eq!(defaults.accounts.len(), 1);
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "defaultKeyPairTemplate": "{{{{name}}}}-kp",
                "defaultLifecycleHookRoleARNTemplate": "arn:aws:iam::{{{{accountId}}}}:role/hooks",
                "extraRegions": ["local-test-1"],
                "accounts": [{{"name": "seed", "accountId": "1", "assumeRole": "role/seed"}}],
                "ecsAccounts": [{{"name": "seed-ecs", "awsAccount": "seed"}}]
            }}"#
        )
        .unwrap();

        let defaults = DefaultsConfig::load(file.path()).unwrap();
        assert_eq!(defaults.default_key_pair_template.as_deref(), Some("{{name}}-kp"));
        assert_eq!(
            defaults.default_lifecycle_hook_role_arn_template.as_deref(),
            Some("arn:aws:iam::{{accountId}}:role/hooks")
        );
        assert_eq!(defaults.extra_regions, vec!["local-test-1"]);
        assert_eq!(defaults.accounts[0].name, "seed");
        assert_eq!(defaults.ecs_accounts[0].aws_account, "seed");
    }

    #[test]
    fn load_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = DefaultsConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}

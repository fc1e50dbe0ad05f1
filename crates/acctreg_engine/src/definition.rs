//! Typed credential definitions produced by conversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix appended to a primary name to form its secondary definition.
pub const SECONDARY_SUFFIX: &str = "-ecs";

/// Anything bound to a single named account.
pub trait AccountScoped {
    /// The account name.
    fn account_name(&self) -> &str;
}

/// A region entry of a primary definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Lower-case region name.
    pub name: String,
}

impl Region {
    /// Creates a region entry.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An auto-scaling lifecycle hook attached to every group of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleHook {
    /// Role the hook publishes as.
    #[serde(default, rename = "roleARN", skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// Notification target.
    #[serde(
        default,
        rename = "notificationTargetARN",
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_target_arn: Option<String>,
    /// Lifecycle transition the hook fires on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_transition: Option<String>,
    /// Heartbeat timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<u32>,
    /// `CONTINUE` or `ABANDON`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_result: Option<String>,
}

/// A primary (EC2-style) account definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryDefinition {
    /// Unique account name.
    pub name: String,
    /// Cloud account id.
    pub account_id: String,
    /// Role to assume; always starts with `role/` once converted.
    pub assume_role: String,
    /// Regions, in remote order.
    #[serde(default)]
    pub regions: Vec<Region>,
    /// Whether serverless functions are enabled.
    #[serde(default)]
    pub lambda_enabled: bool,
    /// Whether the account is enabled.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Environment name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Account type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    /// Default key pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_pair: Option<String>,
    /// Default security groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_security_groups: Option<Vec<String>>,
    /// Permission groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, Vec<String>>>,
    /// Edda endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edda: Option<String>,
    /// Front50 endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front50: Option<String>,
    /// Discovery endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<String>,
    /// Session name used when assuming the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    /// Bastion host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion_host: Option<String>,
    /// Lifecycle hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_hooks: Option<Vec<LifecycleHook>>,
}

fn enabled_by_default() -> bool {
    true
}

impl PrimaryDefinition {
    /// Creates an enabled definition with identity fields only.
    pub fn new(
        name: impl Into<String>,
        account_id: impl Into<String>,
        assume_role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            account_id: account_id.into(),
            assume_role: assume_role.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Name of the secondary definition derived from this account.
    pub fn secondary_name(&self) -> String {
        secondary_name_for(&self.name)
    }

    /// Region names.
    pub fn region_names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }
}

/// A secondary (ECS-style) definition that rides on a primary account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryDefinition {
    /// `<primary>-ecs`.
    pub name: String,
    /// Name of the owning primary account.
    pub aws_account: String,
}

impl SecondaryDefinition {
    /// Derives the secondary definition for a primary account name.
    pub fn for_primary(primary: &str) -> Self {
        Self {
            name: secondary_name_for(primary),
            aws_account: primary.to_string(),
        }
    }
}

/// Returns `<primary>-ecs`.
pub fn secondary_name_for(primary: &str) -> String {
    format!("{primary}{SECONDARY_SUFFIX}")
}

/// Either kind of definition, as stored in a credential repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CredentialDefinition {
    /// EC2-style account.
    Primary(PrimaryDefinition),
    /// ECS-style account.
    Secondary(SecondaryDefinition),
}

impl CredentialDefinition {
    /// The definition name.
    pub fn name(&self) -> &str {
        match self {
            CredentialDefinition::Primary(p) => &p.name,
            CredentialDefinition::Secondary(s) => &s.name,
        }
    }

    /// Returns the primary definition, if this is one.
    pub fn as_primary(&self) -> Option<&PrimaryDefinition> {
        match self {
            CredentialDefinition::Primary(p) => Some(p),
            CredentialDefinition::Secondary(_) => None,
        }
    }

    /// Returns the secondary definition, if this is one.
    pub fn as_secondary(&self) -> Option<&SecondaryDefinition> {
        match self {
            CredentialDefinition::Secondary(s) => Some(s),
            CredentialDefinition::Primary(_) => None,
        }
    }
}

impl AccountScoped for PrimaryDefinition {
    fn account_name(&self) -> &str {
        &self.name
    }
}

impl AccountScoped for SecondaryDefinition {
    fn account_name(&self) -> &str {
        &self.name
    }
}

impl AccountScoped for CredentialDefinition {
    fn account_name(&self) -> &str {
        self.name()
    }
}

impl From<PrimaryDefinition> for CredentialDefinition {
    fn from(definition: PrimaryDefinition) -> Self {
        CredentialDefinition::Primary(definition)
    }
}

impl From<SecondaryDefinition> for CredentialDefinition {
    fn from(definition: SecondaryDefinition) -> Self {
        CredentialDefinition::Secondary(definition)
    }
}

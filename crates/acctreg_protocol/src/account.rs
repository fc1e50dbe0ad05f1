//! Raw account records as served by the remote catalog.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Status value for an account that is live.
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Status value for an account that has been suspended (treated as deleted).
pub const STATUS_SUSPENDED: &str = "SUSPENDED";

/// A raw account record.
///
/// Every field is optional on the wire; validation belongs to the converter,
/// which rejects records that lack required identity fields. Both the
/// camelCase spelling and the older PascalCase / `Spinnaker*` spellings are
/// accepted when decoding. Encoding always uses camelCase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    /// Unique account name.
    #[serde(
        default,
        alias = "Name",
        alias = "SpinnakerAccountName",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    /// Cloud account identifier.
    #[serde(default, alias = "AccountId", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Role to assume, with or without the `role/` prefix.
    #[serde(
        default,
        alias = "AssumeRole",
        alias = "SpinnakerAssumeRole",
        skip_serializing_if = "Option::is_none"
    )]
    pub assume_role: Option<String>,

    /// Regions the account operates in.
    #[serde(default, alias = "Regions", skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,

    /// Capability tags (`ec2`, `ecs`, `lambda`).
    #[serde(
        default,
        alias = "Providers",
        alias = "SpinnakerProviders",
        skip_serializing_if = "Option::is_none"
    )]
    pub providers: Option<Vec<String>>,

    /// Whether the account is enabled.
    #[serde(default, alias = "Enabled", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// `ACTIVE` or `SUSPENDED`.
    #[serde(
        default,
        alias = "Status",
        alias = "SpinnakerStatus",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,

    /// Last modification time, used as the incremental cursor.
    #[serde(
        default,
        alias = "UpdatedAt",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,

    /// Creation time.
    #[serde(
        default,
        alias = "CreatedAt",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,

    /// Deletion marker; non-zero means the account was deleted.
    #[serde(default, alias = "DeletedAt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    /// Permission groups keyed by access level.
    #[serde(default, alias = "Permissions", skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, Vec<String>>>,

    /// Environment name.
    #[serde(default, alias = "Environment", skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Account type.
    #[serde(
        default,
        rename = "type",
        alias = "Type",
        alias = "accountType",
        skip_serializing_if = "Option::is_none"
    )]
    pub account_type: Option<String>,

    /// Default key pair override.
    #[serde(default, alias = "DefaultKeyPair", skip_serializing_if = "Option::is_none")]
    pub default_key_pair: Option<String>,

    /// Default security groups override.
    #[serde(
        default,
        alias = "DefaultSecurityGroups",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_security_groups: Option<Vec<String>>,
}

impl RawAccount {
    /// Creates an active account with the three identity fields set.
    pub fn new(
        name: impl Into<String>,
        account_id: impl Into<String>,
        assume_role: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            account_id: Some(account_id.into()),
            assume_role: Some(assume_role.into()),
            status: Some(STATUS_ACTIVE.to_string()),
            ..Self::default()
        }
    }

    /// Sets the regions.
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the provider tags.
    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the modification timestamp.
    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.updated_at = Some(updated_at.into());
        self
    }

    /// Sets the deletion marker.
    pub fn with_deleted_at(mut self, deleted_at: i64) -> Self {
        self.deleted_at = Some(deleted_at);
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Returns the trimmed name, if present and non-blank.
    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    /// Returns true if the record carries a non-zero deletion marker.
    pub fn is_deleted_marker(&self) -> bool {
        self.deleted_at.is_some_and(|at| at != 0)
    }

    /// Returns true if the status is `SUSPENDED` (case-insensitive).
    pub fn is_suspended(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(STATUS_SUSPENDED))
    }

    /// Returns true if no provider tags are present.
    pub fn has_no_providers(&self) -> bool {
        self.providers
            .as_ref()
            .map_or(true, |p| p.iter().all(|tag| tag.trim().is_empty()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts either a JSON string or a JSON number for timestamp fields.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Text(s)) => Some(s),
        Some(Lenient::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

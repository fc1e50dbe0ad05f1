//! Conversion of raw remote accounts into credential definitions.

use crate::defaults::DefaultsConfig;
use crate::definition::{PrimaryDefinition, Region, SecondaryDefinition};
use crate::error::{SyncError, SyncResult};
use crate::template::TemplateContext;
use acctreg_protocol::{ProtocolVariant, RawAccount, RegionCatalog};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, trace, warn};

/// Prefix every converted role carries.
pub const ROLE_PREFIX: &str = "role/";

/// Label used for rejected records that have no name.
const UNNAMED: &str = "<unnamed>";

/// Output of one conversion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    /// Primary definitions by name.
    pub primary: BTreeMap<String, PrimaryDefinition>,
    /// Secondary definitions by name.
    pub secondary: BTreeMap<String, SecondaryDefinition>,
    /// Names marked deleted, in input order.
    pub deleted: Vec<String>,
    /// Primaries that carry no secondary in this batch.
    pub disable_secondary: Vec<String>,
    /// Records skipped by validation.
    pub rejected: Vec<String>,
}

impl Conversion {
    /// Returns true if the batch has nothing to apply.
    ///
    /// Rejections alone do not count as work.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
            && self.secondary.is_empty()
            && self.deleted.is_empty()
            && self.disable_secondary.is_empty()
    }
}

/// Converts raw accounts into primary and secondary definitions.
#[derive(Debug, Clone)]
pub struct AccountConverter {
    variant: ProtocolVariant,
    defaults: DefaultsConfig,
    regions: RegionCatalog,
}

impl AccountConverter {
    /// Creates a converter accepting the built-in regions plus any extra
    /// regions named in `defaults`.
    pub fn new(variant: ProtocolVariant, defaults: DefaultsConfig) -> Self {
        let regions = RegionCatalog::aws().with_extra(&defaults.extra_regions);
        Self {
            variant,
            defaults,
            regions,
        }
    }

    /// Replaces the region catalog.
    pub fn with_regions(mut self, regions: RegionCatalog) -> Self {
        self.regions = regions;
        self
    }

    /// The defaults applied to converted accounts.
    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    /// Converts a batch.
    ///
    /// Accounts are processed in input order and the first record for a name
    /// wins. Invalid records are skipped and listed in
    /// [`Conversion::rejected`]. A template that does not converge fails the
    /// whole batch.
    pub fn convert(&self, accounts: &[RawAccount]) -> SyncResult<Conversion> {
        let mut out = Conversion::default();
        let mut seen = BTreeSet::new();

        for raw in accounts {
            let name = match self.validate(raw) {
                Ok(name) => name,
                Err(err) => {
                    warn!(error = %err, "skipping remote account");
                    out.rejected
                        .push(raw.name().unwrap_or(UNNAMED).to_string());
                    continue;
                }
            };

            if !seen.insert(name.to_string()) {
                info!(account = name, "duplicate account in batch; keeping the first");
                continue;
            }

            if self.is_deletion(raw) {
                info!(account = name, "account suspended, deleted or without providers; removing");
                out.deleted.push(name.to_string());
                continue;
            }

            let mut primary = self.build_primary(raw, name)?;
            let mut has_secondary = false;
            let tags = cleaned_providers(raw);

            if tags.is_empty() {
                // Only reachable in the bookmark variant: everything is enabled.
                primary.lambda_enabled = true;
                has_secondary = true;
            }
            for tag in &tags {
                match tag.as_str() {
                    "ec2" => trace!(account = name, "nothing to do for ec2"),
                    "lambda" => {
                        debug!(account = name, "enabling lambda");
                        primary.lambda_enabled = true;
                    }
                    "ecs" => {
                        debug!(account = name, "enabling ecs");
                        has_secondary = true;
                    }
                    other => info!(account = name, provider = other, "ignoring unsupported provider"),
                }
            }

            if has_secondary {
                let secondary = SecondaryDefinition::for_primary(name);
                out.secondary.insert(secondary.name.clone(), secondary);
            } else {
                out.disable_secondary.push(name.to_string());
            }
            out.primary.insert(name.to_string(), primary);
        }

        debug!(
            primary = ?out.primary.keys().collect::<Vec<_>>(),
            secondary = ?out.secondary.keys().collect::<Vec<_>>(),
            deleted = ?out.deleted,
            disable_secondary = ?out.disable_secondary,
            rejected = out.rejected.len(),
            "converted remote accounts"
        );
        Ok(out)
    }

    fn validate<'a>(&self, raw: &'a RawAccount) -> SyncResult<&'a str> {
        let label = raw.name().unwrap_or(UNNAMED);
        let Some(name) = raw.name() else {
            return Err(SyncError::rejected(label, "missing name"));
        };
        if is_blank(raw.account_id.as_deref()) {
            return Err(SyncError::rejected(name, "missing accountId"));
        }
        if is_blank(raw.assume_role.as_deref()) {
            return Err(SyncError::rejected(name, "missing assumeRole"));
        }
        let has_status = !is_blank(raw.status.as_deref());
        if self.variant.requires_status() && !has_status {
            return Err(SyncError::rejected(name, "missing status"));
        }
        if !self.variant.requires_status() && !has_status && raw.deleted_at.is_none() {
            return Err(SyncError::rejected(name, "missing status and deletion marker"));
        }

        let regions = raw.regions.as_deref().unwrap_or_default();
        if regions.is_empty() {
            return Err(SyncError::rejected(name, "no regions"));
        }
        if let Some(unknown) = regions.iter().find(|r| !self.regions.contains(r)) {
            return Err(SyncError::rejected(name, format!("invalid region {unknown:?}")));
        }
        Ok(name)
    }

    fn is_deletion(&self, raw: &RawAccount) -> bool {
        raw.is_deleted_marker()
            || raw.is_suspended()
            || (self.variant.empty_providers_deletes() && raw.has_no_providers())
    }

    fn build_primary(&self, raw: &RawAccount, name: &str) -> SyncResult<PrimaryDefinition> {
        let assume_role = normalize_role(raw.assume_role.as_deref().unwrap_or_default());
        let mut primary = PrimaryDefinition::new(
            name,
            raw.account_id.as_deref().unwrap_or_default().trim(),
            assume_role,
        );
        primary.regions = raw
            .regions
            .iter()
            .flatten()
            .map(|r| Region::new(RegionCatalog::normalize(r)))
            .collect();
        primary.enabled = raw.enabled.unwrap_or(true);
        primary.environment = raw.environment.clone();
        primary.account_type = raw.account_type.clone();
        primary.permissions = raw.permissions.clone();
        primary.default_key_pair = raw.default_key_pair.clone();
        primary.default_security_groups = raw.default_security_groups.clone();
        apply_defaults(&self.defaults, primary)
    }
}

/// Prefixes `role/` unless already present (case-insensitive).
pub fn normalize_role(role: &str) -> String {
    let role = role.trim();
    if role.to_ascii_lowercase().starts_with(ROLE_PREFIX) {
        role.to_string()
    } else {
        format!("{ROLE_PREFIX}{role}")
    }
}

/// Fills unset fields of `account` from `defaults`.
///
/// `environment` and `accountType` fall back to the account name; the other
/// fields use the configured templates over `{{name}}`, `{{accountId}}`,
/// `{{environment}}` and `{{accountType}}`. Values already set on the
/// account are themselves template-expanded.
pub fn apply_defaults(
    defaults: &DefaultsConfig,
    mut account: PrimaryDefinition,
) -> SyncResult<PrimaryDefinition> {
    if account.environment.is_none() {
        account.environment = Some(account.name.clone());
    }
    if account.account_type.is_none() {
        account.account_type = Some(account.name.clone());
    }
    if account.default_security_groups.is_none() {
        account.default_security_groups = defaults.default_security_groups.clone();
    }
    if account.lifecycle_hooks.is_none() {
        account.lifecycle_hooks = defaults.default_lifecycle_hooks.clone();
    }

    let ctx = TemplateContext::new()
        .bind("name", Some(&account.name))
        .bind("accountId", Some(&account.account_id))
        .bind("environment", account.environment.as_deref())
        .bind("accountType", account.account_type.as_deref());

    account.default_key_pair = ctx.resolve(&[
        account.default_key_pair.as_deref(),
        defaults.default_key_pair_template.as_deref(),
    ])?;
    account.edda = ctx.resolve(&[account.edda.as_deref(), defaults.default_edda_template.as_deref()])?;
    account.front50 = ctx.resolve(&[
        account.front50.as_deref(),
        defaults.default_front50_template.as_deref(),
    ])?;
    account.discovery = ctx.resolve(&[
        account.discovery.as_deref(),
        defaults.default_discovery_template.as_deref(),
    ])?;
    if let Some(role) = ctx.resolve(&[
        Some(account.assume_role.as_str()),
        defaults.default_assume_role.as_deref(),
    ])? {
        account.assume_role = role;
    }
    account.session_name = ctx.resolve(&[
        account.session_name.as_deref(),
        defaults.default_session_name.as_deref(),
    ])?;
    account.bastion_host = ctx.resolve(&[
        account.bastion_host.as_deref(),
        defaults.default_bastion_host_template.as_deref(),
    ])?;

    if let Some(hooks) = account.lifecycle_hooks.as_mut() {
        for hook in hooks {
            hook.role_arn = ctx.resolve(&[
                hook.role_arn.as_deref(),
                defaults.default_lifecycle_hook_role_arn_template.as_deref(),
            ])?;
            hook.notification_target_arn = ctx.resolve(&[
                hook.notification_target_arn.as_deref(),
                defaults
                    .default_lifecycle_hook_notification_target_arn_template
                    .as_deref(),
            ])?;
        }
    }
    Ok(account)
}

/// Trimmed, lower-cased, de-duplicated provider tags in first-seen order.
fn cleaned_providers(raw: &RawAccount) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.providers.iter().flatten() {
        let tag = tag.trim().to_ascii_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::LifecycleHook;
    use acctreg_protocol::STATUS_SUSPENDED;

    fn link() -> AccountConverter {
        AccountConverter::new(ProtocolVariant::PaginationLink, DefaultsConfig::new())
    }

    fn bookmark() -> AccountConverter {
        AccountConverter::new(ProtocolVariant::Bookmark, DefaultsConfig::new())
    }

    fn active(name: &str) -> RawAccount {
        RawAccount::new(name, "123456789012", "role1")
            .with_regions(["us-west-2"])
            .with_providers(["ec2"])
    }

    #[test]
    fn converts_the_acct1_example() {
        let raw = RawAccount::new("acct1", "1", "role1")
            .with_regions(["us-west-2"])
            .with_providers(["ecs", "lambda", "ec2"]);

        let out = link().convert(&[raw]).unwrap();
        let primary = &out.primary["acct1"];
        assert_eq!(primary.assume_role, "role/role1");
        assert!(primary.lambda_enabled);
        assert!(primary.enabled);
        assert_eq!(primary.region_names(), vec!["us-west-2"]);
        assert_eq!(out.secondary["acct1-ecs"].aws_account, "acct1");
        assert!(out.disable_secondary.is_empty());
        assert!(out.deleted.is_empty());
    }

    #[test]
    fn existing_role_prefix_is_kept() {
        assert_eq!(normalize_role("role/deploy"), "role/deploy");
        assert_eq!(normalize_role("Role/deploy"), "Role/deploy");
        assert_eq!(normalize_role(" deploy "), "role/deploy");
    }

    #[test]
    fn account_without_ecs_disables_secondary() {
        let out = link().convert(&[active("a")]).unwrap();
        assert!(!out.primary["a"].lambda_enabled);
        assert!(out.secondary.is_empty());
        assert_eq!(out.disable_secondary, vec!["a"]);
    }

    #[test]
    fn provider_tags_are_cleaned() {
        let raw = active("a").with_providers([" ECS ", "ecs", "Lambda", "gpu"]);
        let out = link().convert(&[raw]).unwrap();
        assert!(out.primary["a"].lambda_enabled);
        assert_eq!(out.secondary.len(), 1);
        assert!(out.disable_secondary.is_empty());
    }

    #[test]
    fn suspended_and_providerless_accounts_are_deleted_in_link_variant() {
        let suspended = active("s").with_status(STATUS_SUSPENDED);
        let mut absent = active("n");
        absent.providers = None;
        let empty = active("e").with_providers(Vec::<String>::new());

        let out = link().convert(&[suspended, absent, empty]).unwrap();
        assert_eq!(out.deleted, vec!["s", "n", "e"]);
        assert!(out.primary.is_empty());
    }

    #[test]
    fn empty_providers_enable_everything_in_bookmark_variant() {
        let raw = RawAccount::new("b", "1", "r")
            .with_regions(["us-east-1"])
            .with_deleted_at(0);
        let out = bookmark().convert(&[raw]).unwrap();
        assert!(out.primary["b"].lambda_enabled);
        assert!(out.secondary.contains_key("b-ecs"));
        assert!(out.deleted.is_empty());
    }

    #[test]
    fn deleted_at_marks_deletion() {
        let raw = active("gone").with_deleted_at(1_600_000_000);
        let out = bookmark().convert(&[raw]).unwrap();
        assert_eq!(out.deleted, vec!["gone"]);
        assert!(out.primary.is_empty());
    }

    #[test]
    fn validation_rejects_and_continues() {
        let mut no_id = active("no-id");
        no_id.account_id = Some("  ".into());
        let mut no_status = active("no-status");
        no_status.status = None;
        let no_regions = active("no-regions").with_regions(Vec::<String>::new());
        let bad_region = active("bad-region").with_regions(["us-west-2", "mars-north-1"]);
        let mut unnamed = active("x");
        unnamed.name = None;

        let out = link()
            .convert(&[no_id, no_status, no_regions, bad_region, unnamed, active("ok")])
            .unwrap();
        assert_eq!(
            out.rejected,
            vec!["no-id", "no-status", "no-regions", "bad-region", UNNAMED]
        );
        assert_eq!(out.primary.keys().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn bookmark_variant_needs_status_or_deletion_marker() {
        let mut raw = active("a");
        raw.status = None;
        let out = bookmark().convert(&[raw.clone()]).unwrap();
        assert_eq!(out.rejected, vec!["a"]);

        let out = bookmark().convert(&[raw.with_deleted_at(0)]).unwrap();
        assert!(out.primary.contains_key("a"));
    }

    #[test]
    fn regions_are_normalized() {
        let raw = active("a").with_regions([" US-West-2 ", "eu-west-1"]);
        let out = link().convert(&[raw]).unwrap();
        assert_eq!(out.primary["a"].region_names(), vec!["us-west-2", "eu-west-1"]);
    }

    #[test]
    fn extra_regions_extend_the_catalog() {
        let defaults = DefaultsConfig {
            extra_regions: vec!["local-test-1".into()],
            ..DefaultsConfig::default()
        };
        let converter = AccountConverter::new(ProtocolVariant::PaginationLink, defaults);
        let out = converter
            .convert(&[active("a").with_regions(["local-test-1"])])
            .unwrap();
        assert!(out.rejected.is_empty());

        let strict = link().with_regions(RegionCatalog::from_names(["us-east-1"]));
        let out = strict.convert(&[active("a")]).unwrap();
        assert_eq!(out.rejected, vec!["a"]);
    }

    #[test]
    fn first_record_for_a_name_wins() {
        let first = active("dup").with_providers(["lambda"]);
        let second = active("dup").with_providers(["ecs"]);
        let out = link().convert(&[first, second]).unwrap();
        assert!(out.primary["dup"].lambda_enabled);
        assert!(out.secondary.is_empty());

        let deleted_first = active("d").with_status(STATUS_SUSPENDED);
        let out = link().convert(&[deleted_first, active("d")]).unwrap();
        assert_eq!(out.deleted, vec!["d"]);
        assert!(out.primary.is_empty());
    }

    #[test]
    fn enabled_defaults_to_true() {
        let out = link()
            .convert(&[active("on"), active("off").with_enabled(false)])
            .unwrap();
        assert!(out.primary["on"].enabled);
        assert!(!out.primary["off"].enabled);
    }

    #[test]
    fn templates_fill_missing_fields() {
        let defaults = DefaultsConfig {
            default_key_pair_template: Some("{{name}}-keypair".into()),
            default_edda_template: Some("http://edda.{{environment}}:8080".into()),
            default_discovery_template: Some("http://%s.discovery{{accountId}}".into()),
            default_session_name: Some("spin-{{accountType}}".into()),
            default_lifecycle_hook_role_arn_template: Some(
                "arn:aws:iam::{{accountId}}:role/hooks".into(),
            ),
            default_lifecycle_hooks: Some(vec![LifecycleHook {
                lifecycle_transition: Some("autoscaling:EC2_INSTANCE_TERMINATING".into()),
                ..LifecycleHook::default()
            }]),
            ..DefaultsConfig::default()
        }
        .with_security_groups(["sg-default"]);

        let mut raw = active("prod");
        raw.environment = Some("production".into());
        raw.default_key_pair = Some("explicit-{{accountId}}".into());

        let converter = AccountConverter::new(ProtocolVariant::PaginationLink, defaults);
        let out = converter.convert(&[raw]).unwrap();
        let primary = &out.primary["prod"];

        assert_eq!(primary.environment.as_deref(), Some("production"));
        assert_eq!(primary.account_type.as_deref(), Some("prod"));
        assert_eq!(primary.default_key_pair.as_deref(), Some("explicit-123456789012"));
        assert_eq!(primary.edda.as_deref(), Some("http://edda.production:8080"));
        assert_eq!(
            primary.discovery.as_deref(),
            Some("http://%s.discovery123456789012")
        );
        assert_eq!(primary.session_name.as_deref(), Some("spin-prod"));
        assert_eq!(primary.front50, None);
        assert_eq!(
            primary.default_security_groups.as_deref(),
            Some(&["sg-default".to_string()][..])
        );
        let hooks = primary.lifecycle_hooks.as_ref().unwrap();
        assert_eq!(
            hooks[0].role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/hooks")
        );
        assert_eq!(hooks[0].notification_target_arn, None);
    }

    #[test]
    fn role_templates_expand_after_prefixing() {
        let raw = RawAccount::new("svc", "1", "{{name}}-deploy")
            .with_regions(["us-west-2"])
            .with_providers(["ec2"]);
        let out = link().convert(&[raw]).unwrap();
        assert_eq!(out.primary["svc"].assume_role, "role/svc-deploy");
    }

    #[test]
    fn runaway_template_fails_the_batch() {
        let mut raw = active("loop");
        raw.environment = Some("{{environment}}x".into());
        raw.default_key_pair = Some("{{environment}}".into());
        let err = link().convert(&[raw]).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn nothing_to_do() {
        assert!(link().convert(&[]).unwrap().is_empty());

        let mut bad = active("bad");
        bad.regions = None;
        let out = link().convert(&[bad]).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.rejected.len(), 1);

        let out = link()
            .convert(&[active("s").with_status(STATUS_SUSPENDED)])
            .unwrap();
        assert!(!out.is_empty());
    }
}

//! Merge of converted remote accounts into the current account sets.
//!
//! Remote definitions replace local ones of the same name, local entries the
//! remote did not mention are kept, and deleted names disappear from both
//! maps.

use crate::convert::Conversion;
use crate::definition::{
    secondary_name_for, CredentialDefinition, PrimaryDefinition, SecondaryDefinition,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The primary and secondary definitions currently in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSets {
    /// Primary definitions by name.
    pub primary: BTreeMap<String, PrimaryDefinition>,
    /// Secondary definitions by name.
    pub secondary: BTreeMap<String, SecondaryDefinition>,
}

impl AccountSets {
    /// Creates empty sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds sets from definition lists; later duplicates replace earlier.
    pub fn from_definitions<P, S>(primary: P, secondary: S) -> Self
    where
        P: IntoIterator<Item = PrimaryDefinition>,
        S: IntoIterator<Item = SecondaryDefinition>,
    {
        Self {
            primary: primary.into_iter().map(|p| (p.name.clone(), p)).collect(),
            secondary: secondary.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Returns true if both maps are empty.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Looks up a definition of either kind.
    pub fn get(&self, name: &str) -> Option<CredentialDefinition> {
        self.primary
            .get(name)
            .cloned()
            .map(CredentialDefinition::from)
            .or_else(|| self.secondary.get(name).cloned().map(CredentialDefinition::from))
    }
}

/// Names that changed in one map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapDelta {
    /// New names.
    pub added: Vec<String>,
    /// Names whose definition changed.
    pub updated: Vec<String>,
    /// Names no longer present.
    pub removed: Vec<String>,
}

impl MapDelta {
    fn between<T: PartialEq>(before: &BTreeMap<String, T>, after: &BTreeMap<String, T>) -> Self {
        let mut delta = MapDelta::default();
        for (name, value) in after {
            match before.get(name) {
                None => delta.added.push(name.clone()),
                Some(previous) if previous != value => delta.updated.push(name.clone()),
                Some(_) => {}
            }
        }
        delta.removed = before
            .keys()
            .filter(|name| !after.contains_key(*name))
            .cloned()
            .collect();
        delta
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// What changed between the previous and the reconciled sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Primary map changes.
    pub primary: MapDelta,
    /// Secondary map changes.
    pub secondary: MapDelta,
}

impl Delta {
    /// Returns true if neither map changed.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}

/// Result of a reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The new account sets.
    pub sets: AccountSets,
    /// Changes relative to the previous sets.
    pub delta: Delta,
}

/// Merges `conversion` into `current`.
pub fn reconcile(current: &AccountSets, conversion: &Conversion) -> Reconciliation {
    let deleted: BTreeSet<&str> = conversion.deleted.iter().map(String::as_str).collect();

    let mut primary = conversion.primary.clone();
    for (name, definition) in &current.primary {
        if !deleted.contains(name.as_str()) && !primary.contains_key(name) {
            primary.insert(name.clone(), definition.clone());
        }
    }

    let mut secondary = conversion.secondary.clone();
    for (name, definition) in &current.secondary {
        if !deleted.contains(definition.aws_account.as_str()) && !secondary.contains_key(name) {
            secondary.insert(name.clone(), definition.clone());
        }
    }
    for name in conversion.disable_secondary.iter().chain(&conversion.deleted) {
        secondary.remove(&secondary_name_for(name));
    }

    let sets = AccountSets { primary, secondary };
    let delta = Delta {
        primary: MapDelta::between(&current.primary, &sets.primary),
        secondary: MapDelta::between(&current.secondary, &sets.secondary),
    };
    debug!(
        primary_added = ?delta.primary.added,
        primary_updated = ?delta.primary.updated,
        primary_removed = ?delta.primary.removed,
        secondary_added = ?delta.secondary.added,
        secondary_removed = ?delta.secondary.removed,
        "reconciled account sets"
    );
    Reconciliation { sets, delta }
}

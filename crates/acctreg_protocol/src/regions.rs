//! Known cloud regions.

use std::collections::BTreeSet;

/// AWS regions accepted without extra configuration.
pub const KNOWN_AWS_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ca-central-1",
    "ca-west-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "us-iso-east-1",
    "us-isob-east-1",
    "us-west-1",
    "us-west-2",
];

/// The set of region names an account may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCatalog {
    known: BTreeSet<String>,
}

impl RegionCatalog {
    /// Creates a catalog of the built-in AWS regions.
    pub fn aws() -> Self {
        Self {
            known: KNOWN_AWS_REGIONS.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Creates a catalog holding exactly the given regions.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known: names.into_iter().map(|n| Self::normalize(n.as_ref())).collect(),
        }
    }

    /// Adds regions on top of the current set.
    pub fn with_extra<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known
            .extend(names.into_iter().map(|n| Self::normalize(n.as_ref())));
        self
    }

    /// Trims and lower-cases a region name.
    pub fn normalize(name: &str) -> String {
        name.trim().to_ascii_lowercase()
    }

    /// Returns true if the normalized name is known.
    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(&Self::normalize(name))
    }

    /// Number of known regions.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Returns true if no regions are known.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Iterates the known regions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::aws()
    }
}

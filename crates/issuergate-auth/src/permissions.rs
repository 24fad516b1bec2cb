//! Native → canonical permission mapping
//!
//! Each issuer speaks its own permission vocabulary. A [`PermissionMapper`]
//! owns one issuer's translation table and applies three rules:
//!
//! 1. The wildcard native value short-circuits to the canonical wildcard and
//!    nothing else.
//! 2. Unmapped native values are dropped, never passed through.
//! 3. If no mapped permission ends with the read suffix, the default read
//!    permission is added, so every identity can read its own profile.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Sorted set of canonical permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a permission. Returns false if it was already present.
    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    /// Exact membership
    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Membership including wildcard grants.
    ///
    /// An entry `prefix.*` grants every permission starting with `prefix.`.
    pub fn grants(&self, permission: &str) -> bool {
        self.contains(permission)
            || self.0.iter().any(|held| {
                held.strip_suffix('*')
                    .is_some_and(|prefix| prefix.ends_with('.') && permission.starts_with(prefix))
            })
    }

    /// Iterate in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of permissions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Mapping policy shared by all issuers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionPolicy {
    /// Native value granting everything
    pub wildcard_native: String,
    /// Canonical permission it maps to
    pub wildcard_canonical: String,
    /// Suffix identifying a read permission on the user's own entity
    pub read_suffix: String,
    /// Added when no mapped permission carries `read_suffix`
    pub default_read: String,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            wildcard_native: "all access".to_string(),
            wildcard_canonical: "app.*".to_string(),
            read_suffix: ".user.read".to_string(),
            default_read: "app.user.read".to_string(),
        }
    }
}

/// One issuer's permission translation.
#[derive(Debug, Clone)]
pub struct PermissionMapper {
    table: HashMap<String, String>,
    policy: Arc<PermissionPolicy>,
}

impl PermissionMapper {
    /// Create a mapper from a native → canonical table.
    ///
    /// Keys are trimmed; matching is otherwise exact and case-sensitive.
    pub fn new(table: HashMap<String, String>, policy: Arc<PermissionPolicy>) -> Self {
        let table = table
            .into_iter()
            .map(|(native, canonical)| (native.trim().to_string(), canonical))
            .collect();
        Self { table, policy }
    }

    /// Translate native permissions. Never fails.
    pub fn map<S: AsRef<str>>(&self, native: &[S]) -> PermissionSet {
        let native = native.iter().map(|p| p.as_ref().trim());

        let mut mapped = PermissionSet::new();
        for permission in native {
            if permission == self.policy.wildcard_native {
                return std::iter::once(self.policy.wildcard_canonical.clone()).collect();
            }
            if let Some(canonical) = self.table.get(permission) {
                mapped.insert(canonical.clone());
            }
        }

        if !mapped.iter().any(|p| p.ends_with(&self.policy.read_suffix)) {
            mapped.insert(self.policy.default_read.clone());
        }

        mapped
    }
}

//! Active-set resolution: which snippets run for a set of scopes, and in
//! what order.
//!
//! Pure over its inputs; fetching and caching live in `services::active`.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::scope::Scope;
use crate::models::snippet::{Partition, Snippet};

/// Canonical, deduplicated set of scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    pub fn new(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self(scopes.into_iter().collect())
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn intersects(&self, scopes: &[Scope]) -> bool {
        scopes.iter().any(|s| self.0.contains(s))
    }

    /// Deterministic serialization used for cache keys: scope names sorted
    /// lexically and joined with commas.
    pub fn cache_key(&self) -> String {
        let mut names: Vec<&str> = self.0.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.join(",")
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Resolved snippets, kept per origin partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveSet {
    pub network: Vec<Snippet>,
    pub site: Vec<Snippet>,
}

impl ActiveSet {
    /// Aggregate emission order: network bucket, then site bucket.
    pub fn iter(&self) -> impl Iterator<Item = (Partition, &Snippet)> {
        self.network
            .iter()
            .map(|s| (Partition::Network, s))
            .chain(self.site.iter().map(|s| (Partition::Site, s)))
    }

    pub fn len(&self) -> usize {
        self.network.len() + self.site.len()
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_empty() && self.site.is_empty()
    }
}

/// Select and order the snippets that run for `scopes`.
///
/// Site records need `active`. Network records need `active` or an id in
/// `shared_ids`, so a site can run a shared snippet the network owner has
/// left inactive. Each bucket is ordered by priority, then id.
pub fn resolve(
    scopes: &ScopeSet,
    site_records: Vec<Snippet>,
    network_records: Vec<Snippet>,
    shared_ids: &HashSet<i64>,
) -> ActiveSet {
    let mut site: Vec<Snippet> = site_records
        .into_iter()
        .filter(|s| s.active && scopes.contains(s.scope))
        .collect();

    let mut network: Vec<Snippet> = network_records
        .into_iter()
        .filter(|s| (s.active || shared_ids.contains(&s.id)) && scopes.contains(s.scope))
        .map(|mut s| {
            s.shared_network = shared_ids.contains(&s.id);
            s
        })
        .collect();

    site.sort_by_key(|s| (s.priority, s.id));
    network.sort_by_key(|s| (s.priority, s.id));

    ActiveSet { network, site }
}

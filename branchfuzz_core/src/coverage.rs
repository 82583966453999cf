//! Binary branch coverage: which named decision points a run visited.
//!
//! Coverage is a set, not a hit counter. Once a branch is in the persistent
//! map of a campaign it stays there until the campaign is dropped.

use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::collections::BTreeSet;
use std::fmt;

/// Name of one decision point inside a system under test.
///
/// Tags must be unique within a target and stable across runs, otherwise
/// coverage numbers from different campaigns are not comparable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(Cow<'static, str>);

impl BranchId {
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for BranchId {
    fn from(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }
}

impl From<String> for BranchId {
    fn from(tag: String) -> Self {
        Self(Cow::Owned(tag))
    }
}

impl Borrow<str> for BranchId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of covered branches.
///
/// Used both as the persistent campaign-wide map and as the throwaway
/// per-iteration scope a single execution records into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    branches: BTreeSet<BranchId>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `branch` as covered. Returns `true` if it was not covered before.
    pub fn record(&mut self, branch: impl Into<BranchId>) -> bool {
        self.branches.insert(branch.into())
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.branches.contains(branch)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Unions `other` into `self` and returns how many branches were new.
    pub fn merge(&mut self, other: &CoverageMap) -> usize {
        let before = self.branches.len();
        self.branches.extend(other.branches.iter().cloned());
        self.branches.len() - before
    }

    /// Branches present here but absent from `persistent`, in tag order.
    pub fn novel_relative_to(&self, persistent: &CoverageMap) -> Vec<BranchId> {
        self.branches
            .difference(&persistent.branches)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BranchId> {
        self.branches.iter()
    }
}

impl<B: Into<BranchId>> FromIterator<B> for CoverageMap {
    fn from_iter<T: IntoIterator<Item = B>>(iter: T) -> Self {
        Self {
            branches: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Campaign-owned coverage state.
///
/// Holds the persistent map and hands out fresh per-iteration scopes. Not
/// thread-safe; a campaign drives its tracker from a single thread.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    persistent: CoverageMap,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records directly into the persistent map.
    pub fn record(&mut self, branch: impl Into<BranchId>) -> bool {
        self.persistent.record(branch)
    }

    /// Current number of covered branches.
    pub fn snapshot(&self) -> usize {
        self.persistent.len()
    }

    /// An empty scope for one execution.
    pub fn fresh_scope(&self) -> CoverageMap {
        CoverageMap::new()
    }

    /// Commits a finished scope. Returns the number of branches it added.
    pub fn merge(&mut self, scope: &CoverageMap) -> usize {
        self.persistent.merge(scope)
    }

    pub fn map(&self) -> &CoverageMap {
        &self.persistent
    }

    pub fn into_map(self) -> CoverageMap {
        self.persistent
    }
}

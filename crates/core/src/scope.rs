//! Scope sets and the selection state built from them.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Dimension;

/// Ordered set of chosen values at one hierarchy level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn new() -> Self { Self::default() }

    pub fn single(value: impl Into<String>) -> Self {
        let mut s = Self::default();
        s.0.insert(value.into());
        s
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn contains(&self, value: &str) -> bool { self.0.contains(value) }
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ { self.0.iter().map(|s| s.as_str()) }
    pub fn clear(&mut self) { self.0.clear(); }
    pub fn insert(&mut self, value: impl Into<String>) -> bool { self.0.insert(value.into()) }
    pub fn remove(&mut self, value: &str) -> bool { self.0.remove(value) }

    /// Add when absent, remove when present. Returns whether the value is now in the set.
    pub fn toggle(&mut self, value: &str) -> bool {
        if self.0.remove(value) {
            false
        } else {
            self.0.insert(value.to_string());
            true
        }
    }

    /// Replace the set with exactly `value`, or clear it when it already is exactly `value`.
    pub fn toggle_single(&mut self, value: &str) {
        if self.0.len() == 1 && self.0.contains(value) {
            self.0.clear();
        } else {
            *self = Self::single(value);
        }
    }

    pub fn to_vec(&self) -> Vec<String> { self.0.iter().cloned().collect() }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Four independent scope sets plus the multi-select set used by bulk operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub clusters: ScopeSet,
    pub namespaces: ScopeSet,
    pub projects: ScopeSet,
    pub application_sets: ScopeSet,
    pub selected_apps: ScopeSet,
}

impl Selection {
    pub fn scope(&self, dim: Dimension) -> &ScopeSet {
        match dim {
            Dimension::Cluster => &self.clusters,
            Dimension::Namespace => &self.namespaces,
            Dimension::Project => &self.projects,
            Dimension::ApplicationSet => &self.application_sets,
        }
    }

    pub fn scope_mut(&mut self, dim: Dimension) -> &mut ScopeSet {
        match dim {
            Dimension::Cluster => &mut self.clusters,
            Dimension::Namespace => &mut self.namespaces,
            Dimension::Project => &mut self.projects,
            Dimension::ApplicationSet => &mut self.application_sets,
        }
    }

    /// True when no dimension is scoped. The multi-select set is not a scope.
    pub fn is_unscoped(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.scope(*d).is_empty())
    }

    /// Clear every hierarchy scope below `dim` along with the multi-select set.
    /// ApplicationSet is a side dimension and is never cleared by this.
    pub fn clear_below(&mut self, dim: Dimension) {
        match dim {
            Dimension::Cluster => {
                self.namespaces.clear();
                self.projects.clear();
            }
            Dimension::Namespace => self.projects.clear(),
            Dimension::Project | Dimension::ApplicationSet => {}
        }
        self.selected_apps.clear();
    }

    pub fn clear_all(&mut self) { *self = Self::default(); }
}

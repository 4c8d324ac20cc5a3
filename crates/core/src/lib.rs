//! Fleet core types: applications and the four scope dimensions they are filtered by.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod scope;
pub mod sort;
pub mod view;

pub use scope::{ScopeSet, Selection};
pub use sort::{SortConfig, SortDirection, SortField};
pub use view::{Mode, View, VisibleRow};

/// A deployed application. `name` is the identity; no two applications share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,
    #[serde(default)]
    pub sync: String,
    #[serde(default)]
    pub health: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync: String::new(),
            health: String::new(),
            cluster: None,
            namespace: None,
            project: None,
            application_set: None,
            last_sync_at: None,
        }
    }

    pub fn with_cluster(mut self, v: impl Into<String>) -> Self { self.cluster = Some(v.into()); self }
    pub fn with_namespace(mut self, v: impl Into<String>) -> Self { self.namespace = Some(v.into()); self }
    pub fn with_project(mut self, v: impl Into<String>) -> Self { self.project = Some(v.into()); self }
    pub fn with_application_set(mut self, v: impl Into<String>) -> Self { self.application_set = Some(v.into()); self }

    pub fn with_status(mut self, sync: impl Into<String>, health: impl Into<String>) -> Self {
        self.sync = sync.into();
        self.health = health.into();
        self
    }

    /// Value of one dimension. Absent and empty-string values both read as `None`.
    pub fn dimension(&self, dim: Dimension) -> Option<&str> {
        let v = match dim {
            Dimension::Cluster => self.cluster.as_deref(),
            Dimension::Namespace => self.namespace.as_deref(),
            Dimension::Project => self.project.as_deref(),
            Dimension::ApplicationSet => self.application_set.as_deref(),
        };
        v.filter(|s| !s.is_empty())
    }

    /// Lowercase substring match over name, sync, health, namespace and project.
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        if needle.is_empty() { return true; }
        [
            Some(self.name.as_str()),
            Some(self.sync.as_str()),
            Some(self.health.as_str()),
            self.namespace.as_deref(),
            self.project.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// The four scope dimensions an application can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    Cluster,
    Namespace,
    Project,
    ApplicationSet,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Cluster,
        Dimension::Namespace,
        Dimension::Project,
        Dimension::ApplicationSet,
    ];

    /// Dense slot used by per-dimension tables.
    pub fn slot(self) -> usize {
        match self {
            Dimension::Cluster => 0,
            Dimension::Namespace => 1,
            Dimension::Project => 2,
            Dimension::ApplicationSet => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Cluster => "cluster",
            Dimension::Namespace => "namespace",
            Dimension::Project => "project",
            Dimension::ApplicationSet => "ApplicationSet",
        }
    }
}

pub mod prelude {
    pub use super::{Application, Dimension, Mode, ScopeSet, Selection, View, VisibleRow};
}

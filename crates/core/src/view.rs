#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{Application, Dimension};

/// Hierarchy level currently shown. `ApplicationSets` is a side list outside the
/// cluster → namespace → project → apps chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    #[default]
    Clusters,
    Namespaces,
    Projects,
    Apps,
    ApplicationSets,
}

impl View {
    /// Dimension whose values this view lists; `None` for the leaf apps view.
    pub fn dimension(self) -> Option<Dimension> {
        match self {
            View::Clusters => Some(Dimension::Cluster),
            View::Namespaces => Some(Dimension::Namespace),
            View::Projects => Some(Dimension::Project),
            View::ApplicationSets => Some(Dimension::ApplicationSet),
            View::Apps => None,
        }
    }

    /// View reached by drilling down from this one.
    pub fn child(self) -> Option<View> {
        match self {
            View::Clusters => Some(View::Namespaces),
            View::Namespaces => Some(View::Projects),
            View::Projects | View::ApplicationSets => Some(View::Apps),
            View::Apps => None,
        }
    }

    /// View listing `dim`.
    pub fn listing(dim: Dimension) -> View {
        match dim {
            Dimension::Cluster => View::Clusters,
            Dimension::Namespace => View::Namespaces,
            Dimension::Project => View::Projects,
            Dimension::ApplicationSet => View::ApplicationSets,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            View::Clusters => "clusters",
            View::Namespaces => "namespaces",
            View::Projects => "projects",
            View::Apps => "apps",
            View::ApplicationSets => "applicationsets",
        }
    }
}

/// Top-level interaction state. Gates which input handler runs and which view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Normal,
    Loading,
    Search,
    Command,
    Help,
    ConfirmSync,
    ConfirmDelete,
    Rollback,
    Diff,
    DiffLoading,
    NoDiff,
    Resources,
    Logs,
    AuthRequired,
    Error,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Loading => "loading",
            Mode::Search => "search",
            Mode::Command => "command",
            Mode::Help => "help",
            Mode::ConfirmSync => "confirm-sync",
            Mode::ConfirmDelete => "confirm-delete",
            Mode::Rollback => "rollback",
            Mode::Diff => "diff",
            Mode::DiffLoading => "diff-loading",
            Mode::NoDiff => "no-diff",
            Mode::Resources => "resources",
            Mode::Logs => "logs",
            Mode::AuthRequired => "auth-required",
            Mode::Error => "error",
        }
    }
}

/// One row of the active list: an application in the apps view, a bare scope value elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum VisibleRow {
    Application(Application),
    ScopeLabel(String),
}

impl VisibleRow {
    pub fn as_application(&self) -> Option<&Application> {
        match self {
            VisibleRow::Application(a) => Some(a),
            VisibleRow::ScopeLabel(_) => None,
        }
    }

    pub fn as_scope_label(&self) -> Option<&str> {
        match self {
            VisibleRow::ScopeLabel(s) => Some(s),
            VisibleRow::Application(_) => None,
        }
    }

    /// Display key: the application name or the scope value.
    pub fn label(&self) -> &str {
        match self {
            VisibleRow::Application(a) => &a.name,
            VisibleRow::ScopeLabel(s) => s,
        }
    }

    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        match self {
            VisibleRow::Application(a) => a.matches_text(needle),
            VisibleRow::ScopeLabel(s) => s.to_lowercase().contains(needle),
        }
    }
}

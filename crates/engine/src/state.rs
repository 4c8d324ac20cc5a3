//! The single mutable value threaded through every update step.

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fleet_api::{DirectoryError, HistoryEntry, PropagationPolicy, ResourceNode, RevisionMetadata, Server};
use fleet_core::{Application, Mode, Selection, SortConfig, View, VisibleRow};
use fleet_index::ScopeIndex;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::diff::DiffLine;
use crate::msg::Target;
use crate::visible::visible_rows;

#[derive(Debug, Clone, Default)]
pub struct Navigation {
    pub view: View,
    pub cursor: usize,
    pub last_g: Option<Instant>,
    pub last_esc: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub search_query: String,
    pub active_filter: String,
    pub command: String,
    /// `None` keeps collection order in the apps view.
    pub sort: Option<SortConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmChoice {
    #[default]
    Yes,
    Cancel,
}

#[derive(Debug, Clone)]
pub struct Modals {
    pub confirm_target: Option<Target>,
    pub confirm_prune: bool,
    pub confirm_watch: bool,
    pub confirm_choice: ConfirmChoice,
    pub confirm_loading: bool,
}

impl Default for Modals {
    fn default() -> Self {
        Self {
            confirm_target: None,
            confirm_prune: false,
            confirm_watch: true,
            confirm_choice: ConfirmChoice::Yes,
            confirm_loading: false,
        }
    }
}

/// Delete confirmation. Typing `y` or `Y` commits; `c` and `p` adjust the options.
#[derive(Debug, Clone)]
pub struct DeleteModal {
    pub target: Target,
    pub cascade: bool,
    pub policy: PropagationPolicy,
    pub confirmation: String,
    pub loading: bool,
    pub error: Option<String>,
}

impl DeleteModal {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            cascade: true,
            policy: PropagationPolicy::Foreground,
            confirmation: String::new(),
            loading: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPhase {
    #[default]
    List,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackRow {
    pub id: i64,
    pub revision: String,
    pub deployed_at: Option<DateTime<Utc>>,
    pub metadata: Option<RevisionMetadata>,
    pub meta_error: Option<String>,
    pub meta_loading: bool,
}

impl From<HistoryEntry> for RollbackRow {
    fn from(h: HistoryEntry) -> Self {
        Self { id: h.id, revision: h.revision, deployed_at: h.deployed_at, metadata: None, meta_error: None, meta_loading: false }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackState {
    pub app: String,
    pub rows: Vec<RollbackRow>,
    pub selected: usize,
    pub current_revision: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
    pub phase: RollbackPhase,
    pub prune: bool,
    pub watch: bool,
    pub dry_run: bool,
    pub confirm_choice: ConfirmChoice,
}

impl RollbackState {
    pub fn loading(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            rows: Vec::new(),
            selected: 0,
            current_revision: None,
            loading: true,
            error: None,
            phase: RollbackPhase::List,
            prune: false,
            watch: true,
            dry_run: false,
            confirm_choice: ConfirmChoice::Yes,
        }
    }

    pub fn selected_row(&self) -> Option<&RollbackRow> { self.rows.get(self.selected) }
}

#[derive(Debug, Clone, Default)]
pub struct DiffState {
    pub title: String,
    pub lines: Vec<DiffLine>,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResourcesState {
    pub app: String,
    pub nodes: Vec<ResourceNode>,
    pub loading: bool,
    pub error: Option<String>,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PagerState {
    pub title: String,
    pub lines: Vec<String>,
    pub offset: usize,
}

/// Error retained for display in Error/AuthRequired mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorInfo {
    pub message: String,
    pub status: Option<u16>,
    pub detail: Option<String>,
}

impl From<&DirectoryError> for ApiErrorInfo {
    fn from(e: &DirectoryError) -> Self {
        match e {
            DirectoryError::Api { message, status, detail } => {
                Self { message: message.clone(), status: *status, detail: detail.clone() }
            }
            other => Self { message: other.message().to_string(), status: None, detail: None },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub escape_debounce: Duration,
    pub double_tap_window: Duration,
}

#[derive(Debug, Clone)]
pub struct State {
    pub apps: Vec<Application>,
    pub index: Option<ScopeIndex>,
    pub nav: Navigation,
    pub selection: Selection,
    pub mode: Mode,
    pub ui: UiState,
    pub modals: Modals,
    pub delete: Option<DeleteModal>,
    pub rollback: Option<RollbackState>,
    pub diff: Option<DiffState>,
    pub resources: Option<ResourcesState>,
    pub pager: Option<PagerState>,
    pub server: Option<Server>,
    pub api_version: Option<String>,
    pub status: String,
    pub error: Option<ApiErrorInfo>,
    pub watching: bool,
    pub watch_requested: bool,
    pub timing: Timing,
}

impl Default for State {
    fn default() -> Self { Self::new(&EngineConfig::default()) }
}

impl State {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            apps: Vec::new(),
            index: None,
            nav: Navigation::default(),
            selection: Selection::default(),
            mode: Mode::Normal,
            ui: UiState::default(),
            modals: Modals::default(),
            delete: None,
            rollback: None,
            diff: None,
            resources: None,
            pager: None,
            server: None,
            api_version: None,
            status: String::new(),
            error: None,
            watching: false,
            watch_requested: false,
            timing: Timing { escape_debounce: config.escape_debounce, double_tap_window: config.double_tap_window },
        }
    }

    /// Replace the whole collection and rebuild the index.
    pub fn replace_apps(&mut self, apps: Vec<Application>) {
        self.apps = apps;
        self.rebuild_index();
    }

    /// Insert or replace by name.
    pub fn upsert_app(&mut self, app: Application) {
        let pos = self.index.as_ref().and_then(|idx| idx.position(&app.name));
        match pos.filter(|p| self.apps.get(*p).map(|a| a.name == app.name).unwrap_or(false)) {
            Some(p) => self.apps[p] = app,
            None => match self.apps.iter().position(|a| a.name == app.name) {
                Some(p) => self.apps[p] = app,
                None => self.apps.push(app),
            },
        }
        self.rebuild_index();
    }

    pub fn remove_app(&mut self, name: &str) {
        self.apps.retain(|a| a.name != name);
        self.selection.selected_apps.remove(name);
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index = Some(ScopeIndex::build(&self.apps));
        self.clamp_cursor();
    }

    pub fn visible(&self) -> Vec<VisibleRow> { visible_rows(self) }

    pub fn clamp_cursor(&mut self) {
        let n = self.visible().len();
        self.nav.cursor = if n == 0 { 0 } else { self.nav.cursor.min(n - 1) };
    }

    pub fn cursor_row(&self) -> Option<VisibleRow> { self.visible().into_iter().nth(self.nav.cursor) }

    /// Name of the application under the cursor, only in the apps view.
    pub fn cursor_app(&self) -> Option<String> {
        if self.nav.view != View::Apps { return None; }
        self.cursor_row().and_then(|r| r.as_application().map(|a| a.name.clone()))
    }

    pub fn has_app(&self, name: &str) -> bool {
        match &self.index {
            Some(idx) => idx.position(name).is_some(),
            None => self.apps.iter().any(|a| a.name == name),
        }
    }

    /// Switch view and reset the cursor.
    pub fn change_view(&mut self, view: View) {
        self.nav.view = view;
        self.nav.cursor = 0;
    }

    pub fn set_status(&mut self, status: impl Into<String>) { self.status = status.into(); }

    pub fn clear_text_inputs(&mut self) {
        self.ui.search_query.clear();
        self.ui.active_filter.clear();
        self.ui.command.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, cluster: &str) -> Application { Application::new(name).with_cluster(cluster) }

    #[test]
    fn upsert_replaces_in_place_and_appends_new() {
        let mut s = State::default();
        s.replace_apps(vec![app("a", "prod"), app("b", "prod")]);
        s.upsert_app(app("a", "dev").with_status("OutOfSync", "Healthy"));
        s.upsert_app(app("c", "dev"));
        let names: Vec<&str> = s.apps.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(s.apps[0].sync, "OutOfSync");
        let idx = s.index.as_ref().unwrap();
        assert_eq!(idx.total(), 3);
        assert_eq!(idx.values(fleet_core::Dimension::Cluster), &["dev".to_string(), "prod".to_string()]);
    }

    #[test]
    fn remove_rebuilds_and_clamps_cursor() {
        let mut s = State::default();
        s.change_view(View::Apps);
        s.replace_apps(vec![app("a", "prod"), app("b", "prod")]);
        s.nav.cursor = 1;
        s.selection.selected_apps.insert("b");
        s.remove_app("b");
        assert_eq!(s.nav.cursor, 0);
        assert!(s.selection.selected_apps.is_empty());
        assert_eq!(s.index.as_ref().unwrap().total(), 1);
    }

    #[test]
    fn error_info_keeps_status_and_detail() {
        let e = DirectoryError::Api { message: "boom".into(), status: Some(500), detail: Some("trace".into()) };
        let info = ApiErrorInfo::from(&e);
        assert_eq!(info.status, Some(500));
        assert_eq!(info.detail.as_deref(), Some("trace"));
    }
}

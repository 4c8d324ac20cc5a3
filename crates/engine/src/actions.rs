//! Entry points for the application operations: sync, refresh, delete, diff, rollback, resources.
//!
//! Each resolves its target from an explicit name, the multi-select set or the
//! cursor, switches mode and returns the background work to run.

#![forbid(unsafe_code)]

use fleet_api::RollbackRequest;
use fleet_core::{Mode, View};
use tracing::debug;

use crate::msg::{Command, Target};
use crate::state::{ConfirmChoice, DeleteModal, Modals, ResourcesState, RollbackPhase, RollbackState, State};

const NO_SERVER: &str = "No server configured";

fn require_server(state: &mut State) -> bool {
    if state.server.is_some() { return true; }
    state.set_status(NO_SERVER);
    false
}

/// Single target for diff/rollback/resources: explicit name, the one selected app, or the cursor app.
fn single_target(state: &mut State, explicit: Option<String>, what: &str, multi_msg: &str) -> Option<String> {
    if let Some(name) = explicit { return Some(name); }
    let mut selected = state.selection.selected_apps.to_vec();
    if selected.len() > 1 {
        state.set_status(multi_msg);
        return None;
    }
    if let Some(name) = selected.pop() { return Some(name); }
    if state.nav.view != View::Apps {
        state.set_status(format!("Navigate to apps view first to select an app for {what}"));
        return None;
    }
    let app = state.cursor_app();
    if app.is_none() { state.set_status(format!("No app selected for {what}")); }
    app
}

/// Open the sync confirmation. The multi-select set wins over the cursor.
pub fn open_sync_modal(state: &mut State, explicit: Option<String>) -> Vec<Command> {
    let target = if let Some(name) = explicit {
        Target::Single(name)
    } else if !state.selection.selected_apps.is_empty() {
        Target::Multi
    } else if state.nav.view != View::Apps {
        state.set_status("Navigate to apps view to sync applications");
        return Vec::new();
    } else {
        match state.cursor_app() {
            Some(name) => Target::Single(name),
            None => {
                state.set_status("No applications visible to sync");
                return Vec::new();
            }
        }
    };
    state.modals = Modals { confirm_target: Some(target), ..Modals::default() };
    state.mode = Mode::ConfirmSync;
    Vec::new()
}

/// Commit the pending sync. The modal stays up with a loading flag until the result arrives.
pub fn confirm_sync(state: &mut State) -> Vec<Command> {
    let Some(target) = state.modals.confirm_target.clone() else {
        state.mode = Mode::Normal;
        return Vec::new();
    };
    if !require_server(state) {
        close_sync_modal(state);
        return Vec::new();
    }
    let (targets, bulk) = match target {
        Target::Multi => (state.selection.selected_apps.to_vec(), true),
        Target::Single(name) => (vec![name], false),
    };
    if targets.is_empty() {
        state.set_status("No applications selected");
        close_sync_modal(state);
        return Vec::new();
    }
    let watch = state.modals.confirm_watch && targets.len() == 1;
    let prune = state.modals.confirm_prune;
    state.modals.confirm_loading = true;
    debug!(count = targets.len(), prune, watch, "engine: sync confirmed");
    vec![Command::Sync { targets, prune, watch, bulk }]
}

pub fn close_sync_modal(state: &mut State) {
    state.modals = Modals::default();
    state.mode = Mode::Normal;
}

pub fn open_diff(state: &mut State, explicit: Option<String>) -> Vec<Command> {
    let Some(app) = single_target(state, explicit, "diff", "Cannot show diff for multiple apps") else { return Vec::new() };
    if !require_server(state) { return Vec::new(); }
    state.diff = None;
    state.mode = Mode::DiffLoading;
    state.set_status(format!("Loading diff for {app}..."));
    vec![Command::LoadDiff { app }]
}

pub fn open_rollback(state: &mut State, explicit: Option<String>) -> Vec<Command> {
    let Some(app) = single_target(state, explicit, "rollback", "Rollback not supported for multiple apps") else {
        return Vec::new();
    };
    if !require_server(state) { return Vec::new(); }
    state.rollback = Some(RollbackState::loading(app.clone()));
    state.mode = Mode::Rollback;
    vec![Command::LoadRollbackHistory { app }]
}

pub fn open_resources(state: &mut State, explicit: Option<String>) -> Vec<Command> {
    if let Some(name) = &explicit {
        if !state.has_app(name) {
            state.set_status(format!("Unknown app: {name}"));
            return Vec::new();
        }
    }
    let Some(app) = single_target(state, explicit, "resources", "Cannot show resources for multiple apps") else {
        return Vec::new();
    };
    if !require_server(state) { return Vec::new(); }
    state.resources = Some(ResourcesState { app: app.clone(), loading: true, ..ResourcesState::default() });
    state.mode = Mode::Resources;
    vec![Command::LoadResources { app }]
}

pub fn open_logs(state: &mut State) -> Vec<Command> {
    state.set_status("Loading logs...");
    vec![Command::ReadLogs]
}

/// Fetch the whole list again. Also restarts a closed watch once the list lands.
pub fn reload(state: &mut State) -> Vec<Command> {
    if !require_server(state) { return Vec::new(); }
    state.mode = Mode::Loading;
    state.set_status("Loading applications...");
    vec![Command::LoadApplications]
}

/// Explicit name, else the multi-select set, else the cursor app.
fn many_targets(state: &mut State, explicit: Option<String>, what: &str) -> Option<Target> {
    if let Some(name) = explicit { return Some(Target::Single(name)); }
    if !state.selection.selected_apps.is_empty() { return Some(Target::Multi); }
    if state.nav.view != View::Apps {
        state.set_status(format!("Navigate to apps view first to select an app for {what}"));
        return None;
    }
    let app = state.cursor_app();
    if app.is_none() { state.set_status(format!("No app selected for {what}")); }
    app.map(Target::Single)
}

fn target_names(state: &State, target: &Target) -> Vec<String> {
    match target {
        Target::Multi => state.selection.selected_apps.to_vec(),
        Target::Single(name) => vec![name.clone()],
    }
}

/// Ask the server to re-read the applications from their sources. `hard` also drops its manifest cache.
pub fn refresh_apps(state: &mut State, explicit: Option<String>, hard: bool) -> Vec<Command> {
    let Some(target) = many_targets(state, explicit, "refresh") else { return Vec::new() };
    if !require_server(state) { return Vec::new(); }
    let targets = target_names(state, &target);
    let label = if hard { "Hard refreshing" } else { "Refreshing" };
    match targets.as_slice() {
        [one] => state.set_status(format!("{label} {one}...")),
        many => state.set_status(format!("{label} {} app(s)...", many.len())),
    }
    debug!(count = targets.len(), hard, "engine: refresh requested");
    vec![Command::Refresh { targets, hard }]
}

/// Open the delete confirmation for the explicit app, the multi-select set or the cursor app.
pub fn open_delete(state: &mut State, explicit: Option<String>) -> Vec<Command> {
    let Some(target) = many_targets(state, explicit, "deletion") else { return Vec::new() };
    state.delete = Some(DeleteModal::new(target));
    state.mode = Mode::ConfirmDelete;
    Vec::new()
}

/// Commit the pending delete. The modal stays up with a loading flag until the result arrives.
pub fn confirm_delete(state: &mut State) -> Vec<Command> {
    let Some(modal) = state.delete.as_ref() else {
        state.mode = Mode::Normal;
        return Vec::new();
    };
    let (target, cascade, policy) = (modal.target.clone(), modal.cascade, modal.policy);
    if !require_server(state) {
        close_delete(state);
        return Vec::new();
    }
    let targets = target_names(state, &target);
    if targets.is_empty() {
        state.set_status("No applications selected");
        close_delete(state);
        return Vec::new();
    }
    if let Some(m) = state.delete.as_mut() {
        m.loading = true;
        m.error = None;
    }
    debug!(count = targets.len(), cascade, policy = policy.as_str(), "engine: delete confirmed");
    vec![Command::Delete { targets, cascade, policy }]
}

pub fn close_delete(state: &mut State) {
    state.delete = None;
    state.mode = Mode::Normal;
}

/// Metadata fetch for the selected rollback row when it has none and none is in flight.
pub fn request_row_metadata(state: &mut State) -> Vec<Command> {
    let Some(rb) = state.rollback.as_mut() else { return Vec::new() };
    let row = rb.selected;
    let app = rb.app.clone();
    let Some(r) = rb.rows.get_mut(row) else { return Vec::new() };
    if r.metadata.is_some() || r.meta_error.is_some() || r.meta_loading { return Vec::new(); }
    r.meta_loading = true;
    vec![Command::LoadRevisionMetadata { app, row, revision: r.revision.clone() }]
}

/// Enter in the rollback confirm phase. Cancel closes; Yes issues the rollback.
pub fn confirm_rollback(state: &mut State) -> Vec<Command> {
    let Some(rb) = state.rollback.as_mut() else {
        state.mode = Mode::Normal;
        return Vec::new();
    };
    if rb.confirm_choice == ConfirmChoice::Cancel {
        state.rollback = None;
        state.mode = Mode::Normal;
        return Vec::new();
    }
    let Some(row) = rb.selected_row() else {
        rb.phase = RollbackPhase::List;
        return Vec::new();
    };
    let request = RollbackRequest { id: row.id, name: rb.app.clone(), prune: rb.prune, dry_run: rb.dry_run, app_namespace: None };
    let watch = rb.watch;
    rb.loading = true;
    vec![Command::ExecuteRollback { request, watch }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_api::{PropagationPolicy, Server};
    use fleet_core::{Application, ScopeSet};

    fn state() -> State {
        let mut s = State::default();
        s.server = Some(Server { base_url: "fixture://t".into(), token: None, insecure: false });
        s.replace_apps(vec![Application::new("api").with_cluster("prod"), Application::new("web").with_cluster("prod")]);
        s
    }

    #[test]
    fn sync_modal_prefers_multi_select() {
        let mut s = state();
        s.selection.selected_apps = ScopeSet::single("web");
        open_sync_modal(&mut s, None);
        assert_eq!(s.mode, Mode::ConfirmSync);
        assert_eq!(s.modals.confirm_target, Some(Target::Multi));
        assert!(s.modals.confirm_watch);
        assert!(!s.modals.confirm_prune);
    }

    #[test]
    fn sync_modal_needs_apps_view() {
        let mut s = state();
        open_sync_modal(&mut s, None);
        assert_eq!(s.mode, Mode::Normal);
        assert_eq!(s.status, "Navigate to apps view to sync applications");
    }

    #[test]
    fn bulk_confirm_never_watches() {
        let mut s = state();
        s.selection.selected_apps = ["api", "web"].into_iter().collect();
        open_sync_modal(&mut s, None);
        s.modals.confirm_prune = true;
        let cmds = confirm_sync(&mut s);
        assert_eq!(
            cmds,
            vec![Command::Sync { targets: vec!["api".into(), "web".into()], prune: true, watch: false, bulk: true }]
        );
        assert!(s.modals.confirm_loading);
        assert_eq!(s.mode, Mode::ConfirmSync);
    }

    #[test]
    fn diff_refuses_multiple_and_needs_apps_view() {
        let mut s = state();
        s.selection.selected_apps = ["api", "web"].into_iter().collect();
        assert!(open_diff(&mut s, None).is_empty());
        assert_eq!(s.status, "Cannot show diff for multiple apps");
        s.selection.selected_apps.clear();
        assert!(open_diff(&mut s, None).is_empty());
        assert_eq!(s.status, "Navigate to apps view first to select an app for diff");
        s.change_view(View::Apps);
        assert_eq!(open_diff(&mut s, None), vec![Command::LoadDiff { app: "api".into() }]);
        assert_eq!(s.mode, Mode::DiffLoading);
    }

    #[test]
    fn rollback_uses_single_selection_outside_apps_view() {
        let mut s = state();
        s.selection.selected_apps = ScopeSet::single("web");
        assert_eq!(open_rollback(&mut s, None), vec![Command::LoadRollbackHistory { app: "web".into() }]);
        assert_eq!(s.mode, Mode::Rollback);
        assert!(s.rollback.as_ref().map(|r| r.loading).unwrap_or(false));
    }

    #[test]
    fn operations_need_a_server() {
        let mut s = state();
        s.server = None;
        assert!(open_diff(&mut s, Some("api".into())).is_empty());
        assert_eq!(s.status, "No server configured");
        assert!(reload(&mut s).is_empty());
        assert!(refresh_apps(&mut s, Some("api".into()), false).is_empty());
        assert_eq!(s.mode, Mode::Normal);
    }

    #[test]
    fn refresh_targets_one_app_or_the_selection() {
        let mut s = state();
        assert!(refresh_apps(&mut s, None, false).is_empty());
        assert_eq!(s.status, "Navigate to apps view first to select an app for refresh");
        s.change_view(View::Apps);
        assert_eq!(refresh_apps(&mut s, None, true), vec![Command::Refresh { targets: vec!["api".into()], hard: true }]);
        assert_eq!(s.status, "Hard refreshing api...");
        assert_eq!(s.mode, Mode::Normal);
        s.selection.selected_apps = ["api", "web"].into_iter().collect();
        assert_eq!(
            refresh_apps(&mut s, None, false),
            vec![Command::Refresh { targets: vec!["api".into(), "web".into()], hard: false }]
        );
        assert_eq!(s.status, "Refreshing 2 app(s)...");
    }

    #[test]
    fn delete_opens_a_modal_with_cascade_on() {
        let mut s = state();
        assert!(open_delete(&mut s, None).is_empty());
        assert_eq!(s.status, "Navigate to apps view first to select an app for deletion");
        assert!(s.delete.is_none());
        s.change_view(View::Apps);
        open_delete(&mut s, None);
        assert_eq!(s.mode, Mode::ConfirmDelete);
        let modal = s.delete.as_ref().map(|m| (m.target.clone(), m.cascade, m.policy));
        assert_eq!(modal, Some((Target::Single("api".into()), true, PropagationPolicy::Foreground)));
        let cmds = confirm_delete(&mut s);
        assert_eq!(
            cmds,
            vec![Command::Delete { targets: vec!["api".into()], cascade: true, policy: PropagationPolicy::Foreground }]
        );
        assert!(s.delete.as_ref().map(|m| m.loading).unwrap_or(false));
    }

    #[test]
    fn delete_without_server_closes_the_modal() {
        let mut s = state();
        s.server = None;
        open_delete(&mut s, Some("web".into()));
        assert!(confirm_delete(&mut s).is_empty());
        assert_eq!(s.status, "No server configured");
        assert!(s.delete.is_none());
        assert_eq!(s.mode, Mode::Normal);
    }

    #[test]
    fn resources_rejects_unknown_names() {
        let mut s = state();
        assert!(open_resources(&mut s, Some("nope".into())).is_empty());
        assert_eq!(s.status, "Unknown app: nope");
    }
}

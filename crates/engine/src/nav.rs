//! Hierarchy navigation and selection rules.

#![forbid(unsafe_code)]

use std::time::Instant;

use fleet_core::{Dimension, ScopeSet, View, VisibleRow};

use crate::actions;
use crate::msg::Command;
use crate::state::State;

pub fn move_up(state: &mut State) {
    if state.visible().is_empty() { return; }
    state.nav.cursor = state.nav.cursor.saturating_sub(1);
}

pub fn move_down(state: &mut State) {
    let n = state.visible().len();
    if n == 0 { return; }
    state.nav.cursor = (state.nav.cursor + 1).min(n - 1);
}

/// First `g` arms the gesture; a second within the window jumps to the top.
pub fn press_g(state: &mut State, now: Instant) -> bool {
    let window = state.timing.double_tap_window;
    match state.nav.last_g {
        Some(prev) if now.saturating_duration_since(prev) < window => {
            state.nav.cursor = 0;
            state.nav.last_g = None;
            true
        }
        _ => {
            state.nav.last_g = Some(now);
            false
        }
    }
}

pub fn go_bottom(state: &mut State) {
    state.nav.cursor = state.visible().len().saturating_sub(1);
}

/// Commit the cursor value as the current level's scope and descend one level.
/// On the apps view this opens the resource list for the cursor application.
pub fn drill_down(state: &mut State) -> Vec<Command> {
    let Some(row) = state.cursor_row() else { return Vec::new() };
    let view = state.nav.view;
    let value = match (&row, view.dimension()) {
        (VisibleRow::ScopeLabel(v), Some(_)) => v.clone(),
        (VisibleRow::Application(a), None) => return actions::open_resources(state, Some(a.name.clone())),
        _ => return Vec::new(),
    };
    let Some(dim) = view.dimension() else { return Vec::new() };
    *state.selection.scope_mut(dim) = ScopeSet::single(value);
    state.selection.clear_below(dim);
    if let Some(next) = view.child() { state.change_view(next); }
    state.ui.active_filter.clear();
    state.ui.search_query.clear();
    Vec::new()
}

/// Space on a row. Apps toggle membership in the multi-select set; scope rows replace
/// the level's scope with that single value (or clear it) and clear every deeper level.
pub fn toggle_selection(state: &mut State) {
    let Some(row) = state.cursor_row() else { return };
    match (row, state.nav.view.dimension()) {
        (VisibleRow::Application(a), None) => {
            state.selection.selected_apps.toggle(&a.name);
        }
        (VisibleRow::ScopeLabel(v), Some(dim)) => {
            state.selection.scope_mut(dim).toggle_single(&v);
            state.selection.clear_below(dim);
        }
        _ => {}
    }
}

/// Escape in Normal mode. With a filter on the apps view only the filter goes; otherwise
/// move up one level clearing the current and parent scopes. Clusters clears its own scope.
pub fn escape(state: &mut State) {
    let view = state.nav.view;
    if view == View::Apps && (!state.ui.active_filter.is_empty() || !state.ui.search_query.is_empty()) {
        state.ui.active_filter.clear();
        state.ui.search_query.clear();
        return;
    }
    state.clear_text_inputs();
    let sel = &mut state.selection;
    let up = match view {
        View::Apps => {
            sel.selected_apps.clear();
            sel.projects.clear();
            View::Projects
        }
        View::Projects => {
            sel.projects.clear();
            sel.namespaces.clear();
            View::Namespaces
        }
        View::Namespaces => {
            sel.namespaces.clear();
            sel.clusters.clear();
            View::Clusters
        }
        View::ApplicationSets => {
            sel.application_sets.clear();
            View::Clusters
        }
        View::Clusters => {
            sel.clusters.clear();
            View::Clusters
        }
    };
    state.change_view(up);
}

/// Set one level's scope from a typed value and descend, as if drilled from that level.
pub fn scope_and_descend(state: &mut State, dim: Dimension, value: String) {
    *state.selection.scope_mut(dim) = ScopeSet::single(value);
    state.selection.clear_below(dim);
    let next = View::listing(dim).child().unwrap_or(View::Apps);
    state.change_view(next);
}

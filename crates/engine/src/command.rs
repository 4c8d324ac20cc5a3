//! Typed command line: verb grammar and execution.

#![forbid(unsafe_code)]

use fleet_core::{Dimension, Mode, SortConfig, SortDirection, SortField, View};
use tracing::debug;

use crate::actions;
use crate::msg::Command;
use crate::nav;
use crate::state::State;
use crate::visible::scoped_values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Level(Dimension),
    App,
    Sync,
    Diff,
    Rollback,
    Resources,
    Logs,
    All,
    Up,
    Help,
    Quit,
    Reload,
    Refresh { hard: bool },
    Delete,
    Sort,
}

/// Every accepted spelling. The first alias of each verb is its canonical name.
pub const ALIASES: &[(&str, Verb)] = &[
    ("cluster", Verb::Level(Dimension::Cluster)),
    ("clusters", Verb::Level(Dimension::Cluster)),
    ("cls", Verb::Level(Dimension::Cluster)),
    ("context", Verb::Level(Dimension::Cluster)),
    ("ctx", Verb::Level(Dimension::Cluster)),
    ("namespace", Verb::Level(Dimension::Namespace)),
    ("namespaces", Verb::Level(Dimension::Namespace)),
    ("ns", Verb::Level(Dimension::Namespace)),
    ("project", Verb::Level(Dimension::Project)),
    ("projects", Verb::Level(Dimension::Project)),
    ("proj", Verb::Level(Dimension::Project)),
    ("appset", Verb::Level(Dimension::ApplicationSet)),
    ("appsets", Verb::Level(Dimension::ApplicationSet)),
    ("applicationset", Verb::Level(Dimension::ApplicationSet)),
    ("applicationsets", Verb::Level(Dimension::ApplicationSet)),
    ("as", Verb::Level(Dimension::ApplicationSet)),
    ("app", Verb::App),
    ("apps", Verb::App),
    ("sync", Verb::Sync),
    ("s", Verb::Sync),
    ("diff", Verb::Diff),
    ("d", Verb::Diff),
    ("rollback", Verb::Rollback),
    ("rb", Verb::Rollback),
    ("revert", Verb::Rollback),
    ("resources", Verb::Resources),
    ("res", Verb::Resources),
    ("r", Verb::Resources),
    ("logs", Verb::Logs),
    ("log", Verb::Logs),
    ("l", Verb::Logs),
    ("all", Verb::All),
    ("clear", Verb::All),
    ("reset", Verb::All),
    ("up", Verb::Up),
    ("back", Verb::Up),
    ("..", Verb::Up),
    ("help", Verb::Help),
    ("h", Verb::Help),
    ("?", Verb::Help),
    ("quit", Verb::Quit),
    ("q", Verb::Quit),
    ("q!", Verb::Quit),
    ("wq", Verb::Quit),
    ("wq!", Verb::Quit),
    ("exit", Verb::Quit),
    ("reload", Verb::Reload),
    ("refresh", Verb::Refresh { hard: false }),
    ("refresh!", Verb::Refresh { hard: true }),
    ("delete", Verb::Delete),
    ("del", Verb::Delete),
    ("sort", Verb::Sort),
];

pub fn parse_verb(word: &str) -> Option<Verb> {
    let word = word.to_ascii_lowercase();
    ALIASES.iter().find(|(alias, _)| *alias == word).map(|(_, v)| *v)
}

/// Split `:verb arg` into its verb word and optional trimmed argument.
pub fn split(raw: &str) -> (&str, Option<&str>) {
    let line = raw.trim().trim_start_matches(':').trim();
    match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => {
            let arg = arg.trim();
            (verb, (!arg.is_empty()).then_some(arg))
        }
        None => (line, None),
    }
}

/// Run a typed command. Always leaves Command mode; text inputs are cleared and the
/// cursor is kept on the application it pointed at before the filter went away.
pub fn execute(state: &mut State, raw: &str) -> Vec<Command> {
    let (word, arg) = split(raw);
    let arg = arg.map(str::to_string);
    let cursor_app = state.cursor_app();

    state.mode = Mode::Normal;
    state.clear_text_inputs();
    if let Some(name) = &cursor_app { focus_app(state, name); }
    state.clamp_cursor();

    if word.is_empty() { return Vec::new(); }
    let Some(verb) = parse_verb(word) else {
        let line = raw.trim().trim_start_matches(':').trim();
        state.set_status(format!("Unknown command: {line}"));
        return Vec::new();
    };
    debug!(verb = ?verb, arg = ?arg, "engine: command");

    match verb {
        Verb::Level(dim) => level(state, dim, arg),
        Verb::App => {
            match arg {
                Some(name) => select_app(state, &name),
                None => state.change_view(View::Apps),
            }
            Vec::new()
        }
        Verb::Sync => match known_app(state, arg) {
            Ok(name) => actions::open_sync_modal(state, name),
            Err(()) => Vec::new(),
        },
        Verb::Diff => match known_app(state, arg) {
            Ok(name) => actions::open_diff(state, name),
            Err(()) => Vec::new(),
        },
        Verb::Rollback => match known_app(state, arg) {
            Ok(name) => actions::open_rollback(state, name),
            Err(()) => Vec::new(),
        },
        Verb::Resources => actions::open_resources(state, arg),
        Verb::Logs => actions::open_logs(state),
        Verb::All => {
            state.selection.clear_all();
            state.nav.cursor = 0;
            state.set_status("All filtering cleared.");
            Vec::new()
        }
        Verb::Up => {
            nav::escape(state);
            Vec::new()
        }
        Verb::Help => {
            state.mode = Mode::Help;
            Vec::new()
        }
        Verb::Quit => vec![Command::Quit],
        Verb::Reload => actions::reload(state),
        Verb::Refresh { hard } => match known_app(state, arg) {
            Ok(name) => actions::refresh_apps(state, name, hard),
            Err(()) => Vec::new(),
        },
        Verb::Delete => match known_app(state, arg) {
            Ok(name) => actions::open_delete(state, name),
            Err(()) => Vec::new(),
        },
        Verb::Sort => {
            sort(state, arg.as_deref());
            Vec::new()
        }
    }
}

const SORT_USAGE: &str = "Use: :sort field direction (e.g., :sort name asc)";

/// `sort <name|sync|health> <asc|desc>`; bare `sort` reports the current order.
fn sort(state: &mut State, arg: Option<&str>) {
    let Some(arg) = arg else {
        let current = state.ui.sort.unwrap_or_default();
        state.set_status(format!("Current sort: {current}. Usage: :sort field direction (e.g., :sort name asc)"));
        return;
    };
    let parts: Vec<&str> = arg.split_whitespace().collect();
    let [field, direction] = parts.as_slice() else {
        state.set_status(format!("Invalid format. {SORT_USAGE}"));
        return;
    };
    let Ok(field) = field.parse::<SortField>() else {
        state.set_status("Invalid field. Use: name, sync, or health");
        return;
    };
    let Ok(direction) = direction.parse::<SortDirection>() else {
        state.set_status("Invalid direction. Use: asc or desc");
        return;
    };
    state.ui.sort = Some(SortConfig { field, direction });
    state.set_status(format!("Sorting by {} ({})", field.as_str(), direction.as_str()));
}

/// `cluster prod` scopes to `prod` and descends; bare `cluster` clears that level and below.
fn level(state: &mut State, dim: Dimension, arg: Option<String>) -> Vec<Command> {
    state.change_view(View::listing(dim));
    state.selection.selected_apps.clear();
    let Some(value) = arg else {
        state.selection.scope_mut(dim).clear();
        state.selection.clear_below(dim);
        return Vec::new();
    };
    let wanted = value.to_lowercase();
    let found = scoped_values(state, dim).into_iter().find(|v| v.to_lowercase() == wanted);
    match found {
        Some(canonical) => nav::scope_and_descend(state, dim, canonical),
        None => state.set_status(format!("Unknown {}: {value}", dim.label())),
    }
    Vec::new()
}

fn select_app(state: &mut State, name: &str) {
    if !state.has_app(name) {
        state.set_status(format!("Unknown app: {name}"));
        return;
    }
    state.change_view(View::Apps);
    state.selection.selected_apps.clear();
    state.selection.selected_apps.insert(name);
    focus_app(state, name);
}

fn known_app(state: &mut State, arg: Option<String>) -> Result<Option<String>, ()> {
    match arg {
        Some(name) if !state.has_app(&name) => {
            state.set_status(format!("Unknown app: {name}"));
            Err(())
        }
        other => Ok(other),
    }
}

fn focus_app(state: &mut State, name: &str) {
    if let Some(pos) = state.visible().iter().position(|r| r.as_application().map(|a| a.name == name).unwrap_or(false)) {
        state.nav.cursor = pos;
    }
}

//! The update step: one message in, state mutated in place, deferred work out.

#![forbid(unsafe_code)]

use std::time::Instant;

use fleet_api::{DirectoryError, WatchEvent};
use fleet_core::{Mode, View};
use tracing::{debug, info, warn};

use crate::actions;
use crate::command;
use crate::complete::complete;
use crate::msg::{Command, Key, Msg, Target};
use crate::nav;
use crate::state::{ApiErrorInfo, ConfirmChoice, DiffState, PagerState, RollbackPhase, RollbackRow, State};

/// Fold one message into `state`. `now` drives the escape debounce and the `gg` gesture.
pub fn update(state: &mut State, msg: Msg, now: Instant) -> Vec<Command> {
    match msg {
        Msg::Key(key) => on_key(state, key, now),
        Msg::ServerConfigured(server) => {
            info!(server = ?server, "engine: server configured");
            state.server = Some(server);
            state.mode = Mode::Loading;
            state.set_status("Loading applications...");
            vec![Command::LoadApplications, Command::FetchApiVersion]
        }
        Msg::AppsLoaded(apps) => {
            info!(count = apps.len(), "engine: apps loaded");
            state.replace_apps(apps);
            if state.mode == Mode::Loading { state.mode = Mode::Normal; }
            state.set_status(format!("Loaded {} applications", state.apps.len()));
            if state.watch_requested { return Vec::new(); }
            state.watch_requested = true;
            vec![Command::StartWatch]
        }
        Msg::WatchStarted => {
            state.watching = true;
            state.set_status("Watching for changes...");
            vec![Command::FetchNextEvent]
        }
        Msg::Watch(event) => {
            apply_watch_event(state, event);
            vec![Command::FetchNextEvent]
        }
        Msg::WatchFailed(err) => {
            state.watching = false;
            state.watch_requested = false;
            on_failure(state, err);
            Vec::new()
        }
        Msg::WatchClosed => {
            debug!("engine: watch closed");
            state.watching = false;
            state.watch_requested = false;
            Vec::new()
        }
        Msg::ApiVersion(v) => {
            match v {
                Some(v) => state.api_version = Some(v),
                None => state.set_status("Version: unknown"),
            }
            Vec::new()
        }
        Msg::Status(s) => {
            state.set_status(s);
            Vec::new()
        }
        Msg::Failed(err) => {
            on_failure(state, err);
            Vec::new()
        }
        Msg::SyncCompleted { app, watch } => {
            state.modals = Default::default();
            state.set_status(format!("Sync initiated for {app}"));
            if watch { return actions::open_resources(state, Some(app)); }
            state.mode = Mode::Normal;
            Vec::new()
        }
        Msg::MultiSyncCompleted { count } => {
            state.modals = Default::default();
            state.selection.selected_apps.clear();
            state.mode = Mode::Normal;
            state.set_status(format!("Sync initiated for {count} app(s)"));
            Vec::new()
        }
        Msg::Refreshed { targets, hard } => {
            let kind = if hard { "Hard refresh" } else { "Refresh" };
            match targets.as_slice() {
                [one] => state.set_status(format!("{kind} initiated for {one}")),
                many => {
                    state.selection.selected_apps.clear();
                    state.set_status(format!("{kind} initiated for {} app(s)", many.len()));
                }
            }
            Vec::new()
        }
        Msg::Deleted { names } => {
            let multi = state.delete.as_ref().map(|m| m.target == Target::Multi).unwrap_or(false);
            for name in &names { state.remove_app(name); }
            if multi { state.selection.selected_apps.clear(); }
            actions::close_delete(state);
            match names.as_slice() {
                [one] => state.set_status(format!("Deleted {one}")),
                many => state.set_status(format!("Deleted {} app(s)", many.len())),
            }
            Vec::new()
        }
        Msg::DeleteFailed { app, error } => {
            if error.is_auth() {
                state.delete = None;
                enter_auth_required(state, &error);
                return Vec::new();
            }
            warn!(app = %app, error = %error, "engine: delete failed");
            let message = format!("Failed to delete {app}: {}", error.message());
            if let Some(m) = state.delete.as_mut() {
                m.loading = false;
                m.confirmation.clear();
                m.error = Some(message.clone());
            }
            state.set_status(message);
            Vec::new()
        }
        Msg::RollbackHistoryLoaded { app, rows, current_revision } => {
            let Some(rb) = state.rollback.as_mut().filter(|rb| rb.app == app) else { return Vec::new() };
            rb.rows = rows.into_iter().map(RollbackRow::from).collect();
            rb.current_revision = current_revision;
            rb.selected = 0;
            rb.loading = false;
            actions::request_row_metadata(state)
        }
        Msg::RevisionMetadataLoaded { app, row, metadata } => {
            if let Some(r) = rollback_row(state, &app, row) {
                r.metadata = Some(metadata);
                r.meta_loading = false;
            }
            Vec::new()
        }
        Msg::RevisionMetadataFailed { app, row, error } => {
            if let Some(r) = rollback_row(state, &app, row) {
                r.meta_error = Some(error);
                r.meta_loading = false;
            }
            Vec::new()
        }
        Msg::RollbackExecuted { app, watch } => {
            state.rollback = None;
            state.set_status(format!("Rollback initiated for {app}"));
            if watch { return actions::open_resources(state, Some(app)); }
            state.mode = Mode::Normal;
            Vec::new()
        }
        Msg::DiffLoaded { app, lines } => {
            if state.mode != Mode::DiffLoading { return Vec::new(); }
            state.diff = Some(DiffState { title: format!("{app} (live vs desired)"), lines, offset: 0 });
            state.mode = Mode::Diff;
            state.set_status(String::new());
            Vec::new()
        }
        Msg::NoDiff(reason) => {
            if state.mode != Mode::DiffLoading { return Vec::new(); }
            state.mode = Mode::NoDiff;
            state.set_status(reason);
            Vec::new()
        }
        Msg::ResourcesLoaded { app, result } => {
            let Some(res) = state.resources.as_mut().filter(|r| r.app == app) else { return Vec::new() };
            res.loading = false;
            match result {
                Ok(nodes) => res.nodes = nodes,
                Err(e) => {
                    res.error = Some(e.message().to_string());
                    if e.is_auth() { enter_auth_required(state, &e); }
                }
            }
            Vec::new()
        }
        Msg::LogsLoaded(lines) => {
            state.pager = Some(PagerState { title: "Logs".into(), lines, offset: 0 });
            state.mode = Mode::Logs;
            state.error = None;
            state.set_status(String::new());
            Vec::new()
        }
    }
}

fn rollback_row<'a>(state: &'a mut State, app: &str, row: usize) -> Option<&'a mut RollbackRow> {
    state.rollback.as_mut().filter(|rb| rb.app == app).and_then(|rb| rb.rows.get_mut(row))
}

fn apply_watch_event(state: &mut State, event: WatchEvent) {
    match event {
        WatchEvent::AppsLoaded(apps) => {
            state.replace_apps(apps);
            if state.mode == Mode::Loading { state.mode = Mode::Normal; }
        }
        WatchEvent::AppUpdated(app) => state.upsert_app(app),
        WatchEvent::AppDeleted(name) => state.remove_app(&name),
        WatchEvent::StatusChange(s) => state.set_status(s),
        WatchEvent::AuthError(m) => enter_auth_required(state, &DirectoryError::Auth(m)),
        WatchEvent::ApiError(m) => enter_error(state, &DirectoryError::api(m)),
    }
}

fn enter_auth_required(state: &mut State, err: &DirectoryError) {
    warn!(error = %err, "engine: authentication required");
    state.error = Some(ApiErrorInfo::from(err));
    state.mode = Mode::AuthRequired;
}

fn enter_error(state: &mut State, err: &DirectoryError) {
    warn!(error = %err, "engine: api error");
    state.error = Some(ApiErrorInfo::from(err));
    state.mode = Mode::Error;
}

/// Units classify their errors before reporting; only the variant decides the mode here.
fn on_failure(state: &mut State, err: DirectoryError) {
    if let DirectoryError::Validation(m) = &err {
        state.set_status(m.clone());
        return;
    }
    state.modals = Default::default();
    state.delete = None;
    state.rollback = None;
    if state.mode == Mode::DiffLoading { state.diff = None; }
    if err.is_auth() { enter_auth_required(state, &err) } else { enter_error(state, &err) }
}

fn on_key(state: &mut State, key: Key, now: Instant) -> Vec<Command> {
    if key == Key::Esc {
        let debounce = state.timing.escape_debounce;
        if let Some(prev) = state.nav.last_esc {
            if now.saturating_duration_since(prev) < debounce {
                return Vec::new();
            }
        }
        state.nav.last_esc = Some(now);
    }
    match state.mode {
        Mode::Normal => normal_key(state, key, now),
        Mode::Loading => match key {
            Key::CtrlC | Key::Char('q') => vec![Command::Quit],
            _ => Vec::new(),
        },
        Mode::Search => search_key(state, key),
        Mode::Command => command_key(state, key),
        Mode::Help => {
            if matches!(key, Key::Esc | Key::Char('q') | Key::Char('?')) { state.mode = Mode::Normal; }
            quit_on_ctrl_c(key)
        }
        Mode::ConfirmSync => confirm_sync_key(state, key),
        Mode::ConfirmDelete => delete_key(state, key),
        Mode::Rollback => rollback_key(state, key, now),
        Mode::Diff => diff_key(state, key, now),
        Mode::DiffLoading => match key {
            Key::Esc | Key::Char('q') => {
                state.mode = Mode::Normal;
                state.diff = None;
                Vec::new()
            }
            other => quit_on_ctrl_c(other),
        },
        Mode::NoDiff => {
            state.mode = Mode::Normal;
            quit_on_ctrl_c(key)
        }
        Mode::Resources => resources_key(state, key, now),
        Mode::Logs => pager_key(state, key, now),
        Mode::AuthRequired => match key {
            Key::CtrlC | Key::Char('q') => vec![Command::Quit],
            Key::Char('l') => actions::open_logs(state),
            _ => Vec::new(),
        },
        Mode::Error => match key {
            Key::CtrlC => vec![Command::Quit],
            Key::Esc | Key::Char('q') => {
                if state.apps.is_empty() { return vec![Command::Quit]; }
                state.error = None;
                state.mode = Mode::Normal;
                Vec::new()
            }
            Key::Char('l') => {
                state.error = None;
                actions::open_logs(state)
            }
            _ => Vec::new(),
        },
    }
}

fn quit_on_ctrl_c(key: Key) -> Vec<Command> {
    if key == Key::CtrlC { vec![Command::Quit] } else { Vec::new() }
}

fn normal_key(state: &mut State, key: Key, now: Instant) -> Vec<Command> {
    if key != Key::Char('g') { state.nav.last_g = None; }
    let apps_view = state.nav.view == View::Apps;
    match key {
        Key::CtrlC => return vec![Command::Quit],
        Key::Char('j') | Key::Down => nav::move_down(state),
        Key::Char('k') | Key::Up => nav::move_up(state),
        Key::Char(' ') => nav::toggle_selection(state),
        Key::Enter => return nav::drill_down(state),
        Key::Char('/') => {
            state.mode = Mode::Search;
            state.ui.search_query = state.ui.active_filter.clone();
        }
        Key::Char(':') => {
            state.mode = Mode::Command;
            state.ui.command.clear();
        }
        Key::Char('?') => state.mode = Mode::Help,
        Key::Char('g') => {
            nav::press_g(state, now);
        }
        Key::Char('G') => nav::go_bottom(state),
        Key::Esc => nav::escape(state),
        Key::Char('s') if apps_view => return actions::open_sync_modal(state, None),
        Key::Char('d') if apps_view => return actions::open_diff(state, None),
        Key::Char('R') if apps_view => return actions::open_rollback(state, None),
        Key::Char('r') if apps_view => return actions::open_resources(state, None),
        Key::CtrlD if apps_view => return actions::open_delete(state, None),
        _ => {}
    }
    Vec::new()
}

fn search_key(state: &mut State, key: Key) -> Vec<Command> {
    match key {
        Key::CtrlC => return vec![Command::Quit],
        Key::Esc => {
            state.ui.search_query.clear();
            state.mode = Mode::Normal;
            state.clamp_cursor();
        }
        Key::Enter => {
            if state.nav.view == View::Apps {
                state.ui.active_filter = std::mem::take(&mut state.ui.search_query);
                state.mode = Mode::Normal;
                state.nav.cursor = 0;
            } else {
                // Still in Search here, so the cursor indexes the filtered rows.
                let cmds = nav::drill_down(state);
                state.ui.search_query.clear();
                state.mode = Mode::Normal;
                state.clamp_cursor();
                return cmds;
            }
        }
        Key::Backspace => {
            state.ui.search_query.pop();
            state.nav.cursor = 0;
        }
        Key::Up => nav::move_up(state),
        Key::Down => nav::move_down(state),
        Key::Char(c) => {
            state.ui.search_query.push(c);
            state.nav.cursor = 0;
        }
        _ => {}
    }
    Vec::new()
}

fn command_key(state: &mut State, key: Key) -> Vec<Command> {
    match key {
        Key::CtrlC => return vec![Command::Quit],
        Key::Esc => {
            state.ui.command.clear();
            state.mode = Mode::Normal;
        }
        Key::Enter => {
            let line = std::mem::take(&mut state.ui.command);
            return command::execute(state, &line);
        }
        Key::Tab => {
            if let Some(first) = complete(state, &state.ui.command).into_iter().next() {
                state.ui.command = first;
            }
        }
        Key::Backspace => {
            if state.ui.command.pop().is_none() { state.mode = Mode::Normal; }
        }
        Key::Char(c) => state.ui.command.push(c),
        _ => {}
    }
    Vec::new()
}

fn confirm_sync_key(state: &mut State, key: Key) -> Vec<Command> {
    if state.modals.confirm_loading {
        return quit_on_ctrl_c(key);
    }
    match key {
        Key::CtrlC => return vec![Command::Quit],
        Key::Esc | Key::Char('q') => actions::close_sync_modal(state),
        Key::Char('h') | Key::Left => state.modals.confirm_choice = ConfirmChoice::Yes,
        Key::Char('l') | Key::Right => state.modals.confirm_choice = ConfirmChoice::Cancel,
        Key::Enter => {
            if state.modals.confirm_choice == ConfirmChoice::Cancel {
                actions::close_sync_modal(state);
            } else {
                return actions::confirm_sync(state);
            }
        }
        Key::Char('y') => return actions::confirm_sync(state),
        Key::Char('p') => state.modals.confirm_prune = !state.modals.confirm_prune,
        Key::Char('w') => state.modals.confirm_watch = !state.modals.confirm_watch,
        _ => {}
    }
    Vec::new()
}

/// Typing `y` or `Y` commits. Any other character is shown as the pending answer.
fn delete_key(state: &mut State, key: Key) -> Vec<Command> {
    let Some(modal) = state.delete.as_mut() else {
        state.mode = Mode::Normal;
        return quit_on_ctrl_c(key);
    };
    if modal.loading { return Vec::new(); }
    match key {
        Key::Esc | Key::CtrlC | Key::Char('q') => actions::close_delete(state),
        Key::Backspace => {
            modal.confirmation.pop();
        }
        Key::Char('c') => modal.cascade = !modal.cascade,
        Key::Char('p') => modal.policy = modal.policy.next(),
        Key::Char(c) => {
            modal.confirmation = c.to_string();
            if c.eq_ignore_ascii_case(&'y') { return actions::confirm_delete(state); }
        }
        _ => {}
    }
    Vec::new()
}

fn rollback_key(state: &mut State, key: Key, now: Instant) -> Vec<Command> {
    if matches!(key, Key::Esc | Key::Char('q') | Key::CtrlC) {
        state.rollback = None;
        state.mode = Mode::Normal;
        return if key == Key::CtrlC { vec![Command::Quit] } else { Vec::new() };
    }
    let window = state.timing.double_tap_window;
    let Some(rb) = state.rollback.as_mut() else {
        state.mode = Mode::Normal;
        return Vec::new();
    };
    if rb.loading { return Vec::new(); }
    if key != Key::Char('g') { state.nav.last_g = None; }

    let phase = rb.phase;
    match phase {
        RollbackPhase::List => {
            let last = rb.rows.len().saturating_sub(1);
            let before = rb.selected;
            match key {
                Key::Char('j') | Key::Down => rb.selected = (rb.selected + 1).min(last),
                Key::Char('k') | Key::Up => rb.selected = rb.selected.saturating_sub(1),
                Key::Char('G') => rb.selected = last,
                Key::Char('g') => match state.nav.last_g {
                    Some(prev) if now.saturating_duration_since(prev) < window => {
                        rb.selected = 0;
                        state.nav.last_g = None;
                    }
                    _ => state.nav.last_g = Some(now),
                },
                Key::Enter if !rb.rows.is_empty() => {
                    rb.phase = RollbackPhase::Confirm;
                    rb.confirm_choice = ConfirmChoice::Yes;
                }
                _ => {}
            }
            if rb.selected != before { return actions::request_row_metadata(state); }
            Vec::new()
        }
        RollbackPhase::Confirm => {
            match key {
                Key::Char('h') | Key::Left => rb.confirm_choice = ConfirmChoice::Yes,
                Key::Char('l') | Key::Right => rb.confirm_choice = ConfirmChoice::Cancel,
                Key::Char('p') => rb.prune = !rb.prune,
                Key::Char('w') => rb.watch = !rb.watch,
                Key::Char('d') => rb.dry_run = !rb.dry_run,
                Key::Enter => return actions::confirm_rollback(state),
                _ => {}
            }
            Vec::new()
        }
    }
}

/// j/k/g/G over a line count; returns the new offset.
fn scroll(offset: usize, len: usize, key: Key, last_g: &mut Option<Instant>, now: Instant, window: std::time::Duration) -> usize {
    let last = len.saturating_sub(1);
    match key {
        Key::Char('j') | Key::Down => (offset + 1).min(last),
        Key::Char('k') | Key::Up => offset.saturating_sub(1),
        Key::Char('G') => last,
        Key::Char('g') => match *last_g {
            Some(prev) if now.saturating_duration_since(prev) < window => {
                *last_g = None;
                0
            }
            _ => {
                *last_g = Some(now);
                offset
            }
        },
        _ => offset,
    }
}

fn diff_key(state: &mut State, key: Key, now: Instant) -> Vec<Command> {
    match key {
        Key::CtrlC => vec![Command::Quit],
        Key::Esc | Key::Char('q') => {
            state.diff = None;
            state.mode = Mode::Normal;
            Vec::new()
        }
        _ => {
            let window = state.timing.double_tap_window;
            if let Some(d) = state.diff.as_mut() {
                d.offset = scroll(d.offset, d.lines.len(), key, &mut state.nav.last_g, now, window);
            }
            Vec::new()
        }
    }
}

fn resources_key(state: &mut State, key: Key, now: Instant) -> Vec<Command> {
    match key {
        Key::CtrlC => vec![Command::Quit],
        Key::Esc | Key::Char('q') => {
            state.resources = None;
            state.mode = Mode::Normal;
            Vec::new()
        }
        _ => {
            let window = state.timing.double_tap_window;
            if let Some(r) = state.resources.as_mut() {
                r.offset = scroll(r.offset, r.nodes.len(), key, &mut state.nav.last_g, now, window);
            }
            Vec::new()
        }
    }
}

fn pager_key(state: &mut State, key: Key, now: Instant) -> Vec<Command> {
    match key {
        Key::CtrlC => vec![Command::Quit],
        Key::Esc | Key::Char('q') => {
            state.pager = None;
            state.mode = Mode::Normal;
            Vec::new()
        }
        _ => {
            let window = state.timing.double_tap_window;
            if let Some(p) = state.pager.as_mut() {
                p.offset = scroll(p.offset, p.lines.len(), key, &mut state.nav.last_g, now, window);
            }
            Vec::new()
        }
    }
}

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_api::{MockDirectory, Server};
use fleet_core::{Application, Mode, View};
use fleet_engine::{update, Command, Dispatcher, EngineConfig, Key, Msg, State};
use tokio::sync::mpsc;

fn mock(failing: Option<&str>) -> MockDirectory {
    let mut m = MockDirectory::with_apps(vec![
        Application::new("alpha").with_cluster("prod"),
        Application::new("beta").with_cluster("prod"),
    ]);
    if let Some(name) = failing {
        m.sync_failures.insert(name.to_string(), "connection reset by peer".to_string());
    }
    m
}

fn ready_state() -> State {
    let mut s = State::default();
    let t = Instant::now();
    update(&mut s, Msg::ServerConfigured(Server { base_url: "fixture://bulk".into(), token: None, insecure: false }), t);
    update(&mut s, Msg::AppsLoaded(vec![Application::new("alpha").with_cluster("prod"), Application::new("beta").with_cluster("prod")]), t);
    s.change_view(View::Apps);
    s
}

/// Select both apps, open the modal and confirm; returns the single sync command.
fn confirm_bulk(s: &mut State) -> Command {
    let t = Instant::now();
    let mut cmds = Vec::new();
    for (i, k) in [Key::Char(' '), Key::Char('j'), Key::Char(' '), Key::Char('s'), Key::Char('y')].into_iter().enumerate() {
        cmds.extend(update(s, Msg::Key(k), t + Duration::from_millis(250 * i as u64)));
    }
    assert_eq!(cmds.len(), 1);
    cmds.remove(0)
}

#[tokio::test]
async fn bulk_sync_stops_at_failure_and_names_the_app() {
    let mut s = ready_state();
    let cmd = confirm_bulk(&mut s);
    assert_eq!(cmd, Command::Sync { targets: vec!["alpha".into(), "beta".into()], prune: false, watch: false, bulk: true });

    let api = Arc::new(mock(Some("beta")));
    let (tx, _rx) = mpsc::unbounded_channel();
    let d = Dispatcher::new(api.clone(), tx, EngineConfig::default());
    let msg = d.execute(cmd).await.expect("sync yields a message");
    assert_eq!(api.calls(), vec!["sync:alpha".to_string(), "sync:beta".to_string()]);

    update(&mut s, msg, Instant::now());
    assert_eq!(s.mode, Mode::Error);
    let err = s.error.clone().expect("error retained");
    assert!(err.message.contains("Failed to sync beta"), "{}", err.message);
    assert!(!s.status.contains("Sync initiated"));
    assert_eq!(s.selection.selected_apps.len(), 2);
}

#[tokio::test]
async fn first_failure_skips_the_rest() {
    let mut s = ready_state();
    let cmd = confirm_bulk(&mut s);
    let api = Arc::new(mock(Some("alpha")));
    let (tx, _rx) = mpsc::unbounded_channel();
    let d = Dispatcher::new(api.clone(), tx, EngineConfig::default());
    let msg = d.execute(cmd).await.expect("sync yields a message");
    assert_eq!(api.calls(), vec!["sync:alpha".to_string()]);
    assert!(matches!(msg, Msg::Failed(ref e) if e.message().starts_with("Failed to sync alpha: ")));
}

#[tokio::test]
async fn bulk_success_clears_multi_select() {
    let mut s = ready_state();
    let cmd = confirm_bulk(&mut s);
    let (tx, _rx) = mpsc::unbounded_channel();
    let d = Dispatcher::new(Arc::new(mock(None)), tx, EngineConfig::default());
    let msg = d.execute(cmd).await.expect("sync yields a message");
    update(&mut s, msg, Instant::now());
    assert_eq!(s.mode, Mode::Normal);
    assert_eq!(s.status, "Sync initiated for 2 app(s)");
    assert!(s.selection.selected_apps.is_empty());
}

#[tokio::test]
async fn auth_failure_during_sync_requires_login() {
    let mut s = ready_state();
    let cmd = confirm_bulk(&mut s);
    let mut m = mock(None);
    m.sync_failures.insert("alpha".into(), "rpc error: code = Unauthenticated desc = invalid session token".into());
    let (tx, _rx) = mpsc::unbounded_channel();
    let d = Dispatcher::new(Arc::new(m), tx, EngineConfig::default());
    let msg = d.execute(cmd).await.expect("sync yields a message");
    update(&mut s, msg, Instant::now());
    assert_eq!(s.mode, Mode::AuthRequired);
    assert!(s.modals.confirm_target.is_none());
}

#[tokio::test]
async fn auth_looking_app_name_does_not_trip_the_auth_check() {
    let mut s = State::default();
    let t = Instant::now();
    update(&mut s, Msg::ServerConfigured(Server { base_url: "fixture://bulk".into(), token: None, insecure: false }), t);
    update(&mut s, Msg::AppsLoaded(vec![Application::new("oauth-proxy").with_cluster("prod")]), t);
    s.change_view(View::Apps);
    let mut cmds = update(&mut s, Msg::Key(Key::Char('s')), t);
    cmds.extend(update(&mut s, Msg::Key(Key::Char('y')), t + Duration::from_millis(250)));
    assert_eq!(cmds.len(), 1);

    let mut m = MockDirectory::with_apps(vec![Application::new("oauth-proxy").with_cluster("prod")]);
    m.sync_failures.insert("oauth-proxy".into(), "connection reset by peer".into());
    let (tx, _rx) = mpsc::unbounded_channel();
    let d = Dispatcher::new(Arc::new(m), tx, EngineConfig::default());
    let msg = d.execute(cmds.remove(0)).await.expect("sync yields a message");
    update(&mut s, msg, t);
    assert_eq!(s.mode, Mode::Error);
    let err = s.error.clone().expect("error retained");
    assert_eq!(err.message, "Failed to sync oauth-proxy: connection reset by peer");
}

#[tokio::test]
async fn bulk_delete_removes_every_selected_app() {
    let mut s = ready_state();
    let t = Instant::now();
    let mut cmds = Vec::new();
    let keys = [Key::Char(' '), Key::Char('j'), Key::Char(' '), Key::CtrlD, Key::Char('p'), Key::Char('y')];
    for (i, k) in keys.into_iter().enumerate() {
        cmds.extend(update(&mut s, Msg::Key(k), t + Duration::from_millis(250 * i as u64)));
    }
    assert_eq!(
        cmds,
        vec![Command::Delete {
            targets: vec!["alpha".into(), "beta".into()],
            cascade: true,
            policy: fleet_api::PropagationPolicy::Background,
        }]
    );

    let api = Arc::new(mock(None));
    let (tx, _rx) = mpsc::unbounded_channel();
    let d = Dispatcher::new(api.clone(), tx, EngineConfig::default());
    let msg = d.execute(cmds.remove(0)).await.expect("delete yields a message");
    assert_eq!(api.calls(), vec!["delete:alpha".to_string(), "delete:beta".to_string()]);
    update(&mut s, msg, Instant::now());
    assert_eq!(s.mode, Mode::Normal);
    assert_eq!(s.status, "Deleted 2 app(s)");
    assert!(s.apps.is_empty());
    assert!(s.selection.selected_apps.is_empty());
}

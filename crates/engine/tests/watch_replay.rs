#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_api::{Directory, MockDirectory, Server, WatchEvent};
use fleet_core::{Application, Mode};
use fleet_engine::{update, Command, Engine, EngineConfig, Msg, State, WatchBridge};

fn app(name: &str, sync: &str) -> Application {
    Application::new(name).with_cluster("prod").with_status(sync, "Healthy")
}

fn replay_events() -> Vec<WatchEvent> {
    vec![
        WatchEvent::AppsLoaded(vec![app("a", "Synced"), app("b", "Synced")]),
        WatchEvent::AppUpdated(app("a", "OutOfSync")),
        WatchEvent::AppUpdated(app("c", "Synced")),
        WatchEvent::AppUpdated(app("a", "Synced")),
    ]
}

#[tokio::test]
async fn events_apply_strictly_one_at_a_time_in_order() {
    let mock = MockDirectory { watch_events: replay_events(), ..Default::default() };
    let handle = mock.watch_applications().await.expect("watch opens");
    let mut bridge = WatchBridge::from_handle(handle, 100);

    let mut s = State::default();
    let t = Instant::now();
    let mut applied = 0;
    // The loop only asks for the next event after the previous one is folded in.
    let mut cmds = update(&mut s, Msg::WatchStarted, t);
    while cmds == vec![Command::FetchNextEvent] {
        match bridge.next().await {
            Some(ev) => {
                cmds = update(&mut s, Msg::Watch(ev), t);
                applied += 1;
            }
            None => {
                cmds = update(&mut s, Msg::WatchClosed, t);
            }
        }
    }
    assert!(cmds.is_empty());
    assert_eq!(applied, 4);

    let names: Vec<(&str, &str)> = s.apps.iter().map(|a| (a.name.as_str(), a.sync.as_str())).collect();
    assert_eq!(names, vec![("a", "Synced"), ("b", "Synced"), ("c", "Synced")]);
    assert_eq!(s.index.as_ref().map(|i| i.total()), Some(3));
    assert!(!s.watching);
}

#[tokio::test]
async fn intermediate_states_match_arrival_order() {
    let mut s = State::default();
    let t = Instant::now();
    let mut seen = Vec::new();
    for ev in replay_events() {
        update(&mut s, Msg::Watch(ev), t);
        seen.push(s.apps.iter().find(|a| a.name == "a").map(|a| a.sync.clone()).unwrap_or_default());
    }
    assert_eq!(seen, vec!["Synced", "OutOfSync", "OutOfSync", "Synced"]);
}

#[tokio::test]
async fn engine_consumes_watch_and_publishes_final_frame() {
    let mock = MockDirectory {
        apps: vec![app("a", "Unknown")],
        watch_events: replay_events(),
        ..Default::default()
    };
    let (mut engine, handle) = Engine::new(Arc::new(mock), EngineConfig::default());
    let mut epochs = handle.subscribe_epoch();
    engine.step(Msg::ServerConfigured(Server { base_url: "fixture://w".into(), token: None, insecure: false }));
    engine.settle(Duration::from_secs(2)).await;

    assert_eq!(engine.pending(), 0);
    assert_eq!(engine.state().mode, Mode::Normal);
    let frame = handle.current();
    assert_eq!(frame.total_apps, 3);
    assert!(epochs.has_changed().unwrap_or(false));
    assert_eq!(*epochs.borrow_and_update(), frame.epoch);
}

#[tokio::test]
async fn auth_error_event_keeps_the_bridge_alive() {
    let events = vec![WatchEvent::AuthError("token expired".into()), WatchEvent::AppDeleted("a".into())];
    let mut bridge = WatchBridge::spawn(futures::stream::iter(events), 4);
    let mut s = State::default();
    let t = Instant::now();
    update(&mut s, Msg::AppsLoaded(vec![app("a", "Synced")]), t);

    let first = bridge.next().await.expect("first event");
    assert_eq!(update(&mut s, Msg::Watch(first), t), vec![Command::FetchNextEvent]);
    assert_eq!(s.mode, Mode::AuthRequired);
    let second = bridge.next().await.expect("second event");
    update(&mut s, Msg::Watch(second), t);
    assert!(s.apps.is_empty());
    assert!(bridge.next().await.is_none());
}

//! Engine loop: applies messages one at a time, dispatches their commands and
//! publishes an immutable frame after every step.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use fleet_api::Directory;
use fleet_core::{Mode, Selection, SortConfig, View, VisibleRow};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::msg::{Command, Msg};
use crate::state::{ApiErrorInfo, State};
use crate::update::update;

/// What a renderer needs for one paint.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub epoch: u64,
    pub view: View,
    pub mode: Mode,
    pub cursor: usize,
    pub rows: Vec<VisibleRow>,
    pub status: String,
    pub selection: Selection,
    pub filter: String,
    pub total_apps: usize,
    pub watching: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorInfo>,
}

impl Frame {
    pub fn capture(state: &State, epoch: u64) -> Self {
        Self {
            epoch,
            view: state.nav.view,
            mode: state.mode,
            cursor: state.nav.cursor,
            rows: state.visible(),
            status: state.status.clone(),
            selection: state.selection.clone(),
            filter: crate::visible::filter_text(state).to_string(),
            total_apps: state.index.as_ref().map(|i| i.total()).unwrap_or(0),
            watching: state.watching,
            sort: state.ui.sort,
            error: state.error.clone(),
        }
    }
}

/// Reader side: latest frame plus epoch notifications, and an input sender.
#[derive(Clone)]
pub struct EngineHandle {
    frame: Arc<ArcSwap<Frame>>,
    epoch_rx: watch::Receiver<u64>,
    input_tx: mpsc::UnboundedSender<Msg>,
}

impl EngineHandle {
    pub fn current(&self) -> Arc<Frame> { self.frame.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
    /// Queue input for the engine. Returns false once the engine has stopped.
    pub fn send(&self, msg: Msg) -> bool { self.input_tx.send(msg).is_ok() }
}

pub struct Engine {
    state: State,
    dispatcher: Dispatcher,
    units_rx: mpsc::UnboundedReceiver<Msg>,
    input_rx: mpsc::UnboundedReceiver<Msg>,
    pending: usize,
    frame: Arc<ArcSwap<Frame>>,
    epoch_tx: watch::Sender<u64>,
    epoch: u64,
    quit: bool,
}

impl Engine {
    pub fn new(api: Arc<dyn Directory>, config: EngineConfig) -> (Self, EngineHandle) {
        let (units_tx, units_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let state = State::new(&config);
        let frame = Arc::new(ArcSwap::from_pointee(Frame::capture(&state, 0)));
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        let engine = Self {
            state,
            dispatcher: Dispatcher::new(api, units_tx, config),
            units_rx,
            input_rx,
            pending: 0,
            frame: Arc::clone(&frame),
            epoch_tx,
            epoch: 0,
            quit: false,
        };
        (engine, EngineHandle { frame, epoch_rx, input_tx })
    }

    pub fn state(&self) -> &State { &self.state }
    pub fn is_quit(&self) -> bool { self.quit }
    pub fn pending(&self) -> usize { self.pending }

    /// Apply one message at `now`, dispatch the resulting commands and publish a frame.
    pub fn step_at(&mut self, msg: Msg, now: Instant) {
        for cmd in update(&mut self.state, msg, now) {
            if cmd == Command::Quit {
                info!("engine: quit requested");
                self.quit = true;
                continue;
            }
            if self.dispatcher.dispatch(cmd).is_some() { self.pending += 1; }
        }
        self.publish();
    }

    pub fn step(&mut self, msg: Msg) { self.step_at(msg, Instant::now()) }

    fn publish(&mut self) {
        self.epoch = self.epoch.saturating_add(1);
        self.frame.store(Arc::new(Frame::capture(&self.state, self.epoch)));
        let _ = self.epoch_tx.send(self.epoch);
    }

    fn on_unit(&mut self, msg: Msg) {
        self.pending = self.pending.saturating_sub(1);
        self.step(msg);
    }

    /// Apply unit results until none are outstanding or nothing arrives for `idle`.
    /// Returns how many results were applied.
    pub async fn settle(&mut self, idle: Duration) -> usize {
        let mut applied = 0;
        while self.pending > 0 && !self.quit {
            match tokio::time::timeout(idle, self.units_rx.recv()).await {
                Ok(Some(msg)) => {
                    self.on_unit(msg);
                    applied += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(pending = self.pending, "engine: settle idle timeout");
                    break;
                }
            }
        }
        applied
    }

    /// Serve input and unit results until quit or every input sender is gone.
    pub async fn run(mut self) -> State {
        info!("engine: loop started");
        while !self.quit {
            tokio::select! {
                Some(msg) = self.units_rx.recv() => self.on_unit(msg),
                maybe = self.input_rx.recv() => match maybe {
                    Some(msg) => self.step(msg),
                    None => break,
                },
            }
        }
        info!(epoch = self.epoch, "engine: loop stopped");
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Key;
    use fleet_api::{MockDirectory, Server, WatchEvent};
    use fleet_core::Application;

    fn server() -> Server { Server { base_url: "fixture://t".into(), token: None, insecure: false } }

    #[tokio::test]
    async fn startup_settles_through_watch_closure() {
        let mock = MockDirectory {
            apps: vec![Application::new("a").with_cluster("c1"), Application::new("b").with_cluster("c2")],
            watch_events: vec![WatchEvent::AppDeleted("b".into())],
            version: Some("v2.11".into()),
            ..Default::default()
        };
        let (mut engine, handle) = Engine::new(Arc::new(mock), EngineConfig::default());
        engine.step(Msg::ServerConfigured(server()));
        engine.settle(Duration::from_secs(2)).await;

        let s = engine.state();
        assert_eq!(s.mode, Mode::Normal);
        assert_eq!(s.apps.len(), 1);
        assert_eq!(s.api_version.as_deref(), Some("v2.11"));
        assert!(!s.watching);
        assert_eq!(engine.pending(), 0);
        let frame = handle.current();
        assert_eq!(frame.total_apps, 1);
        assert_eq!(*handle.subscribe_epoch().borrow(), frame.epoch);
    }

    #[tokio::test]
    async fn quit_key_stops_run_loop() {
        let (engine, handle) = Engine::new(Arc::new(MockDirectory::new()), EngineConfig::default());
        let task = tokio::spawn(engine.run());
        assert!(handle.send(Msg::Key(Key::CtrlC)));
        let state = task.await.unwrap();
        assert_eq!(state.mode, Mode::Normal);
    }
}

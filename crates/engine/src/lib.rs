//! Fleet engine: navigation state, the mode state machine, command dispatch and the
//! watch event bridge.
//!
//! All mutation happens in [`update::update`] on one logical thread. Background work is
//! expressed as [`msg::Command`] values that the [`dispatch::Dispatcher`] turns into tokio
//! tasks, each posting exactly one [`msg::Msg`] back.

#![forbid(unsafe_code)]

pub mod actions;
pub mod bridge;
pub mod command;
pub mod complete;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod msg;
pub mod nav;
pub mod runtime;
pub mod state;
pub mod update;
pub mod visible;

pub use bridge::WatchBridge;
pub use config::{EngineConfig, Timeouts};
pub use dispatch::Dispatcher;
pub use msg::{parse_script, Command, Key, Msg, Target};
pub use runtime::{Engine, EngineHandle, Frame};
pub use state::{DeleteModal, State};
pub use update::update;

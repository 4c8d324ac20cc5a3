//! Deferred background units. Each command runs on the tokio runtime and posts
//! exactly one `Msg` back to the update loop; units never touch `State`.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_api::{DeleteRequest, Directory, DirectoryError, DirectoryResult, PropagationPolicy};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::WatchBridge;
use crate::config::EngineConfig;
use crate::diff::{self, DiffOutcome};
use crate::msg::{Command, Msg};

#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn Directory>,
    tx: mpsc::UnboundedSender<Msg>,
    config: EngineConfig,
    bridge: Arc<Mutex<Option<WatchBridge>>>,
}

/// Classify the raw collaborator error, then prefix it with the operation context.
/// The auth heuristic never sees the context, which may carry an application name.
fn failed(err: DirectoryError, ctx: &str) -> Msg {
    Msg::Failed(err.normalize().with_context(ctx))
}

/// Apply a deadline; expiry becomes a plain API error naming the operation.
pub async fn with_deadline<T, F>(op: &str, limit: Duration, fut: F) -> DirectoryResult<T>
where
    F: Future<Output = DirectoryResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(r) => r,
        Err(_) => Err(DirectoryError::api(format!("{op} timed out after {}s", limit.as_secs()))),
    }
}

impl Dispatcher {
    pub fn new(api: Arc<dyn Directory>, tx: mpsc::UnboundedSender<Msg>, config: EngineConfig) -> Self {
        Self { api, tx, config, bridge: Arc::new(Mutex::new(None)) }
    }

    /// Spawn the unit for `cmd`. `Quit` has no unit and returns `None`.
    pub fn dispatch(&self, cmd: Command) -> Option<JoinHandle<()>> {
        if cmd == Command::Quit { return None; }
        metrics::counter!("commands_dispatched_total", 1u64, "kind" => cmd.kind());
        let this = self.clone();
        Some(tokio::spawn(async move {
            if let Some(msg) = this.execute(cmd).await {
                if this.tx.send(msg).is_err() { debug!("dispatch: update loop gone"); }
            }
        }))
    }

    /// Run one unit inline and return its result message.
    pub async fn execute(&self, cmd: Command) -> Option<Msg> {
        let t0 = Instant::now();
        let kind = cmd.kind();
        let t = self.config.timeouts;
        let api = self.api.as_ref();
        let msg = match cmd {
            Command::Quit => return None,
            Command::LoadApplications => match with_deadline("list", t.list, api.list_applications()).await {
                Ok(apps) => Msg::AppsLoaded(apps),
                Err(e) => failed(e, "Failed to load applications"),
            },
            Command::StartWatch => match with_deadline("watch", t.list, api.watch_applications()).await {
                Ok(handle) => {
                    let bridge = WatchBridge::from_handle(handle, self.config.watch_queue_capacity);
                    *self.bridge.lock().await = Some(bridge);
                    Msg::WatchStarted
                }
                Err(e) => Msg::WatchFailed(e.normalize().with_context("Failed to start watch")),
            },
            Command::FetchNextEvent => {
                let mut guard = self.bridge.lock().await;
                let next = match guard.as_mut() {
                    Some(b) => b.next().await,
                    None => None,
                };
                match next {
                    Some(ev) => Msg::Watch(ev),
                    None => {
                        *guard = None;
                        Msg::WatchClosed
                    }
                }
            }
            Command::FetchApiVersion => match with_deadline("version", t.version, api.get_api_version()).await {
                Ok(v) => Msg::ApiVersion(Some(v)),
                Err(e) => {
                    debug!(error = %e, "dispatch: version unavailable");
                    Msg::ApiVersion(None)
                }
            },
            Command::Sync { targets, prune, watch, bulk } => self.sync(targets, prune, watch, bulk).await,
            Command::Refresh { targets, hard } => self.refresh(targets, hard).await,
            Command::Delete { targets, cascade, policy } => self.delete(targets, cascade, policy).await,
            Command::LoadRollbackHistory { app } => {
                match with_deadline("history", t.history, api.get_application(&app)).await {
                    Ok(detail) => {
                        let mut rows = detail.history;
                        rows.sort_by(|a, b| b.id.cmp(&a.id));
                        Msg::RollbackHistoryLoaded { app, rows, current_revision: detail.current_revision }
                    }
                    Err(e) => failed(e, "Failed to load rollback history"),
                }
            }
            Command::LoadRevisionMetadata { app, row, revision } => {
                match with_deadline("metadata", t.metadata, api.get_revision_metadata(&app, &revision)).await {
                    Ok(metadata) => Msg::RevisionMetadataLoaded { app, row, metadata },
                    Err(e) => Msg::RevisionMetadataFailed { app, row, error: e.to_string() },
                }
            }
            Command::ExecuteRollback { request, watch } => {
                let app = request.name.clone();
                match with_deadline("rollback", t.rollback, api.rollback_application(request)).await {
                    Ok(()) => Msg::RollbackExecuted { app, watch },
                    Err(e) => failed(e, "Rollback failed"),
                }
            }
            Command::LoadDiff { app } => match with_deadline("diff", t.diff, api.get_resource_diffs(&app)).await {
                Ok(diffs) => match diff::build(&diffs) {
                    DiffOutcome::NoDocuments => Msg::NoDiff("No diffs".into()),
                    DiffOutcome::Identical => Msg::NoDiff("No differences".into()),
                    DiffOutcome::Lines(lines) => Msg::DiffLoaded { app, lines },
                },
                Err(e) => failed(e, "Failed to load diffs"),
            },
            Command::LoadResources { app } => {
                let result = with_deadline("resources", t.resources, api.get_resource_tree(&app)).await.map_err(DirectoryError::normalize);
                Msg::ResourcesLoaded { app, result }
            }
            Command::ReadLogs => self.read_logs().await,
        };
        if let Msg::Failed(e) | Msg::WatchFailed(e) | Msg::DeleteFailed { error: e, .. } = &msg {
            warn!(kind, error = %e, took_ms = %t0.elapsed().as_millis(), "dispatch: unit failed");
        } else {
            debug!(kind, took_ms = %t0.elapsed().as_millis(), "dispatch: unit ok");
        }
        Some(msg)
    }

    /// Sequential sync. The first failure stops the batch and names the application;
    /// earlier syncs are not undone.
    async fn sync(&self, targets: Vec<String>, prune: bool, watch: bool, bulk: bool) -> Msg {
        let Some(first) = targets.first().cloned() else {
            return Msg::Failed(DirectoryError::Validation("No applications selected".into()));
        };
        for name in &targets {
            let res = with_deadline("sync", self.config.timeouts.sync, self.api.sync_application(name, prune)).await;
            if let Err(e) = res {
                return failed(e, &format!("Failed to sync {name}"));
            }
            info!(app = %name, prune, "dispatch: sync issued");
        }
        if bulk { Msg::MultiSyncCompleted { count: targets.len() } } else { Msg::SyncCompleted { app: first, watch } }
    }

    /// Sequential refresh with the same stop-at-first-failure rule as sync.
    async fn refresh(&self, targets: Vec<String>, hard: bool) -> Msg {
        if targets.is_empty() {
            return Msg::Failed(DirectoryError::Validation("No applications selected".into()));
        }
        for name in &targets {
            let res = with_deadline("refresh", self.config.timeouts.refresh, self.api.refresh_application(name, hard)).await;
            if let Err(e) = res {
                return failed(e, &format!("Failed to refresh {name}"));
            }
            info!(app = %name, hard, "dispatch: refresh issued");
        }
        Msg::Refreshed { targets, hard }
    }

    /// Sequential delete. A failure names the application it stopped at and keeps
    /// its own message so the confirmation can show it.
    async fn delete(&self, targets: Vec<String>, cascade: bool, policy: PropagationPolicy) -> Msg {
        if targets.is_empty() {
            return Msg::Failed(DirectoryError::Validation("No applications selected".into()));
        }
        for name in &targets {
            let request = DeleteRequest { name: name.clone(), cascade, propagation_policy: policy, app_namespace: None };
            if let Err(e) = with_deadline("delete", self.config.timeouts.delete, self.api.delete_application(request)).await {
                return Msg::DeleteFailed { app: name.clone(), error: e.normalize() };
            }
            info!(app = %name, cascade, policy = policy.as_str(), "dispatch: delete issued");
        }
        Msg::Deleted { names: targets }
    }

    async fn read_logs(&self) -> Msg {
        let Some(path) = self.config.log_file.clone() else {
            return Msg::Failed(DirectoryError::api("No logs available"));
        };
        let read = tokio::task::spawn_blocking(move || std::fs::read_to_string(path)).await;
        match read {
            Ok(Ok(text)) => Msg::LogsLoaded(text.lines().map(str::to_string).collect()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Msg::Failed(DirectoryError::api("No logs available")),
            Ok(Err(e)) => Msg::Failed(DirectoryError::api(format!("Failed to read logs: {e}"))),
            Err(e) => Msg::Failed(DirectoryError::api(format!("Failed to read logs: {e}"))),
        }
    }
}

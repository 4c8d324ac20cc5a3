//! Fleet application directory façade.
//!
//! This crate defines the collaborator traits and payload types the engine depends on.
//! Transport lives elsewhere; `MockDirectory` is an in-memory implementation backed by
//! a JSON fixture and used by tests and the operator CLI.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fleet_core::Application;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Connection settings handed in already parsed.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// One deployment in an application's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDetail {
    pub application: Application,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<String>,
}

/// Source-control metadata for a deployed revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionMetadata {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub prune: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_namespace: Option<String>,
}

/// How dependents of a deleted application's resources are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationPolicy {
    #[default]
    Foreground,
    Background,
    Orphan,
}

impl PropagationPolicy {
    /// foreground -> background -> orphan -> foreground
    pub fn next(self) -> Self {
        match self {
            PropagationPolicy::Foreground => PropagationPolicy::Background,
            PropagationPolicy::Background => PropagationPolicy::Orphan,
            PropagationPolicy::Orphan => PropagationPolicy::Foreground,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropagationPolicy::Foreground => "foreground",
            PropagationPolicy::Background => "background",
            PropagationPolicy::Orphan => "orphan",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub name: String,
    /// Also delete the resources the application manages.
    #[serde(default)]
    pub cascade: bool,
    #[serde(default)]
    pub propagation_policy: PropagationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_namespace: Option<String>,
}

/// Live and desired state of one managed resource, each a JSON document when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDiff {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_state: Option<String>,
    /// Hook resources are excluded from diff sessions.
    #[serde(default)]
    pub hook: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceNode {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

/// Events carried by the application watch stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum WatchEvent {
    AppsLoaded(Vec<Application>),
    AppUpdated(Application),
    AppDeleted(String),
    StatusChange(String),
    AuthError(String),
    ApiError(String),
}

impl WatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::AppsLoaded(_) => "apps-loaded",
            WatchEvent::AppUpdated(_) => "app-updated",
            WatchEvent::AppDeleted(_) => "app-deleted",
            WatchEvent::StatusChange(_) => "status-change",
            WatchEvent::AuthError(_) => "auth-error",
            WatchEvent::ApiError(_) => "api-error",
        }
    }
}

const AUTH_INDICATORS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "auth",
    "login",
    "token",
    "invalid credentials",
    "access denied",
];

/// Substring heuristic over lowercase error text. Anything mentioning "auth"
/// matches, including "author".
pub fn is_authentication_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_INDICATORS.iter().any(|needle| lower.contains(needle))
}

/// Directory failures, carried across the async boundary as plain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DirectoryError {
    #[error("authentication required: {0}")]
    Auth(String),
    #[error("{message}")]
    Api { message: String, status: Option<u16>, detail: Option<String> },
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl DirectoryError {
    pub fn api(message: impl Into<String>) -> Self {
        DirectoryError::Api { message: message.into(), status: None, detail: None }
    }

    /// Map raw collaborator text to `Auth` or `Api`.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_authentication_error(&message) { DirectoryError::Auth(message) } else { DirectoryError::api(message) }
    }

    /// Promote API failures that look like authentication problems to `Auth`.
    pub fn normalize(self) -> Self {
        match self {
            DirectoryError::Api { message, status, detail } => {
                let by_status = matches!(status, Some(401) | Some(403));
                if by_status || is_authentication_error(&message) {
                    DirectoryError::Auth(message)
                } else {
                    DirectoryError::Api { message, status, detail }
                }
            }
            other => other,
        }
    }

    /// Prefix the message with `ctx`, keeping the variant.
    pub fn with_context(self, ctx: &str) -> Self {
        match self {
            DirectoryError::Auth(m) => DirectoryError::Auth(format!("{ctx}: {m}")),
            DirectoryError::Api { message, status, detail } => {
                DirectoryError::Api { message: format!("{ctx}: {message}"), status, detail }
            }
            DirectoryError::Validation(m) => DirectoryError::Validation(format!("{ctx}: {m}")),
            DirectoryError::NotFound(m) => DirectoryError::NotFound(format!("{ctx}: {m}")),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DirectoryError::Auth(m) | DirectoryError::Validation(m) | DirectoryError::NotFound(m) => m,
            DirectoryError::Api { message, .. } => message,
        }
    }

    pub fn is_auth(&self) -> bool { matches!(self, DirectoryError::Auth(_)) }
}

/// Application directory service. Implementations own transport and credentials.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    async fn list_applications(&self) -> DirectoryResult<Vec<Application>>;

    /// Open the application event stream. Dropping or cancelling the handle ends it.
    async fn watch_applications(&self) -> DirectoryResult<StreamHandle<WatchEvent>>;

    async fn sync_application(&self, name: &str, prune: bool) -> DirectoryResult<()>;

    /// Application plus its deployment history.
    async fn get_application(&self, name: &str) -> DirectoryResult<ApplicationDetail>;

    async fn get_revision_metadata(&self, name: &str, revision: &str) -> DirectoryResult<RevisionMetadata>;

    async fn rollback_application(&self, request: RollbackRequest) -> DirectoryResult<()>;

    async fn get_resource_diffs(&self, name: &str) -> DirectoryResult<Vec<ResourceDiff>>;

    async fn get_resource_tree(&self, name: &str) -> DirectoryResult<Vec<ResourceNode>>;

    async fn get_api_version(&self) -> DirectoryResult<String>;

    /// Ask the service to re-read the application's sources. `hard` also drops cached manifests.
    async fn refresh_application(&self, name: &str, hard: bool) -> DirectoryResult<()>;

    async fn delete_application(&self, request: DeleteRequest) -> DirectoryResult<()>;
}

/// Background task guard for streaming endpoints.
pub struct CancelHandle { task: Option<tokio::task::JoinHandle<()>> }

impl CancelHandle {
    pub fn new(task: tokio::task::JoinHandle<()>) -> Self { Self { task: Some(task) } }
    pub fn none() -> Self { Self { task: None } }
    pub fn cancel(mut self) { if let Some(h) = self.task.take() { h.abort(); } }
}

/// Generic stream handle used by directory streaming endpoints.
pub struct StreamHandle<T> { pub rx: tokio::sync::mpsc::Receiver<T>, pub cancel: CancelHandle }

// ----------------- Mock implementation -----------------

/// In-memory directory. Deserializes from a JSON fixture; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MockDirectory {
    pub apps: Vec<Application>,
    pub history: HashMap<String, Vec<HistoryEntry>>,
    pub current_revisions: HashMap<String, String>,
    /// Keyed by revision.
    pub metadata: HashMap<String, RevisionMetadata>,
    pub diffs: HashMap<String, Vec<ResourceDiff>>,
    pub trees: HashMap<String, Vec<ResourceNode>>,
    pub version: Option<String>,
    /// Raw error text returned by `list_applications`; classified like transport errors.
    pub list_error: Option<String>,
    /// Application name -> raw error text returned by sync, rollback, refresh and delete.
    pub sync_failures: HashMap<String, String>,
    pub watch_events: Vec<WatchEvent>,
    /// Artificial latency applied to every call.
    pub delay_ms: u64,
    /// Calls recorded so far; read through [`MockDirectory::calls`].
    #[serde(skip)]
    pub call_log: Mutex<Vec<String>>,
}

impl MockDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn with_apps(apps: Vec<Application>) -> Self { Self { apps, ..Self::default() } }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(raw) }

    /// Calls recorded so far, formatted as `op:arg`.
    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut c) = self.call_log.lock() { c.push(call); }
    }

    async fn latency(&self) {
        if self.delay_ms > 0 { tokio::time::sleep(Duration::from_millis(self.delay_ms)).await; }
    }

    fn find(&self, name: &str) -> DirectoryResult<&Application> {
        self.apps.iter().find(|a| a.name == name).ok_or_else(|| DirectoryError::NotFound(format!("application {name}")))
    }
}

#[async_trait::async_trait]
impl Directory for MockDirectory {
    async fn list_applications(&self) -> DirectoryResult<Vec<Application>> {
        let t0 = Instant::now();
        self.record("list".into());
        self.latency().await;
        if let Some(msg) = &self.list_error { return Err(DirectoryError::classify(msg.clone())); }
        info!(count = self.apps.len(), took_ms = %t0.elapsed().as_millis(), "api: list ok");
        Ok(self.apps.clone())
    }

    async fn watch_applications(&self) -> DirectoryResult<StreamHandle<WatchEvent>> {
        self.record("watch".into());
        let events = self.watch_events.clone();
        let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
        let task = tokio::spawn(async move {
            for ev in events {
                if tx.send(ev).await.is_err() { break; }
            }
            debug!("api: mock watch drained");
        });
        Ok(StreamHandle { rx, cancel: CancelHandle::new(task) })
    }

    async fn sync_application(&self, name: &str, prune: bool) -> DirectoryResult<()> {
        self.record(format!("sync:{name}"));
        self.latency().await;
        if let Some(msg) = self.sync_failures.get(name) { return Err(DirectoryError::classify(msg.clone())); }
        self.find(name)?;
        info!(app = %name, prune, "api: sync ok");
        Ok(())
    }

    async fn get_application(&self, name: &str) -> DirectoryResult<ApplicationDetail> {
        self.record(format!("get:{name}"));
        self.latency().await;
        let application = self.find(name)?.clone();
        Ok(ApplicationDetail {
            application,
            history: self.history.get(name).cloned().unwrap_or_default(),
            current_revision: self.current_revisions.get(name).cloned(),
        })
    }

    async fn get_revision_metadata(&self, name: &str, revision: &str) -> DirectoryResult<RevisionMetadata> {
        self.record(format!("metadata:{name}@{revision}"));
        self.latency().await;
        self.metadata.get(revision).cloned().ok_or_else(|| DirectoryError::NotFound(format!("revision {revision}")))
    }

    async fn rollback_application(&self, request: RollbackRequest) -> DirectoryResult<()> {
        self.record(format!("rollback:{}#{}", request.name, request.id));
        self.latency().await;
        if let Some(msg) = self.sync_failures.get(&request.name) { return Err(DirectoryError::classify(msg.clone())); }
        self.find(&request.name)?;
        Ok(())
    }

    async fn get_resource_diffs(&self, name: &str) -> DirectoryResult<Vec<ResourceDiff>> {
        self.record(format!("diff:{name}"));
        self.latency().await;
        Ok(self.diffs.get(name).cloned().unwrap_or_default())
    }

    async fn get_resource_tree(&self, name: &str) -> DirectoryResult<Vec<ResourceNode>> {
        self.record(format!("tree:{name}"));
        self.latency().await;
        self.trees.get(name).cloned().ok_or_else(|| DirectoryError::NotFound(format!("resource tree for {name}")))
    }

    async fn get_api_version(&self) -> DirectoryResult<String> {
        self.record("version".into());
        self.version.clone().ok_or_else(|| DirectoryError::api("version endpoint unavailable"))
    }

    async fn refresh_application(&self, name: &str, hard: bool) -> DirectoryResult<()> {
        self.record(format!("{}:{name}", if hard { "refresh!" } else { "refresh" }));
        self.latency().await;
        if let Some(msg) = self.sync_failures.get(name) { return Err(DirectoryError::classify(msg.clone())); }
        self.find(name)?;
        Ok(())
    }

    async fn delete_application(&self, request: DeleteRequest) -> DirectoryResult<()> {
        self.record(format!("delete:{}", request.name));
        self.latency().await;
        if let Some(msg) = self.sync_failures.get(&request.name) { return Err(DirectoryError::classify(msg.clone())); }
        self.find(&request.name)?;
        debug!(app = %request.name, cascade = request.cascade, policy = request.propagation_policy.as_str(), "api: delete ok");
        Ok(())
    }
}

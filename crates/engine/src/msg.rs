#![forbid(unsafe_code)]

use std::str::FromStr;

use fleet_api::{
    DirectoryError, HistoryEntry, PropagationPolicy, ResourceNode, RevisionMetadata, RollbackRequest, Server, WatchEvent,
};
use fleet_core::Application;

use crate::diff::DiffLine;

/// Terminal input after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Tab,
    Backspace,
    CtrlC,
    CtrlD,
}

impl FromStr for Key {
    type Err = String;

    /// Named keys with or without angle brackets (`<enter>`, `esc`), or a single character.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix('<').and_then(|r| r.strip_suffix('>')).unwrap_or(s);
        let key = match name.to_ascii_lowercase().as_str() {
            "enter" | "cr" => Key::Enter,
            "esc" | "escape" => Key::Esc,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "tab" => Key::Tab,
            "bs" | "backspace" => Key::Backspace,
            "c-c" | "ctrl-c" => Key::CtrlC,
            "c-d" | "ctrl-d" => Key::CtrlD,
            "space" => Key::Char(' '),
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => return Err(format!("unknown key: {s}")),
                }
            }
        };
        Ok(key)
    }
}

/// Expand a key script. `<name>` tokens are single named keys; any other token types its characters.
pub fn parse_script<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Key>, String> {
    let mut keys = Vec::new();
    for tok in tokens {
        let tok = tok.as_ref();
        if tok.starts_with('<') && tok.ends_with('>') && tok.len() > 2 {
            keys.push(tok.parse()?);
        } else {
            keys.extend(tok.chars().map(Key::Char));
        }
    }
    Ok(keys)
}

/// Everything the update step consumes: user input and the single result of each background unit.
#[derive(Debug)]
pub enum Msg {
    Key(Key),
    ServerConfigured(Server),
    AppsLoaded(Vec<Application>),
    Watch(WatchEvent),
    WatchStarted,
    /// The watch could not be opened; the next successful list retries it.
    WatchFailed(DirectoryError),
    WatchClosed,
    ApiVersion(Option<String>),
    Status(String),
    Failed(DirectoryError),
    SyncCompleted { app: String, watch: bool },
    MultiSyncCompleted { count: usize },
    Refreshed { targets: Vec<String>, hard: bool },
    Deleted { names: Vec<String> },
    /// Deletion stopped at `app`; earlier targets in the batch are already gone.
    DeleteFailed { app: String, error: DirectoryError },
    RollbackHistoryLoaded { app: String, rows: Vec<HistoryEntry>, current_revision: Option<String> },
    RevisionMetadataLoaded { app: String, row: usize, metadata: RevisionMetadata },
    RevisionMetadataFailed { app: String, row: usize, error: String },
    RollbackExecuted { app: String, watch: bool },
    DiffLoaded { app: String, lines: Vec<DiffLine> },
    NoDiff(String),
    ResourcesLoaded { app: String, result: Result<Vec<ResourceNode>, DirectoryError> },
    LogsLoaded(Vec<String>),
}

/// Deferred background work. Each unit yields exactly one `Msg`; `Quit` is handled by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadApplications,
    StartWatch,
    FetchNextEvent,
    FetchApiVersion,
    Sync { targets: Vec<String>, prune: bool, watch: bool, bulk: bool },
    Refresh { targets: Vec<String>, hard: bool },
    Delete { targets: Vec<String>, cascade: bool, policy: PropagationPolicy },
    LoadRollbackHistory { app: String },
    LoadRevisionMetadata { app: String, row: usize, revision: String },
    ExecuteRollback { request: RollbackRequest, watch: bool },
    LoadDiff { app: String },
    LoadResources { app: String },
    ReadLogs,
    Quit,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::LoadApplications => "load-applications",
            Command::StartWatch => "start-watch",
            Command::FetchNextEvent => "fetch-next-event",
            Command::FetchApiVersion => "fetch-api-version",
            Command::Sync { .. } => "sync",
            Command::Refresh { .. } => "refresh",
            Command::Delete { .. } => "delete",
            Command::LoadRollbackHistory { .. } => "load-rollback-history",
            Command::LoadRevisionMetadata { .. } => "load-revision-metadata",
            Command::ExecuteRollback { .. } => "execute-rollback",
            Command::LoadDiff { .. } => "load-diff",
            Command::LoadResources { .. } => "load-resources",
            Command::ReadLogs => "read-logs",
            Command::Quit => "quit",
        }
    }
}

/// Target of a pending confirmation: the whole multi-select set or one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Multi,
    Single(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_expands_words_and_named_keys() {
        let keys = parse_script(&[":ns", "<space>", "web", "<enter>", "j"]).unwrap();
        assert_eq!(
            keys,
            vec![
                Key::Char(':'),
                Key::Char('n'),
                Key::Char('s'),
                Key::Char(' '),
                Key::Char('w'),
                Key::Char('e'),
                Key::Char('b'),
                Key::Enter,
                Key::Char('j'),
            ]
        );
        assert!(parse_script(&["<nope>"]).is_err());
    }

    #[test]
    fn single_key_parse() {
        assert_eq!("esc".parse::<Key>(), Ok(Key::Esc));
        assert_eq!("<Tab>".parse::<Key>(), Ok(Key::Tab));
        assert_eq!("<c-d>".parse::<Key>(), Ok(Key::CtrlD));
        assert_eq!("G".parse::<Key>(), Ok(Key::Char('G')));
        assert!("gg".parse::<Key>().is_err());
    }
}

//! Ordering of the apps list by name, sync status or health.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Application;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Sync,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SortConfig {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortField {
    pub const ALL: [SortField; 3] = [SortField::Name, SortField::Sync, SortField::Health];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Sync => "sync",
            SortField::Health => "health",
        }
    }
}

impl SortDirection {
    pub const ALL: [SortDirection; 2] = [SortDirection::Asc, SortDirection::Desc];

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL.into_iter().find(|f| f.as_str().eq_ignore_ascii_case(s)).ok_or(())
    }
}

impl FromStr for SortDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortDirection::ALL.into_iter().find(|d| d.as_str().eq_ignore_ascii_case(s)).ok_or(())
    }
}

impl fmt::Display for SortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_str(), self.direction.as_str())
    }
}

// Problems first when ascending. Unlisted values take the Unknown slot.
fn sync_rank(status: &str) -> u8 {
    match status {
        "OutOfSync" => 0,
        "Synced" => 2,
        _ => 1,
    }
}

fn health_rank(status: &str) -> u8 {
    match status {
        "Degraded" => 0,
        "Missing" => 1,
        "Progressing" => 2,
        "Suspended" => 3,
        "Healthy" => 5,
        _ => 4,
    }
}

fn by_name(a: &Application, b: &Application) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

impl SortConfig {
    pub fn compare(&self, a: &Application, b: &Application) -> Ordering {
        let ord = match self.field {
            SortField::Name => by_name(a, b),
            SortField::Sync => sync_rank(&a.sync).cmp(&sync_rank(&b.sync)).then_with(|| by_name(a, b)),
            SortField::Health => health_rank(&a.health).cmp(&health_rank(&b.health)).then_with(|| by_name(a, b)),
        };
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }

    /// Stable: applications that compare equal keep their relative order.
    pub fn sort<T, F>(&self, items: &mut [T], app: F)
    where
        F: Fn(&T) -> &Application,
    {
        items.sort_by(|a, b| self.compare(app(a), app(b)));
    }
}

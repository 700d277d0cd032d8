//! Session history data models.
//!
//! Records are persisted with the field names the first version of the app
//! wrote (`duration`, `date`), so histories saved by it keep loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the timer reports when a session ends, before it becomes a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub requested_minutes: u32,
    pub elapsed_seconds: u32,
    pub completed: bool,
    pub note: Option<String>,
}

impl SessionOutcome {
    /// Outcome of a countdown that reached zero on its own.
    pub fn completed(requested_minutes: u32) -> Self {
        Self {
            requested_minutes,
            elapsed_seconds: requested_minutes * 60,
            completed: true,
            note: None,
        }
    }

    /// Outcome of a manual stop with `remaining_seconds` still on the clock.
    pub fn stopped(requested_minutes: u32, remaining_seconds: u32) -> Self {
        let elapsed_seconds = (requested_minutes * 60).saturating_sub(remaining_seconds);
        let completed = remaining_seconds == 0;
        let note = if completed {
            None
        } else {
            Some(format!("{} minutes worked", elapsed_seconds / 60))
        };

        Self {
            requested_minutes,
            elapsed_seconds,
            completed,
            note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: i64,
    #[serde(rename = "duration")]
    pub requested_duration: u32,
    #[serde(rename = "date")]
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SessionRecord {
    pub fn from_outcome(id: i64, started_at: DateTime<Utc>, outcome: SessionOutcome) -> Self {
        Self {
            id,
            requested_duration: outcome.requested_minutes,
            started_at,
            completed: outcome.completed,
            note: outcome.note,
        }
    }
}

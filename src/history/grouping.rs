//! Day buckets for the history screen. Purely derived from the record list;
//! nothing here is persisted.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::Serialize;

use crate::models::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl DayLabel {
    pub fn for_day(day: NaiveDate, today: NaiveDate) -> Self {
        if day == today {
            DayLabel::Today
        } else if today.pred_opt() == Some(day) {
            DayLabel::Yesterday
        } else {
            DayLabel::Date(day)
        }
    }
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayLabel::Today => f.write_str("Today"),
            DayLabel::Yesterday => f.write_str("Yesterday"),
            DayLabel::Date(day) => write!(f, "{}", day.format("%-d %B")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGroup {
    pub label: DayLabel,
    pub day: NaiveDate,
    pub records: Vec<SessionRecord>,
}

/// Buckets consecutive records sharing a calendar day in `now`'s time zone.
/// List order is kept as is, so a day that reappears later in the list
/// starts a new group.
pub fn group_by_day<Tz: TimeZone>(records: &[SessionRecord], now: &DateTime<Tz>) -> Vec<DayGroup> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut groups: Vec<DayGroup> = Vec::new();

    for record in records {
        let day = record.started_at.with_timezone(&tz).date_naive();
        match groups.last_mut() {
            Some(group) if group.day == day => group.records.push(record.clone()),
            _ => groups.push(DayGroup {
                label: DayLabel::for_day(day, today),
                day,
                records: vec![record.clone()],
            }),
        }
    }

    groups
}

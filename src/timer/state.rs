use serde::{Deserialize, Serialize};

use crate::models::SessionOutcome;

pub const DEFAULT_MINUTES: u32 = 25;
pub const MIN_MINUTES: u32 = 1;
pub const MAX_MINUTES: u32 = 180;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Editing,
}

/// Result of advancing the countdown by one second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer was not running, or had nothing left to count.
    Ignored,
    Counting { remaining_seconds: u32 },
    Completed(SessionOutcome),
}

/// Parses an edit buffer into a committable duration.
///
/// Reads the leading integer and ignores whatever follows it, so "25abc"
/// and "7 min" commit as 25 and 7. No leading digits means no duration.
pub fn parse_minutes(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let (negative, unsigned) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = &unsigned[..digits_end];
    if digits.is_empty() {
        return None;
    }

    // Too many digits to fit is out of range either way.
    let magnitude: i64 = digits.parse().ok()?;
    let minutes = if negative { -magnitude } else { magnitude };
    if (MIN_MINUTES as i64..=MAX_MINUTES as i64).contains(&minutes) {
        Some(minutes as u32)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub remaining_seconds: u32,
    pub configured_minutes: u32,
    pub is_running: bool,
    pub is_editing: bool,
    /// Text being typed while editing; `None` outside edit mode.
    pub edit_buffer: Option<String>,
    /// Bumped on every start so a pulse left over from an earlier run can
    /// tell it no longer owns the countdown.
    #[serde(skip)]
    pub run_epoch: u64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::with_minutes(DEFAULT_MINUTES)
    }
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minutes(minutes: u32) -> Self {
        let minutes = if (MIN_MINUTES..=MAX_MINUTES).contains(&minutes) {
            minutes
        } else {
            DEFAULT_MINUTES
        };

        Self {
            remaining_seconds: minutes * 60,
            configured_minutes: minutes,
            is_running: false,
            is_editing: false,
            edit_buffer: None,
            run_epoch: 0,
        }
    }

    pub fn status(&self) -> TimerStatus {
        match (self.is_running, self.is_editing) {
            (true, _) => TimerStatus::Running,
            (false, true) => TimerStatus::Editing,
            (false, false) => TimerStatus::Idle,
        }
    }

    /// Enters edit mode. The buffer is seeded with `target_minutes` or, when
    /// absent, the whole minutes left on the clock.
    pub fn edit(&mut self, target_minutes: Option<u32>) -> bool {
        if self.is_running {
            return false;
        }

        let seed = target_minutes.unwrap_or(self.remaining_seconds / 60);
        self.is_editing = true;
        self.edit_buffer = Some(seed.to_string());
        true
    }

    pub fn set_edit_buffer(&mut self, input: &str) -> bool {
        if !self.is_editing {
            return false;
        }
        self.edit_buffer = Some(input.to_string());
        true
    }

    /// Applies `raw` as the new duration. Anything that is not a whole number
    /// of minutes in range leaves the state untouched.
    pub fn commit_edit(&mut self, raw: &str) -> bool {
        if !self.is_editing || self.is_running {
            return false;
        }

        match parse_minutes(raw) {
            Some(minutes) => {
                self.configured_minutes = minutes;
                self.remaining_seconds = minutes * 60;
                self.is_editing = false;
                self.edit_buffer = None;
                true
            }
            None => false,
        }
    }

    /// Starts or resumes the countdown from the current remaining time.
    /// A pending edit is committed first; an invalid one is discarded.
    pub fn start(&mut self) -> bool {
        if self.is_running {
            return false;
        }

        if self.is_editing {
            let pending = self.edit_buffer.clone().unwrap_or_default();
            if !self.commit_edit(&pending) {
                self.is_editing = false;
                self.edit_buffer = None;
            }
        }

        self.is_running = true;
        self.run_epoch = self.run_epoch.wrapping_add(1);
        true
    }

    /// Stops a running countdown and rearms it to the committed duration.
    pub fn stop(&mut self) -> Option<SessionOutcome> {
        if !self.is_running {
            return None;
        }

        let outcome = SessionOutcome::stopped(self.configured_minutes, self.remaining_seconds);
        self.is_running = false;
        self.rearm();
        Some(outcome)
    }

    /// Start/stop button semantics: stop when running, start otherwise.
    pub fn toggle(&mut self) -> Option<SessionOutcome> {
        if self.is_running {
            self.stop()
        } else {
            self.start();
            None
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running || self.remaining_seconds == 0 {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds -= 1;
        if self.remaining_seconds > 0 {
            return TickOutcome::Counting {
                remaining_seconds: self.remaining_seconds,
            };
        }

        self.is_running = false;
        self.rearm();
        TickOutcome::Completed(SessionOutcome::completed(self.configured_minutes))
    }

    fn rearm(&mut self) {
        self.remaining_seconds = self.configured_minutes * 60;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_completion(state: &mut TimerState) -> Vec<SessionOutcome> {
        let mut completions = Vec::new();
        for _ in 0..(state.configured_minutes * 60 + 5) {
            if let TickOutcome::Completed(outcome) = state.tick() {
                completions.push(outcome);
            }
        }
        completions
    }

    #[test]
    fn starts_idle_with_default_duration() {
        let state = TimerState::new();
        assert_eq!(state.configured_minutes, 25);
        assert_eq!(state.remaining_seconds, 1500);
        assert_eq!(state.status(), TimerStatus::Idle);
    }

    #[test]
    fn commit_accepts_exactly_one_to_one_eighty() {
        for (raw, accepted) in [
            ("0", false),
            ("1", true),
            ("45", true),
            ("180", true),
            ("181", false),
            ("-5", false),
        ] {
            let mut state = TimerState::new();
            state.edit(None);
            assert_eq!(state.commit_edit(raw), accepted, "input {raw}");
            if accepted {
                let minutes: u32 = raw.parse().unwrap();
                assert_eq!(state.remaining_seconds, minutes * 60);
                assert_eq!(state.configured_minutes, minutes);
                assert!(!state.is_editing);
            } else {
                assert_eq!(state.remaining_seconds, 1500);
                assert!(state.is_editing);
            }
        }
    }

    #[test]
    fn rejects_non_numeric_input() {
        let mut state = TimerState::new();
        state.edit(None);
        assert!(!state.commit_edit("ten"));
        assert!(!state.commit_edit(""));
        assert!(!state.commit_edit("-"));
        assert!(state.is_editing);
        assert_eq!(state.configured_minutes, 25);
    }

    #[test]
    fn commit_reads_leading_integer() {
        let mut state = TimerState::new();
        state.edit(None);
        assert!(state.commit_edit("40abc"));
        assert_eq!(state.configured_minutes, 40);
        assert_eq!(state.remaining_seconds, 2400);
        assert!(!state.is_editing);

        assert_eq!(parse_minutes("12.5"), Some(12));
        assert_eq!(parse_minutes(" 7 min"), Some(7));
        assert_eq!(parse_minutes("+30"), Some(30));
        assert_eq!(parse_minutes("-5"), None);
        assert_eq!(parse_minutes("0x10"), None);
        assert_eq!(parse_minutes("99999999999999999999"), None);
        assert_eq!(parse_minutes("abc25"), None);
    }

    #[test]
    fn out_of_range_commit_keeps_configured_minutes() {
        let mut state = TimerState::new();
        state.edit(None);
        assert!(!state.commit_edit("200"));
        assert_eq!(state.configured_minutes, 25);
        assert_eq!(state.remaining_seconds, 1500);
    }

    #[test]
    fn edit_seeds_buffer_from_remaining_whole_minutes() {
        let mut state = TimerState::new();
        state.remaining_seconds = 10 * 60 + 59;
        state.edit(None);
        assert_eq!(state.edit_buffer.as_deref(), Some("10"));

        let mut state = TimerState::new();
        state.edit(Some(40));
        assert_eq!(state.edit_buffer.as_deref(), Some("40"));
    }

    #[test]
    fn edit_is_refused_while_running() {
        let mut state = TimerState::new();
        state.start();
        assert!(!state.edit(None));
        assert!(!state.is_editing);
        assert_eq!(state.status(), TimerStatus::Running);
    }

    #[test]
    fn start_commits_pending_edit() {
        let mut state = TimerState::new();
        state.edit(None);
        state.set_edit_buffer("5");
        assert!(state.start());
        assert_eq!(state.status(), TimerStatus::Running);
        assert_eq!(state.configured_minutes, 5);
        assert_eq!(state.remaining_seconds, 300);
    }

    #[test]
    fn start_with_invalid_pending_edit_resumes_prior_remaining() {
        let mut state = TimerState::new();
        state.remaining_seconds = 1200;
        state.edit(None);
        state.set_edit_buffer("999");
        assert!(state.start());

        assert!(state.is_running);
        assert!(!state.is_editing);
        assert_eq!(state.remaining_seconds, 1200);
        assert_eq!(state.configured_minutes, 25);
    }

    #[test]
    fn start_does_not_reset_remaining() {
        let mut state = TimerState::new();
        state.remaining_seconds = 42;
        state.start();
        assert_eq!(state.remaining_seconds, 42);
    }

    #[test]
    fn immediate_stop_records_zero_minutes_worked() {
        let mut state = TimerState::new();
        state.start();
        let outcome = state.stop().unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.requested_minutes, 25);
        assert_eq!(outcome.note.as_deref(), Some("0 minutes worked"));
        assert_eq!(state.remaining_seconds, 1500);
        assert_eq!(state.status(), TimerStatus::Idle);
    }

    #[test]
    fn stop_rearms_to_committed_duration() {
        let mut state = TimerState::new();
        state.edit(None);
        state.commit_edit("10");
        state.start();
        for _ in 0..125 {
            state.tick();
        }

        let outcome = state.stop().unwrap();
        assert_eq!(outcome.elapsed_seconds, 125);
        assert_eq!(outcome.note.as_deref(), Some("2 minutes worked"));
        assert_eq!(state.remaining_seconds, 600);
    }

    #[test]
    fn stop_and_tick_are_noops_when_idle() {
        let mut state = TimerState::new();
        assert_eq!(state.stop(), None);
        assert_eq!(state.tick(), TickOutcome::Ignored);
        assert_eq!(state, TimerState::new());
    }

    #[test]
    fn one_minute_countdown_completes_once() {
        let mut state = TimerState::new();
        state.edit(Some(1));
        state.commit_edit("1");
        state.start();

        for _ in 0..59 {
            assert!(matches!(state.tick(), TickOutcome::Counting { .. }));
        }
        match state.tick() {
            TickOutcome::Completed(outcome) => {
                assert!(outcome.completed);
                assert_eq!(outcome.note, None);
                assert_eq!(outcome.requested_minutes, 1);
            }
            other => panic!("expected completion, got {other:?}"),
        }

        assert!(!state.is_running);
        assert_eq!(state.remaining_seconds, 60);
        assert_eq!(state.tick(), TickOutcome::Ignored);
    }

    #[test]
    fn default_countdown_completes_after_fifteen_hundred_ticks() {
        let mut state = TimerState::new();
        state.start();
        let completions = run_to_completion(&mut state);

        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0], SessionOutcome::completed(25));
        assert_eq!(state.remaining_seconds, 1500);
    }

    #[test]
    fn toggle_alternates_start_and_stop() {
        let mut state = TimerState::new();
        assert_eq!(state.toggle(), None);
        assert!(state.is_running);
        assert!(state.toggle().is_some());
        assert!(!state.is_running);
    }

    #[test]
    fn start_bumps_run_epoch() {
        let mut state = TimerState::new();
        state.start();
        state.stop();
        state.start();
        assert_eq!(state.run_epoch, 2);
    }

    #[test]
    fn set_edit_buffer_requires_edit_mode() {
        let mut state = TimerState::new();
        assert!(!state.set_edit_buffer("3"));
        assert_eq!(state.edit_buffer, None);
    }
}

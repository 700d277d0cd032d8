use crate::models::SessionOutcome;

use super::{TickOutcome, TimerController, TimerSnapshot};

/// User intents a renderer hands to the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerIntent {
    Edit(Option<u32>),
    Type(String),
    /// Commit the given text, or the current edit buffer when `None`.
    CommitEdit(Option<String>),
    Start,
    Stop,
    Toggle,
    Tick,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    /// False when the intent's precondition was not met and nothing changed.
    pub applied: bool,
    pub finished: Option<SessionOutcome>,
    pub snapshot: TimerSnapshot,
}

pub async fn apply_intent(controller: &TimerController, intent: TimerIntent) -> IntentResult {
    let (applied, finished) = match intent {
        TimerIntent::Edit(target) => (controller.edit(target).await, None),
        TimerIntent::Type(text) => (controller.set_edit_buffer(&text).await, None),
        TimerIntent::CommitEdit(raw) => {
            let raw = match raw {
                Some(raw) => raw,
                None => controller.snapshot().await.edit_buffer.unwrap_or_default(),
            };
            (controller.commit_edit(&raw).await, None)
        }
        TimerIntent::Start => (controller.start().await, None),
        TimerIntent::Stop => {
            let outcome = controller.stop().await;
            (outcome.is_some(), outcome)
        }
        TimerIntent::Toggle => (true, controller.toggle().await),
        TimerIntent::Tick => match controller.tick().await {
            TickOutcome::Ignored => (false, None),
            TickOutcome::Counting { .. } => (true, None),
            TickOutcome::Completed(outcome) => (true, Some(outcome)),
        },
    };

    IntentResult {
        applied,
        finished,
        snapshot: controller.snapshot().await,
    }
}

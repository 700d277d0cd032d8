pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{SessionSink, TimerController, TimerSnapshot};
pub use state::{TickOutcome, TimerState, TimerStatus};

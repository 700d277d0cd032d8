pub mod session;

pub use session::{SessionOutcome, SessionRecord};

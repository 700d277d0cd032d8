pub mod grouping;
pub mod store;

pub use grouping::{group_by_day, DayGroup, DayLabel};
pub use store::HistoryStore;

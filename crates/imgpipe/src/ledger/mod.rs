pub mod store;
pub mod task;

pub use store::TaskLedger;
pub use task::{LedgerStats, TaskEntry, TaskStatus};

pub mod coordinator;
pub mod report;

pub use coordinator::{BatchCoordinator, BatchOptions};
pub use report::BatchReport;

//! Shared utilities for imgpipe integration tests.
//!
//! - `TestHarness` wires a resolver to stub services inside a temp directory
//! - builders for content entries
//! - stub generator, storage and downloader that record their calls

pub mod builders;
pub mod harness;
pub mod stubs;

pub use builders::*;
pub use harness::TestHarness;
pub use stubs::*;

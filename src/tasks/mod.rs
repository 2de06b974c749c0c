//! Background Tasks Module
//!
//! # Tasks
//! - Expired-entry sweep: purges expired entries at a configured interval

mod cleanup;

pub use cleanup::{spawn_cleanup_task, CleanupTask};

//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Update check: activates a waiting worker once no page is open and
//!   refreshes the current generation

mod update_check;

pub use update_check::spawn_update_check_task;

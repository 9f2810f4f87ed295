//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod wish;

pub use wish::{AttendanceDb, WishEntity};

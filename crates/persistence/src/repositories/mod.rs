//! Repository implementations for database operations.

pub mod wish;

pub use wish::{storage_error, WishRepository, WISH_CHANGES_CHANNEL};

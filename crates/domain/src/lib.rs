//! Domain layer for the guestbook backend.
//!
//! This crate contains:
//! - Domain models (Wish, CompositeKey, WishDraft)
//! - The store abstraction and its in-memory and demo backends
//! - The submission protocol, live feed and windowing services
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::GuestbookError;

//! Shared utilities and common types for the guestbook backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Guest identity normalization (display name to `NameKey`)
//! - Hashing helpers for deterministic seeding
//! - Common validation logic

pub mod crypto;
pub mod identity;
pub mod validation;

pub use identity::{normalize, NameKey};

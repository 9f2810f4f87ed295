//! Persistence layer for the guestbook backend.
//!
//! This crate contains:
//! - Database connection management
//! - The wishes table mapping
//! - The PostgreSQL guestbook store and its change listener

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

pub use repositories::WishRepository;

//! Domain models for the guestbook.

pub mod wish;

pub use wish::{
    feed_order, sort_feed, Attendance, CompositeKey, CreateOutcome, NewWish, Wish, WishDraft,
};

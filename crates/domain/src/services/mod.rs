//! Guestbook services.
//!
//! Stores, the submission state machine, the live feed and the reveal window.

pub mod demo;
pub mod feed;
pub mod memory;
pub mod session;
pub mod store;
pub mod submission;
pub mod window;

pub use demo::{is_demo_invitation, seed_wishes, DemoGuestbook, DEFAULT_DEMO_SUFFIX};
pub use feed::{subscribe, subscribe_with, FeedSnapshot, FeedSubscription};
pub use memory::{CreateFault, MemoryGuestbook};
pub use session::{GuestSession, SessionConfig, SessionSnapshot};
pub use store::{BackendSelector, GuestbookStore, WishChanged};
pub use submission::{StateKind, Submission, SubmissionState, SubmitOutcome};
pub use window::WishWindow;

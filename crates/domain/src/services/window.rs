//! Incremental reveal of a wish feed.

use crate::models::Wish;

pub const DEFAULT_INITIAL_WINDOW: usize = 10;
pub const DEFAULT_WINDOW_STEP: usize = 10;

/// How many feed entries a viewer currently sees.
///
/// The window only grows when the viewer nears the end of what is rendered.
/// Feed growth alone never reveals more than was visible after the last
/// signal, and a shrinking feed lowers the count, never below the initial
/// window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishWindow {
    invitation_id: String,
    initial: usize,
    step: usize,
    shown: usize,
}

impl WishWindow {
    pub fn new(invitation_id: impl Into<String>, initial: usize, step: usize) -> Self {
        Self {
            invitation_id: invitation_id.into(),
            initial,
            step,
            shown: initial,
        }
    }

    pub fn with_defaults(invitation_id: impl Into<String>) -> Self {
        Self::new(invitation_id, DEFAULT_INITIAL_WINDOW, DEFAULT_WINDOW_STEP)
    }

    pub fn invitation_id(&self) -> &str {
        &self.invitation_id
    }

    /// Visible entries for a feed of `total` wishes.
    pub fn visible_count(&self, total: usize) -> usize {
        self.shown.min(total)
    }

    pub fn has_more(&self, total: usize) -> bool {
        self.visible_count(total) < total
    }

    /// Proximity signal: the viewer scrolled near the end of the list.
    ///
    /// Grows the window by one step, clamped to the current total, so later
    /// arrivals stay hidden until the next signal.
    pub fn on_near_end(&mut self, total: usize) -> usize {
        self.on_feed_resized(total);
        let visible = self.visible_count(total);
        if visible < total {
            self.shown = (visible + self.step).min(total).max(self.initial);
        }
        self.visible_count(total)
    }

    /// Follows a feed that lost entries, keeping the count within the total.
    pub fn on_feed_resized(&mut self, total: usize) {
        if total < self.shown {
            self.shown = total.max(self.initial);
        }
    }

    /// Restores the initial window when the viewer moves to another invitation.
    pub fn switch_invitation(&mut self, invitation_id: &str) {
        if self.invitation_id != invitation_id {
            self.invitation_id = invitation_id.to_string();
            self.shown = self.initial;
        }
    }

    /// The visible prefix of an already sorted feed.
    pub fn visible<'a>(&self, wishes: &'a [Wish]) -> &'a [Wish] {
        &wishes[..self.visible_count(wishes.len())]
    }
}

//! Generation-tracked subscription slots.
//!
//! Every live feed the store attaches captures a generation number at
//! attach time; payloads stamped with an older generation are discarded.
//! Detaching clears the slot, so a callback that raced with an
//! unsubscribe can never be accepted: one structural check instead of
//! scattered "still signed in?" tests.

use causerie_backend::Subscription;

/// Holds at most one live subscription and the generation it was
/// attached under.
#[derive(Default)]
pub(crate) struct FeedSlot {
    gen: Option<u64>,
    sub: Option<Subscription>,
}

impl FeedSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the slot's subscription, cancelling any prior one first.
    pub(crate) fn attach(&mut self, gen: u64, sub: Subscription) {
        self.clear();
        self.gen = Some(gen);
        self.sub = Some(sub);
    }

    /// Whether a payload stamped with `gen` belongs to the current
    /// subscription.
    pub(crate) fn accepts(&self, gen: u64) -> bool {
        self.gen == Some(gen)
    }

    /// Cancel and forget the current subscription, if any.
    pub(crate) fn clear(&mut self) {
        self.gen = None;
        if let Some(mut sub) = self.sub.take() {
            sub.cancel();
        }
    }
}

impl Drop for FeedSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

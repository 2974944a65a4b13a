//! ForkGrant - proof that a philosopher holds its fork pair.
//!
//! The pair goes back to the table when the grant is released or dropped, so a
//! session that dies mid-meal can never leak a busy fork.

use std::sync::Arc;

use super::registry::PhilosopherId;
use super::table::Shared;

/// Both forks of one philosopher, held until released or dropped.
#[must_use = "dropping a ForkGrant immediately puts the forks back"]
pub struct ForkGrant {
    shared: Arc<Shared>,
    philosopher: PhilosopherId,
    released: bool,
}

impl ForkGrant {
    pub(super) fn new(shared: Arc<Shared>, philosopher: PhilosopherId) -> Self {
        Self {
            shared,
            philosopher,
            released: false,
        }
    }

    pub fn philosopher(&self) -> PhilosopherId {
        self.philosopher
    }

    /// Put both forks down and wake every waiter.
    pub fn release(mut self) {
        self.put_down();
    }

    fn put_down(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release(self.philosopher);
        }
    }
}

impl Drop for ForkGrant {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(philosopher = %self.philosopher, "ForkGrant dropped while held - releasing");
        }
        self.put_down();
    }
}

impl std::fmt::Debug for ForkGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkGrant")
            .field("philosopher", &self.philosopher)
            .field("released", &self.released)
            .finish()
    }
}

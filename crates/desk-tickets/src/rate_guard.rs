//! Per-identity cooldown between ticket actions.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::ids::UserId;

/// Coarse throttle: an identity is limited for `cooldown` after its last
/// touch. There is no burst allowance and state is process-local.
#[derive(Debug)]
pub struct RateGuard {
    cooldown: Duration,
    last_interaction: Mutex<HashMap<UserId, Instant>>,
}

impl RateGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_interaction: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_limited(&self, identity: UserId) -> bool {
        self.is_limited_at(identity, Instant::now())
    }

    pub fn is_limited_at(&self, identity: UserId, now: Instant) -> bool {
        self.remaining_at(identity, now).is_some()
    }

    /// Time left in the identity's window, or `None` when not limited.
    pub fn remaining(&self, identity: UserId) -> Option<Duration> {
        self.remaining_at(identity, Instant::now())
    }

    pub fn remaining_at(&self, identity: UserId, now: Instant) -> Option<Duration> {
        let entries = self.entries();
        let last = entries.get(&identity)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    pub fn touch(&self, identity: UserId) {
        self.touch_at(identity, Instant::now());
    }

    pub fn touch_at(&self, identity: UserId, now: Instant) {
        self.entries().insert(identity, now);
    }

    /// Checks and touches under one lock so two concurrent actions from the
    /// same identity cannot both pass.
    pub fn try_acquire(&self, identity: UserId) -> Result<(), Duration> {
        self.try_acquire_at(identity, Instant::now())
    }

    pub fn try_acquire_at(&self, identity: UserId, now: Instant) -> Result<(), Duration> {
        let mut entries = self.entries();
        if let Some(last) = entries.get(&identity) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }
        entries.insert(identity, now);
        Ok(())
    }

    pub fn tracked_identities(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<UserId, Instant>> {
        self.last_interaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

//! Cross-surface sync: replays snapshots written by other surfaces into a
//! local [`FocusTimer`].
//!
//! Only the surface that performed an action writes the snapshot; every other
//! surface follows it here as a display-only mirror.

use std::sync::Arc;

use crate::events::Event;
use crate::storage::{KeyValueStore, SnapshotEnvelope, SnapshotSubscription, TimerStateStore};
use crate::timer::FocusTimer;

pub struct SurfaceSync {
    subscription: SnapshotSubscription,
    store: Arc<dyn KeyValueStore>,
}

impl SurfaceSync {
    /// Subscribe to snapshot writes. Only writes made after this call are seen.
    pub fn attach(store: &TimerStateStore) -> Self {
        Self {
            subscription: store.subscribe(),
            store: store.backing().clone(),
        }
    }

    /// Pick up writes made by other processes sharing the store.
    pub fn poll_external(&self) {
        if let Err(e) = self.store.poll_external() {
            tracing::warn!(error = %e, "could not poll store for external writes");
        }
    }

    /// Apply every pending snapshot without waiting.
    pub fn pump(&mut self, timer: &mut FocusTimer) -> Vec<Event> {
        self.poll_external();
        let mut events = Vec::new();
        while let Some(envelope) = self.subscription.try_next() {
            events.extend(timer.apply_remote(envelope));
        }
        events
    }

    /// Wait for the next snapshot write. `None` once the store is gone.
    pub async fn next_remote(&mut self) -> Option<SnapshotEnvelope> {
        self.subscription.next().await
    }
}

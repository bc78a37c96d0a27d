//! Single source of truth for "is a session running".
//!
//! The snapshot is written under one key, wrapped in an envelope naming the
//! surface that wrote it so a surface can tell its own echoes from remote
//! transitions. Mutation is last-write-wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

use super::{KeyValueStore, StoreChange};
use crate::error::StoreError;
use crate::timer::TimerSnapshot;

pub const SNAPSHOT_KEY: &str = "focus_timer_state";
pub const CYCLE_KEY: &str = "focus_timer_cycle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    /// Surface that wrote this snapshot.
    pub origin: String,
    /// Per-surface write counter.
    pub revision: u64,
    pub written_at: DateTime<Utc>,
    pub snapshot: TimerSnapshot,
}

/// Focus-cycle bookkeeping that outlives a single session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleState {
    /// Focus units completed since the last long break.
    pub completed_units: u32,
    #[serde(default)]
    pub last_focus_minutes: Option<u32>,
    #[serde(default)]
    pub last_open_ended: bool,
}

#[derive(Clone)]
pub struct TimerStateStore {
    store: Arc<dyn KeyValueStore>,
    origin: String,
    revision: Arc<AtomicU64>,
}

impl TimerStateStore {
    /// Attach a new surface to `store` with a fresh origin id.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_origin(store, Uuid::new_v4().to_string())
    }

    pub fn with_origin(store: Arc<dyn KeyValueStore>, origin: impl Into<String>) -> Self {
        Self {
            store,
            origin: origin.into(),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn backing(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Persist `snapshot`; observers are notified by the backing store.
    pub fn write(&self, snapshot: &TimerSnapshot, now: DateTime<Utc>) -> Result<(), StoreError> {
        let envelope = SnapshotEnvelope {
            origin: self.origin.clone(),
            revision: self.revision.fetch_add(1, Ordering::SeqCst) + 1,
            written_at: now,
            snapshot: snapshot.clone(),
        };
        let json = serde_json::to_string(&envelope).map_err(|e| StoreError::Corrupt {
            key: SNAPSHOT_KEY.into(),
            message: e.to_string(),
        })?;
        self.store.set(SNAPSHOT_KEY, &json)
    }

    pub fn read(&self) -> Result<Option<TimerSnapshot>, StoreError> {
        Ok(self.read_envelope()?.map(|envelope| envelope.snapshot))
    }

    pub fn read_envelope(&self) -> Result<Option<SnapshotEnvelope>, StoreError> {
        match self.store.get(SNAPSHOT_KEY)? {
            Some(json) => decode_envelope(&json).map(Some),
            None => Ok(None),
        }
    }

    /// Write the cleared snapshot so observers see `isActive=false`.
    pub fn clear(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(&TimerSnapshot::inactive(), now)
    }

    /// Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> SnapshotSubscription {
        SnapshotSubscription {
            rx: self.store.subscribe(),
            store: self.store.clone(),
        }
    }

    pub fn read_cycle(&self) -> Result<CycleState, StoreError> {
        match self.store.get(CYCLE_KEY)? {
            Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                key: CYCLE_KEY.into(),
                message: e.to_string(),
            }),
            None => Ok(CycleState::default()),
        }
    }

    pub fn write_cycle(&self, cycle: &CycleState) -> Result<(), StoreError> {
        let json = serde_json::to_string(cycle).map_err(|e| StoreError::Corrupt {
            key: CYCLE_KEY.into(),
            message: e.to_string(),
        })?;
        self.store.set(CYCLE_KEY, &json)
    }
}

fn decode_envelope(json: &str) -> Result<SnapshotEnvelope, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
        key: SNAPSHOT_KEY.into(),
        message: e.to_string(),
    })
}

/// Stream of snapshot writes from every surface, including this one.
pub struct SnapshotSubscription {
    rx: broadcast::Receiver<StoreChange>,
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotSubscription {
    /// Next pending snapshot write, without waiting.
    pub fn try_next(&mut self) -> Option<SnapshotEnvelope> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => {
                    if let Some(envelope) = self.decode_change(change) {
                        return Some(envelope);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    if let Some(envelope) = self.resync(skipped) {
                        return Some(envelope);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next snapshot write. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<SnapshotEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if let Some(envelope) = self.decode_change(change) {
                        return Some(envelope);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    if let Some(envelope) = self.resync(skipped) {
                        return Some(envelope);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn decode_change(&self, change: StoreChange) -> Option<SnapshotEnvelope> {
        if change.key != SNAPSHOT_KEY {
            return None;
        }
        match change.value {
            Some(json) => match decode_envelope(&json) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring undecodable snapshot notification");
                    None
                }
            },
            // A removed key reads as a cleared timer.
            None => Some(SnapshotEnvelope {
                origin: String::new(),
                revision: 0,
                written_at: Utc::now(),
                snapshot: TimerSnapshot::inactive(),
            }),
        }
    }

    /// Intermediate writes were dropped; the latest value is all that matters.
    fn resync(&mut self, skipped: u64) -> Option<SnapshotEnvelope> {
        tracing::debug!(skipped, "snapshot subscription lagged, re-reading store");
        match self.store.get(SNAPSHOT_KEY) {
            Ok(Some(json)) => decode_envelope(&json).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not re-read snapshot after lag");
                None
            }
        }
    }
}

//! Durable storage: the key-value store seam, its adapters, and the typed
//! records the timer keeps in it.

mod config;
pub mod database;
pub mod history;
pub mod memory;
pub mod state_store;
mod writer;

pub use config::{
    BehaviorConfig, BlockingConfig, DurationsConfig, NotificationsConfig, TimerConfig,
};
pub use database::SqliteStore;
pub use history::SessionHistory;
pub use memory::MemoryStore;
pub use state_store::{CycleState, SnapshotEnvelope, SnapshotSubscription, TimerStateStore};
pub(crate) use writer::{PendingWrite, StoreWriter, WriteKind, WriteResult};

use std::path::PathBuf;

use tokio::sync::broadcast;

use crate::error::StoreError;

/// Capacity of every store's change channel. Receivers that fall further
/// behind re-read the current value instead of replaying.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A committed write or removal, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    /// `None` when the key was removed.
    pub value: Option<String>,
}

/// Shared durable key-value storage with change notifications.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Receive every change committed after this call.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Look for writes made outside this process and broadcast them.
    fn poll_external(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Returns `~/.config/focuskit[-dev]/` based on FOCUSKIT_ENV.
///
/// Set FOCUSKIT_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSKIT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focuskit-dev")
    } else {
        base_dir.join("focuskit")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

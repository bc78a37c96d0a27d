//! # Focuskit Core Library
//!
//! Core logic for the focuskit focus-session timer. Every surface (the CLI,
//! a desktop window, a popup) embeds the same [`FocusTimer`] and shares one
//! durable store.
//!
//! ## Architecture
//!
//! - **Timer**: a wall-clock-based state machine; the caller (or
//!   [`TimerController`]) invokes `tick()` periodically, and all time is
//!   recomputed from stored timestamps so nothing drifts
//! - **Storage**: a key-value store seam with SQLite and in-memory adapters,
//!   the snapshot store, session history and TOML configuration
//! - **Restore**: the startup decision about a snapshot left behind
//! - **Sync**: other surfaces follow the owner's snapshot as mirrors
//!
//! ## Key Components
//!
//! - [`FocusTimer`]: core timer state machine
//! - [`TimerStateStore`]: the single "is a session running" record
//! - [`SessionRestorer`]: startup classification of saved state
//! - [`SurfaceSync`]: cross-surface replay
//! - [`TimerConfig`]: user configuration

pub mod clock;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod restore;
pub mod session;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    Collaborators, DistractionBlocker, DoNotDisturb, NotificationKind, Notifier, SoundPlayer,
    StatsSink,
};
pub use error::{ConfigError, CoreError, StoreError, TimerError};
pub use events::Event;
pub use restore::{PendingResume, RestoreOutcome, SessionRestorer};
pub use session::{SessionRecord, SessionStatus, SessionType};
pub use stats::{DailyTotals, DailyTotalsSink};
pub use storage::{
    KeyValueStore, MemoryStore, SessionHistory, SnapshotEnvelope, SqliteStore, TimerConfig,
    TimerStateStore,
};
pub use sync::SurfaceSync;
pub use timer::{
    BoredomLevel, BreakKind, BreakOffer, DisplayMode, DisplayState, FocusTimer,
    PausedSessionChoice, Role, StartMode, StartOptions, StopDisposition, TimerController,
    TimerPhase, TimerSnapshot,
};

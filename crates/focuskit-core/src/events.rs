use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionStatus;
use crate::timer::BreakOffer;

/// Every state change of a focus timer produces an Event.
/// Surfaces render from them; the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        session_id: Option<String>,
        is_break: bool,
        /// `None` for open-ended runs.
        duration_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: Option<u64>,
        elapsed_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: Option<u64>,
        elapsed_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    TimerStopped {
        session_id: Option<String>,
        status: Option<SessionStatus>,
        actual_minutes: u32,
        credited: bool,
        at: DateTime<Utc>,
    },
    /// A focus countdown reached zero.
    SessionCompleted {
        session_id: String,
        duration_minutes: u32,
        break_offer: Option<BreakOffer>,
        at: DateTime<Utc>,
    },
    BreakCompleted {
        auto_continue: bool,
        at: DateTime<Utc>,
    },
    BreakSkipped {
        at: DateTime<Utc>,
    },
    /// Another surface changed the timer and this one followed.
    RemoteApplied {
        origin: String,
        is_active: bool,
        is_paused: bool,
        at: DateTime<Utc>,
    },
}

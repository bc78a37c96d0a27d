//! External collaborators the timer drives but does not implement.
//!
//! Every call is fire-and-forget: implementations must not block and must not
//! fail the caller. [`Collaborators::default`] wires no-op versions of all of
//! them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionComplete,
    BreakComplete,
    /// Passive notice, e.g. a paused session was found at startup.
    Notice,
    /// Non-blocking degradation warning, e.g. state is not being persisted.
    Warning,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, title: &str, body: &str);
}

pub trait SoundPlayer: Send + Sync {
    fn play(&self, sound_id: &str);
}

/// Receives credited focus time for daily totals and achievements.
pub trait StatsSink: Send + Sync {
    fn on_session_completed(&self, duration_minutes: u32);
    fn on_session_credited(&self, duration_minutes: u32, counts_as_unit: bool);
}

pub trait DistractionBlocker: Send + Sync {
    /// `duration_minutes` is 0 for open-ended sessions.
    fn enable(&self, duration_minutes: u32);
    fn disable(&self);
}

/// Suppresses notifications while active.
pub trait DoNotDisturb: Send + Sync {
    fn is_active(&self) -> bool;
}

/// No-op implementation of every collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Notifier for Noop {
    fn notify(&self, _kind: NotificationKind, _title: &str, _body: &str) {}
}

impl SoundPlayer for Noop {
    fn play(&self, _sound_id: &str) {}
}

impl StatsSink for Noop {
    fn on_session_completed(&self, _duration_minutes: u32) {}
    fn on_session_credited(&self, _duration_minutes: u32, _counts_as_unit: bool) {}
}

impl DistractionBlocker for Noop {
    fn enable(&self, _duration_minutes: u32) {}
    fn disable(&self) {}
}

impl DoNotDisturb for Noop {
    fn is_active(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub sound: Arc<dyn SoundPlayer>,
    pub stats: Arc<dyn StatsSink>,
    pub blocker: Arc<dyn DistractionBlocker>,
    pub do_not_disturb: Arc<dyn DoNotDisturb>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            notifier: Arc::new(Noop),
            sound: Arc::new(Noop),
            stats: Arc::new(Noop),
            blocker: Arc::new(Noop),
            do_not_disturb: Arc::new(Noop),
        }
    }
}

impl Collaborators {
    /// Deliver a notification unless do-not-disturb is on.
    pub fn notify(&self, kind: NotificationKind, title: &str, body: &str) {
        if self.do_not_disturb.is_active() {
            tracing::debug!(?kind, "notification suppressed by do-not-disturb");
            return;
        }
        self.notifier.notify(kind, title, body);
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

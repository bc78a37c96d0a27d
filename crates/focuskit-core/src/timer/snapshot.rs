//! The durable representation of "is a timer running".
//!
//! Field names serialize in camelCase so every surface, whatever it is written
//! in, reads the same record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time_math;

/// Self-reported boredom before a session, 1 (engaged) to 5 (dreading it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BoredomLevel(u8);

impl BoredomLevel {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BoredomLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("boredom level must be between 1 and 5, got {value}"))
        }
    }
}

impl From<BoredomLevel> for u8 {
    fn from(level: BoredomLevel) -> Self {
        level.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub is_active: bool,
    pub is_paused: bool,
    pub is_break: bool,
    pub is_open_ended: bool,
    /// Planned length; 0 when open-ended.
    pub selected_minutes: u32,
    /// Moment the current run began, recomputed on resume.
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// Moment the countdown completes. Unset while open-ended or paused.
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_remaining_seconds: Option<u64>,
    #[serde(default)]
    pub paused_elapsed_seconds: Option<u64>,
    #[serde(default)]
    pub linked_task_title: Option<String>,
    #[serde(default)]
    pub boredom_level: Option<BoredomLevel>,
}

impl TimerSnapshot {
    /// The cleared snapshot written when no session is running.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Checks the single-mode invariant: an active snapshot is exactly one of
    /// counting down, paused with a frozen value, or open-ended.
    pub fn is_consistent(&self) -> bool {
        if !self.is_active {
            return *self == Self::inactive();
        }
        let counting_down = self.end_timestamp.is_some() && !self.is_paused && !self.is_open_ended;
        let paused_countdown = self.is_paused
            && !self.is_open_ended
            && self.paused_remaining_seconds.is_some()
            && self.end_timestamp.is_none();
        let open_ended = self.is_open_ended
            && self.end_timestamp.is_none()
            && (!self.is_paused || self.paused_elapsed_seconds.is_some());
        [counting_down, paused_countdown, open_ended]
            .iter()
            .filter(|held| **held)
            .count()
            == 1
    }

    /// Wall-clock moment the session effectively began, used to judge
    /// staleness.
    ///
    /// A paused session is measured by the time already worked, as if it were
    /// resumed at `now`; time spent paused does not age it. A running session
    /// uses its stored start, falling back to the scheduled end.
    pub fn effective_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_paused {
            return if self.is_open_ended {
                self.paused_elapsed_seconds
                    .map(|elapsed| time_math::resume_start_for_open_ended(now, elapsed))
            } else {
                self.paused_remaining_seconds.map(|remaining| {
                    time_math::resume_start_for_countdown(now, self.selected_minutes, remaining)
                })
            };
        }
        if let Some(start) = self.start_timestamp {
            return Some(start);
        }
        self.end_timestamp.map(|end| {
            let planned = time_math::minutes_to_seconds(self.selected_minutes);
            end - chrono::Duration::seconds(planned as i64)
        })
    }

    /// Seconds left on a countdown snapshot as of `now`.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        if !self.is_active || self.is_open_ended {
            return None;
        }
        if self.is_paused {
            return self.paused_remaining_seconds;
        }
        self.end_timestamp
            .map(|end| time_math::remaining_seconds(end, now))
    }

    /// Seconds counted so far on an open-ended snapshot as of `now`.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        if !self.is_active || !self.is_open_ended {
            return None;
        }
        if self.is_paused {
            return self.paused_elapsed_seconds;
        }
        self.start_timestamp
            .map(|start| time_math::elapsed_seconds(start, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn running(now: DateTime<Utc>) -> TimerSnapshot {
        TimerSnapshot {
            is_active: true,
            selected_minutes: 25,
            start_timestamp: Some(now),
            end_timestamp: Some(now + Duration::minutes(25)),
            ..TimerSnapshot::default()
        }
    }

    #[test]
    fn running_countdown_is_consistent() {
        assert!(running(Utc::now()).is_consistent());
        assert!(TimerSnapshot::inactive().is_consistent());
    }

    #[test]
    fn paused_with_end_timestamp_is_inconsistent() {
        let mut snap = running(Utc::now());
        snap.is_paused = true;
        snap.paused_remaining_seconds = Some(60);
        assert!(!snap.is_consistent());
        snap.end_timestamp = None;
        assert!(snap.is_consistent());
    }

    #[test]
    fn inactive_with_leftovers_is_inconsistent() {
        let snap = TimerSnapshot {
            linked_task_title: Some("write report".into()),
            ..TimerSnapshot::default()
        };
        assert!(!snap.is_consistent());
    }

    #[test]
    fn boredom_level_rejects_out_of_range() {
        assert!(BoredomLevel::try_from(0).is_err());
        assert!(BoredomLevel::try_from(6).is_err());
        assert_eq!(BoredomLevel::try_from(3).unwrap().get(), 3);
        assert!(serde_json::from_str::<BoredomLevel>("9").is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(running(Utc::now())).unwrap();
        assert!(json.get("isActive").is_some());
        assert!(json.get("pausedRemainingSeconds").is_some());
        assert!(json.get("selectedMinutes").is_some());
    }

    #[test]
    fn effective_start_derives_from_paused_countdown() {
        let now = Utc::now();
        let snap = TimerSnapshot {
            is_active: true,
            is_paused: true,
            selected_minutes: 25,
            paused_remaining_seconds: Some(1_200),
            ..TimerSnapshot::default()
        };
        assert_eq!(snap.effective_start(now), Some(now - Duration::minutes(5)));
    }

    #[test]
    fn paused_countdown_ignores_stored_start() {
        let now = Utc::now();
        let snap = TimerSnapshot {
            is_active: true,
            is_paused: true,
            selected_minutes: 25,
            start_timestamp: Some(now - Duration::hours(25)),
            paused_remaining_seconds: Some(1_200),
            ..TimerSnapshot::default()
        };
        assert_eq!(snap.effective_start(now), Some(now - Duration::minutes(5)));
    }

    #[test]
    fn running_session_uses_stored_start() {
        let now = Utc::now();
        let mut snap = running(now - Duration::minutes(10));
        assert_eq!(snap.effective_start(now), Some(now - Duration::minutes(10)));
        snap.start_timestamp = None;
        assert_eq!(snap.effective_start(now), Some(now - Duration::minutes(10)));
    }
}

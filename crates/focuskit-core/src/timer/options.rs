//! Inputs and outputs of the focus timer commands.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{BoredomLevel, BreakOffer};
use crate::error::TimerError;
use crate::session::SessionType;

/// Longest countdown accepted by `start`.
pub const MAX_COUNTDOWN_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    /// A focus countdown finished and a break is on offer.
    Completed,
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Whether this surface drives the session or follows another surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    /// Display-only: never persists and never completes while its owner is
    /// still writing.
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StartMode {
    Countdown { minutes: u32 },
    OpenEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    pub mode: StartMode,
    #[serde(default)]
    pub linked_task_title: Option<String>,
    #[serde(default)]
    pub linked_task_id: Option<String>,
    #[serde(default)]
    pub boredom_level: Option<BoredomLevel>,
    /// Derived from the duration when not given.
    #[serde(default)]
    pub session_type: Option<SessionType>,
}

impl StartOptions {
    pub fn countdown(minutes: u32) -> Self {
        Self::with_mode(StartMode::Countdown { minutes })
    }

    pub fn open_ended() -> Self {
        Self::with_mode(StartMode::OpenEnded)
    }

    fn with_mode(mode: StartMode) -> Self {
        Self {
            mode,
            linked_task_title: None,
            linked_task_id: None,
            boredom_level: None,
            session_type: None,
        }
    }

    pub fn linked_task(mut self, title: impl Into<String>, id: Option<String>) -> Self {
        self.linked_task_title = Some(title.into());
        self.linked_task_id = id;
        self
    }

    pub fn boredom(mut self, level: BoredomLevel) -> Self {
        self.boredom_level = Some(level);
        self
    }

    pub fn planned_minutes(&self) -> Option<u32> {
        match self.mode {
            StartMode::Countdown { minutes } => Some(minutes),
            StartMode::OpenEnded => None,
        }
    }

    pub fn resolved_session_type(&self) -> SessionType {
        self.session_type
            .unwrap_or_else(|| SessionType::for_duration(self.planned_minutes()))
    }

    pub(crate) fn validate(&self) -> Result<(), TimerError> {
        if let StartMode::Countdown { minutes } = self.mode {
            if minutes == 0 || minutes > MAX_COUNTDOWN_MINUTES {
                return Err(TimerError::InvalidOptions(format!(
                    "countdown must be between 1 and {MAX_COUNTDOWN_MINUTES} minutes, got {minutes}"
                )));
            }
        }
        if self.session_type == Some(SessionType::OpenEnded)
            && self.mode != StartMode::OpenEnded
        {
            return Err(TimerError::InvalidOptions(
                "open-ended session type needs open-ended mode".into(),
            ));
        }
        Ok(())
    }
}

/// How an early stop is booked. Open-ended sessions ignore this and are
/// always credited and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StopDisposition {
    /// Add the elapsed minutes to today's totals.
    pub credit_time: bool,
    /// Finalize the record as completed and count it toward the cycle.
    pub count_as_unit: bool,
}

impl StopDisposition {
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn credit_only() -> Self {
        Self {
            credit_time: true,
            count_as_unit: false,
        }
    }

    pub fn credit_and_count() -> Self {
        Self {
            credit_time: true,
            count_as_unit: true,
        }
    }
}

/// The three ways to handle a paused session when starting a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausedSessionChoice {
    ResumePaused,
    /// Book the paused time as an interrupted session, then start.
    StartFreshCrediting,
    /// Drop the paused time entirely, then start.
    StartFreshDiscarding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Idle,
    Countdown,
    OpenEnded,
}

/// What a surface needs to draw the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub mode: DisplayMode,
    /// Remaining seconds for countdowns, elapsed seconds for open-ended runs.
    pub seconds: u64,
    pub is_paused: bool,
    pub is_break: bool,
    pub is_mirror: bool,
    /// False while the store is rejecting writes.
    pub is_synced: bool,
    pub break_offer: Option<BreakOffer>,
    pub linked_task_title: Option<String>,
}

impl DisplayState {
    /// `MM:SS`, or `H:MM:SS` past an hour.
    pub fn clock_face(&self) -> String {
        let hours = self.seconds / 3600;
        let minutes = (self.seconds % 3600) / 60;
        let seconds = self.seconds % 60;
        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes:02}:{seconds:02}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_bounds_are_validated() {
        assert!(StartOptions::countdown(0).validate().is_err());
        assert!(StartOptions::countdown(MAX_COUNTDOWN_MINUTES + 1).validate().is_err());
        assert!(StartOptions::countdown(25).validate().is_ok());
        assert!(StartOptions::open_ended().validate().is_ok());
    }

    #[test]
    fn session_type_is_derived() {
        assert_eq!(
            StartOptions::countdown(25).resolved_session_type(),
            SessionType::Pomodoro
        );
        assert_eq!(
            StartOptions::open_ended().resolved_session_type(),
            SessionType::OpenEnded
        );
    }

    #[test]
    fn clock_face_formats() {
        let mut display = DisplayState {
            mode: DisplayMode::Countdown,
            seconds: 1_500,
            is_paused: false,
            is_break: false,
            is_mirror: false,
            is_synced: true,
            break_offer: None,
            linked_task_title: None,
        };
        assert_eq!(display.clock_face(), "25:00");
        display.seconds = 3_725;
        assert_eq!(display.clock_face(), "1:02:05");
    }
}

//! Session history records.
//!
//! A [`SessionRecord`] is the durable fact of one focus attempt. The timer
//! creates it when a run starts and mutates it in place on pause, resume,
//! stop and completion; everything else reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::BoredomLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionType {
    Pomodoro,
    DeepWork,
    Flow,
    OpenEnded,
    Custom,
}

impl SessionType {
    /// Classify a run by its planned length.
    pub fn for_duration(minutes: Option<u32>) -> Self {
        match minutes {
            None => SessionType::OpenEnded,
            Some(25) => SessionType::Pomodoro,
            Some(50) => SessionType::DeepWork,
            Some(90) => SessionType::Flow,
            Some(_) => SessionType::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Interrupted,
    Paused,
}

impl SessionStatus {
    pub fn is_in_progress(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    /// 0 for open-ended sessions.
    pub planned_duration_minutes: u32,
    pub actual_duration_minutes: u32,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub linked_task_id: Option<String>,
    #[serde(default)]
    pub boredom_level: Option<BoredomLevel>,
}

impl SessionRecord {
    pub fn begin(
        session_type: SessionType,
        planned_duration_minutes: u32,
        start_time: DateTime<Utc>,
        linked_task_id: Option<String>,
        boredom_level: Option<BoredomLevel>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_type,
            planned_duration_minutes,
            actual_duration_minutes: 0,
            status: SessionStatus::Active,
            start_time,
            end_time: None,
            linked_task_id,
            boredom_level,
        }
    }

    pub fn finalize(&mut self, status: SessionStatus, actual_minutes: u32, at: DateTime<Utc>) {
        self.status = status;
        self.actual_duration_minutes = actual_minutes;
        self.end_time = Some(at);
    }
}

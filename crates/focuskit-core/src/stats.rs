//! Daily focus totals.
//!
//! [`DailyTotalsSink`] is the stats sink the CLI wires into the timer. It keeps
//! one small record per UTC day in the key-value store. Inside a tokio
//! runtime the update runs on the blocking pool, so crediting a session never
//! waits on the store.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::collaborators::StatsSink;
use crate::error::StoreError;
use crate::storage::KeyValueStore;

pub const DAILY_TOTALS_PREFIX: &str = "focus_daily_totals:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub focus_minutes: u64,
    /// Sessions that counted toward the focus cycle.
    pub completed_units: u64,
    /// Early stops whose time was credited without counting as a unit.
    pub partial_sessions: u64,
}

impl DailyTotals {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            focus_minutes: 0,
            completed_units: 0,
            partial_sessions: 0,
        }
    }
}

#[derive(Clone)]
pub struct DailyTotalsSink {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write updates.
    updates: Arc<Mutex<()>>,
}

impl DailyTotalsSink {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            updates: Arc::new(Mutex::new(())),
        }
    }

    pub fn today(&self) -> Result<DailyTotals, StoreError> {
        self.totals_for(self.clock.now().date_naive())
    }

    pub fn totals_for(&self, date: NaiveDate) -> Result<DailyTotals, StoreError> {
        let key = totals_key(date);
        match self.store.get(&key)? {
            Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                key,
                message: e.to_string(),
            }),
            None => Ok(DailyTotals::empty(date)),
        }
    }

    fn add(&self, date: NaiveDate, minutes: u32, counts_as_unit: bool) -> Result<(), StoreError> {
        let _guard = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        let mut totals = self.totals_for(date)?;
        totals.focus_minutes += u64::from(minutes);
        if counts_as_unit {
            totals.completed_units += 1;
        } else {
            totals.partial_sessions += 1;
        }
        let key = totals_key(totals.date);
        let json = serde_json::to_string(&totals).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.store.set(&key, &json)
    }

    fn record(&self, minutes: u32, counts_as_unit: bool) {
        let date = self.clock.now().date_naive();
        let sink = self.clone();
        let update = move || match sink.add(date, minutes, counts_as_unit) {
            Ok(()) => tracing::debug!(minutes, counts_as_unit, "daily totals updated"),
            Err(e) => tracing::warn!(error = %e, minutes, "could not update daily totals"),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(update);
            }
            Err(_) => update(),
        }
    }
}

impl StatsSink for DailyTotalsSink {
    fn on_session_completed(&self, duration_minutes: u32) {
        self.record(duration_minutes, true);
    }

    fn on_session_credited(&self, duration_minutes: u32, counts_as_unit: bool) {
        self.record(duration_minutes, counts_as_unit);
    }
}

fn totals_key(date: NaiveDate) -> String {
    format!("{DAILY_TOTALS_PREFIX}{}", date.format("%Y-%m-%d"))
}

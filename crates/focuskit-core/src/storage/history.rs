//! Append/update-only session history kept in the key-value store.

use std::sync::Arc;

use chrono::NaiveDate;

use super::KeyValueStore;
use crate::error::StoreError;
use crate::session::SessionRecord;

pub const HISTORY_KEY: &str = "focus_session_history";

#[derive(Clone)]
pub struct SessionHistory {
    store: Arc<dyn KeyValueStore>,
}

impl SessionHistory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        match self.store.get(HISTORY_KEY)? {
            Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                key: HISTORY_KEY.into(),
                message: e.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.list()?.into_iter().find(|record| record.id == id))
    }

    /// Insert `record`, or replace the record with the same id in place.
    pub fn upsert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut records = self.list()?;
        match records.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        let json = serde_json::to_string(&records).map_err(|e| StoreError::Corrupt {
            key: HISTORY_KEY.into(),
            message: e.to_string(),
        })?;
        self.store.set(HISTORY_KEY, &json)
    }

    /// The most recently started record that is still active or paused.
    ///
    /// A running snapshot does not carry its record id; this is how the
    /// record is found again.
    pub fn in_progress(&self) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.status.is_in_progress())
            .max_by_key(|record| record.start_time))
    }

    /// Records that started on `day` (UTC).
    pub fn list_for_day(&self, day: NaiveDate) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.start_time.date_naive() == day)
            .collect())
    }
}

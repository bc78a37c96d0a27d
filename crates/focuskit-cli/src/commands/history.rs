use std::sync::Arc;

use chrono::Utc;
use focuskit_core::{SessionHistory, SqliteStore};

pub fn run(today: bool) -> Result<(), Box<dyn std::error::Error>> {
    let history = SessionHistory::new(Arc::new(SqliteStore::open()?));
    let records = if today {
        history.list_for_day(Utc::now().date_naive())?
    } else {
        history.list()?
    };
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

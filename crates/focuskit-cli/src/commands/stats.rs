use std::sync::Arc;

use chrono::NaiveDate;
use clap::Subcommand;
use focuskit_core::{DailyTotalsSink, SqliteStore, SystemClock};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's focus totals
    Today,
    /// Focus totals for one day
    Day {
        /// Date as YYYY-MM-DD (UTC)
        date: NaiveDate,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let totals = DailyTotalsSink::new(Arc::new(SqliteStore::open()?), Arc::new(SystemClock));

    let day = match action {
        StatsAction::Today => totals.today()?,
        StatsAction::Day { date } => totals.totals_for(date)?,
    };
    println!("{}", serde_json::to_string_pretty(&day)?);
    Ok(())
}

//! Break sizing for the focus cycle.

use serde::{Deserialize, Serialize};

use crate::storage::DurationsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Short,
    Long,
}

/// The break proposed after a completed focus unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakOffer {
    pub kind: BreakKind,
    pub minutes: u32,
}

impl BreakOffer {
    /// Every `long_break_interval`-th completed unit earns a long break.
    ///
    /// `completed_units` already includes the unit that just finished.
    pub fn after_units(completed_units: u32, durations: &DurationsConfig) -> Self {
        let interval = durations.long_break_interval.max(1);
        if completed_units > 0 && completed_units % interval == 0 {
            Self {
                kind: BreakKind::Long,
                minutes: durations.long_break_minutes,
            }
        } else {
            Self {
                kind: BreakKind::Short,
                minutes: durations.short_break_minutes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fourth_unit_is_long_by_default() {
        let durations = DurationsConfig::default();
        let kinds: Vec<BreakKind> = (1..=8)
            .map(|n| BreakOffer::after_units(n, &durations).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Long,
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Short,
                BreakKind::Long,
            ]
        );
        assert_eq!(BreakOffer::after_units(4, &durations).minutes, 15);
        assert_eq!(BreakOffer::after_units(1, &durations).minutes, 5);
    }

    #[test]
    fn custom_interval() {
        let durations = DurationsConfig {
            long_break_interval: 2,
            ..DurationsConfig::default()
        };
        assert_eq!(BreakOffer::after_units(2, &durations).kind, BreakKind::Long);
        assert_eq!(BreakOffer::after_units(3, &durations).kind, BreakKind::Short);
    }
}

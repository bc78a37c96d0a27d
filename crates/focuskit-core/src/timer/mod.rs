mod breaks;
mod controller;
mod engine;
mod options;
mod snapshot;
pub mod time_math;

pub use breaks::{BreakKind, BreakOffer};
pub use controller::TimerController;
pub use engine::FocusTimer;
pub use options::{
    DisplayMode, DisplayState, PausedSessionChoice, Role, StartMode, StartOptions,
    StopDisposition, TimerPhase, MAX_COUNTDOWN_MINUTES,
};
pub use snapshot::{BoredomLevel, TimerSnapshot};

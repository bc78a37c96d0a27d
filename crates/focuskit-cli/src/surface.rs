//! The CLI as one more timer surface.
//!
//! Every invocation opens the shared SQLite store, wires terminal
//! collaborators and runs the startup restore before doing anything else.

use std::io::Write;
use std::sync::Arc;

use focuskit_core::{
    Clock, Collaborators, DailyTotalsSink, FocusTimer, NotificationKind, Notifier,
    RestoreOutcome, SessionRestorer, SoundPlayer, SqliteStore, SystemClock, TimerConfig,
    TimerStateStore,
};

/// Prints notifications to stderr so stdout stays machine-readable.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, kind: NotificationKind, title: &str, body: &str) {
        let tag = match kind {
            NotificationKind::SessionComplete | NotificationKind::BreakComplete => "done",
            NotificationKind::Notice => "note",
            NotificationKind::Warning => "warn",
        };
        eprintln!("[{tag}] {title}: {body}");
    }
}

/// Rings the terminal bell; the sound id is only logged.
struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, sound_id: &str) {
        tracing::debug!(sound_id, "ringing terminal bell");
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

pub struct Surface {
    pub timer: FocusTimer,
    pub restored: RestoreOutcome,
}

pub fn open() -> Result<Surface, Box<dyn std::error::Error>> {
    let config = TimerConfig::load_or_default();
    let store = Arc::new(SqliteStore::open()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let totals = Arc::new(DailyTotalsSink::new(store.clone(), clock.clone()));
    let collaborators = Collaborators {
        notifier: Arc::new(TerminalNotifier),
        sound: Arc::new(TerminalBell),
        stats: totals,
        ..Collaborators::default()
    };
    let mut timer = FocusTimer::new(
        clock,
        TimerStateStore::new(store),
        config.clone(),
        collaborators,
    );
    let restored = SessionRestorer::from_config(&config.behavior).restore(&mut timer);
    Ok(Surface { timer, restored })
}

/// Open the surface and take over a countdown left running by a surface that
/// is gone. Only for commands where the user acts on the session.
pub fn open_resuming() -> Result<Surface, Box<dyn std::error::Error>> {
    let mut surface = open()?;
    if let RestoreOutcome::ResumePrompt(pending) = &surface.restored {
        pending.clone().accept(&mut surface.timer);
    }
    Ok(surface)
}

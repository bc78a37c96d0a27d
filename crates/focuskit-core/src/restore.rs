//! Startup restore: decide what to do with the snapshot a previous run left
//! behind.
//!
//! The decision is made once per launch, before any surface acts:
//!
//! | saved snapshot                         | outcome                  |
//! |----------------------------------------|--------------------------|
//! | none                                   | nothing                  |
//! | inactive                               | cleared                  |
//! | running, written moments ago elsewhere | followed as a mirror     |
//! | effective start older than the cutoff  | cleared silently (stale) |
//! | paused                                 | rehydrated, no overlay   |
//! | countdown already at zero              | cleared, nothing credited|
//! | countdown with time left               | resume-or-discard prompt |
//! | open-ended                             | resumed immediately      |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{BehaviorConfig, SnapshotEnvelope};
use crate::timer::{FocusTimer, TimerSnapshot};

/// What the restorer did with the saved snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    NothingSaved,
    ClearedInactive,
    /// Older than the staleness cutoff.
    Stale { age_hours: i64 },
    /// A paused session exists; `has_paused_session()` is now true.
    PausedRehydrated,
    /// Finished while no surface was open.
    ExpiredWhileClosed,
    ResumePrompt(PendingResume),
    ResumedOpenEnded { elapsed_secs: u64 },
    /// Another surface is still driving the session; this one mirrors it.
    FollowingOwner { origin: String },
    /// The store could not be read; nothing was changed.
    Unreadable,
}

impl RestoreOutcome {
    /// Whether the running-session overlay should be shown right away.
    pub fn shows_running_overlay(&self) -> bool {
        matches!(
            self,
            RestoreOutcome::ResumedOpenEnded { .. } | RestoreOutcome::FollowingOwner { .. }
        )
    }
}

/// A countdown that still has time left, waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResume {
    snapshot: TimerSnapshot,
    pub remaining_secs: u64,
    pub is_break: bool,
}

impl PendingResume {
    /// Continue the countdown where it is by wall-clock time.
    pub fn accept(self, timer: &mut FocusTimer) {
        tracing::info!(remaining_secs = self.remaining_secs, "resuming saved countdown");
        timer.rehydrate(self.snapshot);
    }

    /// Drop the saved countdown. Nothing is credited.
    pub fn discard(self, timer: &mut FocusTimer) {
        tracing::info!("discarding saved countdown");
        let now = timer.now();
        timer.abandon_saved(now);
    }
}

#[derive(Debug, Clone)]
pub struct SessionRestorer {
    stale_after: Duration,
    owner_silence: Duration,
}

impl SessionRestorer {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            owner_silence: BehaviorConfig::default().owner_silence(),
        }
    }

    pub fn from_config(behavior: &BehaviorConfig) -> Self {
        Self {
            stale_after: Duration::hours(i64::from(behavior.stale_after_hours)),
            owner_silence: behavior.owner_silence(),
        }
    }

    /// Classify the saved snapshot and apply the decision to `timer`.
    ///
    /// Must run before the timer is used.
    pub fn restore(&self, timer: &mut FocusTimer) -> RestoreOutcome {
        let saved = match timer.store().read_envelope() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(error = %e, "could not read saved timer state");
                return RestoreOutcome::Unreadable;
            }
        };
        let now = timer.now();
        let outcome = self.classify(saved, now, timer);
        tracing::info!(outcome = outcome_name(&outcome), "session restore finished");
        outcome
    }

    fn classify(
        &self,
        saved: Option<SnapshotEnvelope>,
        now: DateTime<Utc>,
        timer: &mut FocusTimer,
    ) -> RestoreOutcome {
        let Some(envelope) = saved else {
            return RestoreOutcome::NothingSaved;
        };
        let snapshot = envelope.snapshot.clone();
        if !snapshot.is_active {
            if snapshot != TimerSnapshot::inactive() {
                timer.abandon_saved(now);
            }
            return RestoreOutcome::ClearedInactive;
        }
        if !snapshot.is_consistent() {
            tracing::warn!(?snapshot, "saved snapshot is inconsistent, clearing it");
            timer.abandon_saved(now);
            return RestoreOutcome::Stale { age_hours: 0 };
        }

        // A running owner rewrites the snapshot every tick.
        if !snapshot.is_paused
            && envelope.origin != timer.store().origin()
            && now - envelope.written_at < self.owner_silence
        {
            let origin = envelope.origin.clone();
            timer.apply_remote(envelope);
            return RestoreOutcome::FollowingOwner { origin };
        }

        let age = snapshot
            .effective_start(now)
            .map(|start| now - start)
            .unwrap_or_else(Duration::zero);
        if age >= self.stale_after {
            timer.abandon_saved(now);
            return RestoreOutcome::Stale {
                age_hours: age.num_hours(),
            };
        }

        if snapshot.is_paused {
            timer.rehydrate(snapshot);
            timer.notice(
                "Paused session waiting",
                "You have a paused focus session. Resume it or start fresh.",
            );
            return RestoreOutcome::PausedRehydrated;
        }

        if snapshot.is_open_ended {
            let elapsed_secs = snapshot.elapsed_seconds(now).unwrap_or(0);
            timer.rehydrate(snapshot);
            return RestoreOutcome::ResumedOpenEnded { elapsed_secs };
        }

        match snapshot.remaining_seconds(now) {
            Some(remaining) if remaining > 0 => RestoreOutcome::ResumePrompt(PendingResume {
                is_break: snapshot.is_break,
                remaining_secs: remaining,
                snapshot,
            }),
            _ => {
                timer.abandon_saved(now);
                RestoreOutcome::ExpiredWhileClosed
            }
        }
    }
}

impl Default for SessionRestorer {
    fn default() -> Self {
        Self::from_config(&BehaviorConfig::default())
    }
}

fn outcome_name(outcome: &RestoreOutcome) -> &'static str {
    match outcome {
        RestoreOutcome::NothingSaved => "nothing_saved",
        RestoreOutcome::ClearedInactive => "cleared_inactive",
        RestoreOutcome::Stale { .. } => "stale",
        RestoreOutcome::PausedRehydrated => "paused_rehydrated",
        RestoreOutcome::ExpiredWhileClosed => "expired_while_closed",
        RestoreOutcome::ResumePrompt(_) => "resume_prompt",
        RestoreOutcome::ResumedOpenEnded { .. } => "resumed_open_ended",
        RestoreOutcome::FollowingOwner { .. } => "following_owner",
        RestoreOutcome::Unreadable => "unreadable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::Collaborators;
    use crate::session::SessionStatus;
    use crate::storage::{MemoryStore, TimerConfig, TimerStateStore};
    use crate::timer::{StartOptions, TimerPhase};
    use std::sync::Arc;

    struct Launch {
        clock: ManualClock,
        store: MemoryStore,
    }

    impl Launch {
        fn new() -> Self {
            Self {
                clock: ManualClock::new(Utc::now()),
                store: MemoryStore::new(),
            }
        }

        /// A fresh timer, as after an app restart.
        fn timer(&self) -> FocusTimer {
            FocusTimer::new(
                Arc::new(self.clock.clone()),
                TimerStateStore::new(Arc::new(self.store.clone())),
                TimerConfig::default(),
                Collaborators::default(),
            )
        }
    }

    #[test]
    fn empty_store_is_a_no_op() {
        let launch = Launch::new();
        let mut timer = launch.timer();
        assert_eq!(
            SessionRestorer::default().restore(&mut timer),
            RestoreOutcome::NothingSaved
        );
    }

    #[test]
    fn running_countdown_prompts_then_resumes() {
        let launch = Launch::new();
        launch.timer().start(StartOptions::countdown(25)).unwrap();
        launch.clock.advance(Duration::minutes(10));

        let mut timer = launch.timer();
        let outcome = SessionRestorer::default().restore(&mut timer);
        assert!(!outcome.shows_running_overlay());
        let RestoreOutcome::ResumePrompt(pending) = outcome else {
            panic!("expected a resume prompt, got {outcome:?}");
        };
        assert_eq!(pending.remaining_secs, 15 * 60);
        assert_eq!(timer.phase(), TimerPhase::Idle);

        pending.accept(&mut timer);
        assert_eq!(timer.phase(), TimerPhase::Running);
        assert_eq!(timer.remaining_seconds(), Some(15 * 60));
        assert!(timer.session().is_some());
    }

    #[test]
    fn live_owner_is_followed_instead_of_prompting() {
        let launch = Launch::new();
        let mut owner = launch.timer();
        owner.start(StartOptions::countdown(25)).unwrap();
        launch.clock.advance(Duration::seconds(2));
        owner.tick();
        let owner_origin = owner.store().origin().to_string();

        let mut timer = launch.timer();
        let outcome = SessionRestorer::default().restore(&mut timer);
        assert_eq!(
            outcome,
            RestoreOutcome::FollowingOwner {
                origin: owner_origin.clone()
            }
        );
        assert!(outcome.shows_running_overlay());
        assert_eq!(timer.role(), crate::timer::Role::Mirror);
        assert_eq!(timer.phase(), TimerPhase::Running);
        let saved = timer.store().read_envelope().unwrap().unwrap();
        assert_eq!(saved.origin, owner_origin);
    }

    #[test]
    fn quiet_owner_leaves_a_prompt() {
        let launch = Launch::new();
        launch.timer().start(StartOptions::countdown(25)).unwrap();
        launch.clock.advance(Duration::seconds(6));

        let mut timer = launch.timer();
        assert!(matches!(
            SessionRestorer::default().restore(&mut timer),
            RestoreOutcome::ResumePrompt(_)
        ));
    }

    #[test]
    fn discarding_the_prompt_interrupts_the_record() {
        let launch = Launch::new();
        launch.timer().start(StartOptions::countdown(25)).unwrap();
        launch.clock.advance(Duration::minutes(10));

        let mut timer = launch.timer();
        let RestoreOutcome::ResumePrompt(pending) = SessionRestorer::default().restore(&mut timer)
        else {
            panic!("expected a resume prompt");
        };
        pending.discard(&mut timer);
        assert_eq!(timer.store().read().unwrap(), Some(TimerSnapshot::inactive()));
        let record = timer.history().list().unwrap().pop().unwrap();
        assert_eq!(record.status, SessionStatus::Interrupted);
    }

    #[test]
    fn countdown_that_ran_out_is_cleared_without_credit() {
        let launch = Launch::new();
        launch.timer().start(StartOptions::countdown(25)).unwrap();
        launch.clock.advance(Duration::minutes(40));

        let mut timer = launch.timer();
        assert_eq!(
            SessionRestorer::default().restore(&mut timer),
            RestoreOutcome::ExpiredWhileClosed
        );
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert_eq!(timer.cycle().completed_units, 0);
    }

    #[test]
    fn open_ended_resumes_without_prompt() {
        let launch = Launch::new();
        launch.timer().start(StartOptions::open_ended()).unwrap();
        launch.clock.advance(Duration::hours(3));

        let mut timer = launch.timer();
        let outcome = SessionRestorer::default().restore(&mut timer);
        assert_eq!(
            outcome,
            RestoreOutcome::ResumedOpenEnded {
                elapsed_secs: 3 * 3600
            }
        );
        assert!(outcome.shows_running_overlay());
        assert_eq!(timer.phase(), TimerPhase::Running);
    }

    #[test]
    fn stale_cutoff_is_configurable() {
        let launch = Launch::new();
        launch.timer().start(StartOptions::open_ended()).unwrap();
        launch.clock.advance(Duration::hours(3));

        let mut timer = launch.timer();
        let outcome = SessionRestorer::new(Duration::hours(2)).restore(&mut timer);
        assert_eq!(outcome, RestoreOutcome::Stale { age_hours: 3 });
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn unreadable_store_is_left_alone() {
        let launch = Launch::new();
        let mut timer = launch.timer();
        launch.store.set_offline(true);
        assert_eq!(
            SessionRestorer::default().restore(&mut timer),
            RestoreOutcome::Unreadable
        );
    }
}

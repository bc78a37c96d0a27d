//! Focus timer state machine.
//!
//! The timer is timestamp-driven: remaining and elapsed time are always
//! recomputed from absolute instants, never from a decremented counter, so it
//! survives suspension, sleep and restarts. It does not use internal threads;
//! the caller invokes `tick()` periodically (see [`super::TimerController`]).
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running -> Completed
//!      -> (Break Running -> Break Paused -> Break Completed) -> Idle
//! ```
//!
//! `stop()` is reachable from every non-idle phase. Every transition made by
//! the owning surface is persisted through the [`TimerStateStore`]; remote
//! transitions are replayed with [`FocusTimer::apply_remote`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::breaks::BreakOffer;
use super::options::{
    DisplayMode, DisplayState, PausedSessionChoice, Role, StartOptions,
    StopDisposition, TimerPhase,
};
use super::snapshot::TimerSnapshot;
use super::time_math;
use crate::clock::Clock;
use crate::collaborators::{Collaborators, NotificationKind};
use crate::error::{StoreError, TimerError};
use crate::events::Event;
use crate::session::{SessionRecord, SessionStatus};
use crate::storage::{
    CycleState, PendingWrite, SessionHistory, SnapshotEnvelope, StoreWriter, TimerConfig,
    TimerStateStore, WriteKind, WriteResult,
};

pub struct FocusTimer {
    clock: Arc<dyn Clock>,
    store: TimerStateStore,
    history: SessionHistory,
    writer: StoreWriter,
    config: TimerConfig,
    collaborators: Collaborators,

    phase: TimerPhase,
    role: Role,
    /// In-memory fields, kept in the persisted shape.
    snapshot: TimerSnapshot,
    session: Option<SessionRecord>,
    cycle: CycleState,
    break_offer: Option<BreakOffer>,
    synced: bool,
    /// When the followed owner last wrote, while mirroring.
    owner_seen_at: Option<DateTime<Utc>>,
}

impl FocusTimer {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: TimerStateStore,
        config: TimerConfig,
        collaborators: Collaborators,
    ) -> Self {
        let history = SessionHistory::new(store.backing().clone());
        let mut synced = true;
        let cycle = store.read_cycle().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read cycle state, starting a fresh cycle");
            synced = false;
            CycleState::default()
        });
        let writer = StoreWriter::new(store.clone(), history.clone());
        Self {
            clock,
            store,
            history,
            writer,
            config,
            collaborators,
            phase: TimerPhase::Idle,
            role: Role::Owner,
            snapshot: TimerSnapshot::inactive(),
            session: None,
            cycle,
            break_offer: None,
            synced,
            owner_seen_at: None,
        }
    }

    /// Hand persistence to a background writer so ticks and commands never
    /// wait on the store. Must be called inside a tokio runtime.
    pub fn write_behind(&mut self) {
        self.writer.spawn_background();
    }

    /// Resolves once every write queued so far has reached the store. `None`
    /// when writing inline.
    pub fn flush_writes(&self) -> Option<tokio::sync::oneshot::Receiver<()>> {
        self.writer.flush()
    }

    /// Apply the results of finished background writes without ticking.
    pub fn settle_writes(&mut self) {
        self.collect_writes();
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn snapshot(&self) -> &TimerSnapshot {
        &self.snapshot
    }

    /// The in-progress record, if this surface knows it.
    pub fn session(&self) -> Option<&SessionRecord> {
        self.session.as_ref()
    }

    pub fn break_offer(&self) -> Option<BreakOffer> {
        self.break_offer
    }

    pub fn cycle(&self) -> &CycleState {
        &self.cycle
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn store(&self) -> &TimerStateStore {
        &self.store
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_break(&self) -> bool {
        self.snapshot.is_break
    }

    /// False while the store is rejecting writes; the timer keeps running in
    /// memory and retries on every tick.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Must be checked before a UI-initiated `start()`.
    pub fn has_paused_session(&self) -> bool {
        self.phase == TimerPhase::Paused
    }

    /// Whether a periodic tick is needed right now.
    pub fn wants_ticks(&self) -> bool {
        self.phase == TimerPhase::Running
            || (!self.synced && self.role == Role::Owner)
            || self.writer.in_flight()
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        self.snapshot.remaining_seconds(self.clock.now())
    }

    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.snapshot.elapsed_seconds(self.clock.now())
    }

    pub fn display_state(&self) -> DisplayState {
        let now = self.clock.now();
        let (mode, seconds) = if !self.snapshot.is_active {
            (DisplayMode::Idle, 0)
        } else if self.snapshot.is_open_ended {
            (
                DisplayMode::OpenEnded,
                self.snapshot.elapsed_seconds(now).unwrap_or(0),
            )
        } else {
            (
                DisplayMode::Countdown,
                self.snapshot.remaining_seconds(now).unwrap_or(0),
            )
        };
        DisplayState {
            mode,
            seconds,
            is_paused: self.snapshot.is_paused,
            is_break: self.snapshot.is_break,
            is_mirror: self.role == Role::Mirror,
            is_synced: self.synced,
            break_offer: self.break_offer,
            linked_task_title: self.snapshot.linked_task_title.clone(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a focus session. Only valid from idle.
    ///
    /// Returns [`TimerError::AmbiguousResume`] when a paused session exists;
    /// use [`FocusTimer::start_resolving`] with the user's choice instead.
    pub fn start(&mut self, options: StartOptions) -> Result<Event, TimerError> {
        if self.phase == TimerPhase::Paused {
            tracing::info!("start refused: a paused session needs a decision first");
            return Err(TimerError::AmbiguousResume);
        }
        if self.phase != TimerPhase::Idle {
            return Err(self.reject("start"));
        }
        options.validate()?;
        let now = self.clock.now();
        Ok(self.begin_focus(options, now))
    }

    /// Start while honoring the user's decision about a paused session.
    pub fn start_resolving(
        &mut self,
        options: StartOptions,
        choice: PausedSessionChoice,
    ) -> Result<Vec<Event>, TimerError> {
        if !self.has_paused_session() {
            return self.start(options).map(|event| vec![event]);
        }
        if choice != PausedSessionChoice::ResumePaused {
            options.validate()?;
        }
        match choice {
            PausedSessionChoice::ResumePaused => self.resume().map(|event| vec![event]),
            PausedSessionChoice::StartFreshCrediting => {
                let stopped = self.stop(StopDisposition::credit_only())?;
                Ok(vec![stopped, self.start(options)?])
            }
            PausedSessionChoice::StartFreshDiscarding => {
                let stopped = self.stop(StopDisposition::discard())?;
                Ok(vec![stopped, self.start(options)?])
            }
        }
    }

    pub fn pause(&mut self) -> Result<Event, TimerError> {
        if self.phase != TimerPhase::Running {
            return Err(self.reject("pause"));
        }
        self.take_ownership();
        let now = self.clock.now();

        // A countdown that already ran out completes instead of pausing.
        if let Some(event) = self.tick_at(now) {
            tracing::info!("pause arrived after the countdown ended");
            return Ok(event);
        }

        let (remaining, elapsed) = if self.snapshot.is_open_ended {
            let elapsed = self.snapshot.elapsed_seconds(now).unwrap_or(0);
            self.snapshot.paused_elapsed_seconds = Some(elapsed);
            (None, Some(elapsed))
        } else {
            let remaining = self.snapshot.remaining_seconds(now).unwrap_or(0);
            self.snapshot.paused_remaining_seconds = Some(remaining);
            (Some(remaining), None)
        };
        self.snapshot.end_timestamp = None;
        self.snapshot.is_paused = true;
        self.phase = TimerPhase::Paused;

        if !self.snapshot.is_break {
            self.collaborators.blocker.disable();
            let minutes = self.worked_minutes(now);
            self.update_session(|record| {
                record.status = SessionStatus::Paused;
                record.actual_duration_minutes = minutes;
            });
        }
        self.persist(now);
        tracing::info!(?remaining, ?elapsed, is_break = self.snapshot.is_break, "timer paused");

        Ok(Event::TimerPaused {
            remaining_secs: remaining,
            elapsed_secs: elapsed,
            at: now,
        })
    }

    pub fn resume(&mut self) -> Result<Event, TimerError> {
        if self.phase != TimerPhase::Paused {
            return Err(self.reject("resume"));
        }
        self.take_ownership();
        let now = self.clock.now();

        let (remaining, elapsed) = if self.snapshot.is_open_ended {
            let elapsed = self.snapshot.paused_elapsed_seconds.unwrap_or(0);
            self.snapshot.start_timestamp =
                Some(time_math::resume_start_for_open_ended(now, elapsed));
            (None, Some(elapsed))
        } else {
            let remaining = self.snapshot.paused_remaining_seconds.unwrap_or(0);
            self.snapshot.end_timestamp = Some(time_math::resume_end_timestamp(now, remaining));
            self.snapshot.start_timestamp = Some(time_math::resume_start_for_countdown(
                now,
                self.snapshot.selected_minutes,
                remaining,
            ));
            (Some(remaining), None)
        };
        self.snapshot.paused_remaining_seconds = None;
        self.snapshot.paused_elapsed_seconds = None;
        self.snapshot.is_paused = false;
        self.phase = TimerPhase::Running;

        if !self.snapshot.is_break {
            self.enable_blocking(remaining);
            self.update_session(|record| record.status = SessionStatus::Active);
        }
        self.persist(now);
        tracing::info!(?remaining, ?elapsed, "timer resumed");

        Ok(Event::TimerResumed {
            remaining_secs: remaining,
            elapsed_secs: elapsed,
            at: now,
        })
    }

    /// End the current session or break and return to idle.
    pub fn stop(&mut self, disposition: StopDisposition) -> Result<Event, TimerError> {
        if self.phase == TimerPhase::Idle {
            return Err(self.reject("stop"));
        }
        self.take_ownership();
        let now = self.clock.now();

        // Declining a break offer, or ending a break: nothing to book.
        if self.phase == TimerPhase::Completed || self.snapshot.is_break {
            tracing::info!(phase = %self.phase, "break ended early");
            self.reset_to_idle(now);
            return Ok(Event::TimerStopped {
                session_id: None,
                status: None,
                actual_minutes: 0,
                credited: false,
                at: now,
            });
        }

        let disposition = if self.snapshot.is_open_ended {
            StopDisposition::credit_and_count()
        } else {
            disposition
        };
        let minutes = self.worked_minutes(now);
        let status = if disposition.count_as_unit {
            SessionStatus::Completed
        } else {
            SessionStatus::Interrupted
        };
        self.update_session(|record| record.finalize(status, minutes, now));
        let session_id = self.session.as_ref().map(|record| record.id.clone());

        if disposition.credit_time {
            self.collaborators
                .stats
                .on_session_credited(minutes, disposition.count_as_unit);
        }
        if disposition.count_as_unit {
            self.cycle.completed_units += 1;
            self.save_cycle();
        }
        self.collaborators.blocker.disable();
        tracing::info!(
            session_id = session_id.as_deref().unwrap_or("-"),
            minutes,
            ?status,
            credited = disposition.credit_time,
            "session stopped"
        );
        self.reset_to_idle(now);

        Ok(Event::TimerStopped {
            session_id,
            status: Some(status),
            actual_minutes: minutes,
            credited: disposition.credit_time,
            at: now,
        })
    }

    /// Accept the break offered after a completed focus unit.
    pub fn start_break(&mut self) -> Result<Event, TimerError> {
        let offer = match (self.phase, self.break_offer) {
            (TimerPhase::Completed, Some(offer)) => offer,
            _ => return Err(self.reject("start a break")),
        };
        self.take_ownership();
        let now = self.clock.now();
        Ok(self.begin_break(offer, now))
    }

    /// End the break (running, paused or merely offered) and immediately
    /// start a focus session with the last-used duration.
    pub fn skip_break(&mut self) -> Result<Vec<Event>, TimerError> {
        let on_break = self.snapshot.is_break
            && matches!(self.phase, TimerPhase::Running | TimerPhase::Paused);
        if !on_break && self.phase != TimerPhase::Completed {
            return Err(self.reject("skip a break"));
        }
        self.take_ownership();
        let now = self.clock.now();
        tracing::info!("break skipped");
        self.reset_to_idle(now);
        let started = self.begin_focus(self.next_focus_options(), now);
        Ok(vec![Event::BreakSkipped { at: now }, started])
    }

    /// Call periodically. Returns an event when a countdown completes.
    ///
    /// Idempotent for a given `now`: repeating it changes nothing further.
    pub fn tick(&mut self) -> Option<Event> {
        let now = self.clock.now();
        self.tick_at(now)
    }

    /// Follow a snapshot written by another surface.
    ///
    /// Own echoes and unchanged snapshots are ignored. Remote transitions are
    /// replayed into local fields without persisting or booking anything; the
    /// writer already did.
    pub fn apply_remote(&mut self, envelope: SnapshotEnvelope) -> Option<Event> {
        if envelope.origin == self.store.origin() {
            tracing::debug!(revision = envelope.revision, "ignoring own snapshot echo");
            return None;
        }
        self.owner_seen_at = Some(envelope.written_at);
        let remote = envelope.snapshot;
        if remote == self.snapshot {
            if remote.is_active {
                self.role = Role::Mirror;
            }
            return None;
        }

        let now = self.clock.now();
        if !remote.is_active {
            if self.phase == TimerPhase::Idle {
                return None;
            }
            tracing::info!(origin = %envelope.origin, "session ended on another surface");
            self.phase = TimerPhase::Idle;
            self.role = Role::Owner;
            self.snapshot = TimerSnapshot::inactive();
            self.session = None;
            self.break_offer = None;
        } else {
            tracing::info!(
                origin = %envelope.origin,
                paused = remote.is_paused,
                is_break = remote.is_break,
                "following session from another surface"
            );
            self.phase = if remote.is_paused {
                TimerPhase::Paused
            } else {
                TimerPhase::Running
            };
            self.role = Role::Mirror;
            self.break_offer = None;
            self.session = if remote.is_break {
                None
            } else {
                self.load_in_progress()
            };
            self.snapshot = remote;
        }

        Some(Event::RemoteApplied {
            origin: envelope.origin,
            is_active: self.snapshot.is_active,
            is_paused: self.snapshot.is_paused,
            at: now,
        })
    }

    // ── Restore support ──────────────────────────────────────────────

    /// Load a saved snapshot as this surface's own session.
    pub(crate) fn rehydrate(&mut self, snapshot: TimerSnapshot) {
        self.phase = if snapshot.is_paused {
            TimerPhase::Paused
        } else {
            TimerPhase::Running
        };
        self.role = Role::Owner;
        self.break_offer = None;
        self.session = if snapshot.is_break {
            None
        } else {
            self.load_in_progress()
        };
        self.snapshot = snapshot;
        if self.phase == TimerPhase::Running {
            let now = self.clock.now();
            self.persist(now);
        }
    }

    pub(crate) fn notice(&self, title: &str, body: &str) {
        if self.config.notifications.enabled {
            self.collaborators.notify(NotificationKind::Notice, title, body);
        }
    }

    /// Drop a saved session that will not be resumed. The record, if found,
    /// is booked as interrupted and nothing is credited.
    pub(crate) fn abandon_saved(&mut self, now: DateTime<Utc>) {
        match self.history.in_progress() {
            Ok(Some(mut record)) => {
                let minutes = record.actual_duration_minutes;
                record.finalize(SessionStatus::Interrupted, minutes, now);
                self.submit(PendingWrite::Session(record));
            }
            Ok(None) => {}
            Err(e) => self.note_store_failure(&e),
        }
        self.reset_to_idle(now);
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn tick_at(&mut self, now: DateTime<Utc>) -> Option<Event> {
        self.collect_writes();
        if self.phase != TimerPhase::Running {
            if !self.synced && self.role == Role::Owner {
                self.persist(now);
            }
            return None;
        }
        if self.role == Role::Mirror {
            if !self.owner_went_quiet(now) {
                // Display is recomputed from the snapshot on demand.
                return None;
            }
            tracing::info!("owning surface stopped writing, taking the session over");
            self.take_ownership();
        }

        if !self.snapshot.is_open_ended {
            let remaining = self.snapshot.remaining_seconds(now).unwrap_or(0);
            if remaining == 0 {
                return Some(self.complete(now));
            }
        }
        if !self.snapshot.is_break {
            let minutes = self.worked_minutes(now);
            let estimate = self.session.as_ref().map(|r| r.actual_duration_minutes);
            if matches!(estimate, Some(current) if current != minutes) {
                self.update_session(|record| record.actual_duration_minutes = minutes);
            }
        }
        self.persist(now);
        None
    }

    fn complete(&mut self, now: DateTime<Utc>) -> Event {
        if self.snapshot.is_break {
            return self.complete_break(now);
        }

        let planned = self.snapshot.selected_minutes;
        self.update_session(|record| record.finalize(SessionStatus::Completed, planned, now));
        let session_id = self
            .session
            .as_ref()
            .map(|record| record.id.clone())
            .unwrap_or_default();
        self.collaborators.stats.on_session_completed(planned);
        self.collaborators.blocker.disable();

        self.cycle.completed_units += 1;
        self.save_cycle();
        let offer = BreakOffer::after_units(self.cycle.completed_units, &self.config.durations);

        let sound = self.config.notifications.completion_sound.clone();
        self.announce(
            NotificationKind::SessionComplete,
            "Focus session complete",
            &format!("{planned} minutes done. Time for a {} minute break.", offer.minutes),
            &sound,
        );
        tracing::info!(session_id = %session_id, planned, ?offer, "focus session completed");

        self.snapshot = TimerSnapshot::inactive();
        self.session = None;
        self.phase = TimerPhase::Completed;
        self.break_offer = Some(offer);
        self.persist(now);

        if self.config.behavior.auto_start_breaks {
            self.begin_break(offer, now);
        }

        Event::SessionCompleted {
            session_id,
            duration_minutes: planned,
            break_offer: Some(offer),
            at: now,
        }
    }

    fn complete_break(&mut self, now: DateTime<Utc>) -> Event {
        let sound = self.config.notifications.break_end_sound.clone();
        self.announce(
            NotificationKind::BreakComplete,
            "Break over",
            "Ready for the next focus session?",
            &sound,
        );
        let auto_continue = self.config.behavior.auto_continue;
        tracing::info!(auto_continue, "break completed");

        self.reset_to_idle(now);
        if auto_continue {
            self.begin_focus(self.next_focus_options(), now);
        }
        Event::BreakCompleted {
            auto_continue,
            at: now,
        }
    }

    fn begin_focus(&mut self, options: StartOptions, now: DateTime<Utc>) -> Event {
        let planned = options.planned_minutes();
        let record = SessionRecord::begin(
            options.resolved_session_type(),
            planned.unwrap_or(0),
            now,
            options.linked_task_id.clone(),
            options.boredom_level,
        );
        self.submit(PendingWrite::Session(record.clone()));

        self.snapshot = TimerSnapshot {
            is_active: true,
            is_open_ended: planned.is_none(),
            selected_minutes: planned.unwrap_or(0),
            start_timestamp: Some(now),
            end_timestamp: planned
                .map(|minutes| now + Duration::seconds(time_math::minutes_to_seconds(minutes) as i64)),
            linked_task_title: options.linked_task_title.clone(),
            boredom_level: options.boredom_level,
            ..TimerSnapshot::default()
        };
        self.phase = TimerPhase::Running;
        self.role = Role::Owner;
        self.break_offer = None;
        let session_id = record.id.clone();
        self.session = Some(record);

        self.cycle.last_focus_minutes = planned.or(self.cycle.last_focus_minutes);
        self.cycle.last_open_ended = planned.is_none();
        self.save_cycle();

        self.enable_blocking(planned.map(time_math::minutes_to_seconds));
        self.persist(now);
        tracing::info!(session_id = %session_id, ?planned, "focus session started");

        Event::TimerStarted {
            session_id: Some(session_id),
            is_break: false,
            duration_secs: planned.map(time_math::minutes_to_seconds),
            at: now,
        }
    }

    fn begin_break(&mut self, offer: BreakOffer, now: DateTime<Utc>) -> Event {
        let seconds = time_math::minutes_to_seconds(offer.minutes);
        self.snapshot = TimerSnapshot {
            is_active: true,
            is_break: true,
            selected_minutes: offer.minutes,
            start_timestamp: Some(now),
            end_timestamp: Some(now + Duration::seconds(seconds as i64)),
            ..TimerSnapshot::default()
        };
        self.phase = TimerPhase::Running;
        self.role = Role::Owner;
        self.session = None;
        self.break_offer = None;
        self.persist(now);
        tracing::info!(kind = ?offer.kind, minutes = offer.minutes, "break started");

        Event::TimerStarted {
            session_id: None,
            is_break: true,
            duration_secs: Some(seconds),
            at: now,
        }
    }

    fn reset_to_idle(&mut self, now: DateTime<Utc>) {
        self.phase = TimerPhase::Idle;
        self.role = Role::Owner;
        self.snapshot = TimerSnapshot::inactive();
        self.session = None;
        self.break_offer = None;
        self.persist(now);
    }

    fn next_focus_options(&self) -> StartOptions {
        if self.cycle.last_open_ended {
            StartOptions::open_ended()
        } else {
            StartOptions::countdown(
                self.cycle
                    .last_focus_minutes
                    .unwrap_or(self.config.durations.focus_minutes),
            )
        }
    }

    /// Whole minutes of focus in the current run, frozen values included.
    fn worked_minutes(&self, now: DateTime<Utc>) -> u32 {
        let seconds = if self.snapshot.is_open_ended {
            self.snapshot.elapsed_seconds(now).unwrap_or(0)
        } else {
            let planned = time_math::minutes_to_seconds(self.snapshot.selected_minutes);
            planned.saturating_sub(self.snapshot.remaining_seconds(now).unwrap_or(planned))
        };
        time_math::whole_minutes(seconds)
    }

    fn take_ownership(&mut self) {
        if self.role == Role::Owner {
            return;
        }
        tracing::info!("taking ownership of session from mirror");
        self.role = Role::Owner;
        self.owner_seen_at = None;
        if self.session.is_none() && !self.snapshot.is_break && self.snapshot.is_active {
            self.session = self.load_in_progress();
        }
    }

    fn load_in_progress(&mut self) -> Option<SessionRecord> {
        match self.history.in_progress() {
            Ok(record) => record,
            Err(e) => {
                self.note_store_failure(&e);
                None
            }
        }
    }

    fn update_session(&mut self, apply: impl FnOnce(&mut SessionRecord)) {
        let Some(record) = self.session.as_mut() else {
            tracing::debug!("no session record to update");
            return;
        };
        apply(record);
        let record = record.clone();
        self.submit(PendingWrite::Session(record));
    }

    fn save_cycle(&mut self) {
        self.submit(PendingWrite::Cycle(self.cycle.clone()));
    }

    fn enable_blocking(&self, remaining_secs: Option<u64>) {
        if !self.config.blocking.enabled {
            return;
        }
        let minutes = remaining_secs
            .map(|secs| secs.div_ceil(60).min(u32::MAX as u64) as u32)
            .unwrap_or(0);
        self.collaborators.blocker.enable(minutes);
    }

    fn announce(&self, kind: NotificationKind, title: &str, body: &str, sound: &str) {
        let prefs = &self.config.notifications;
        if prefs.enabled {
            self.collaborators.notify(kind, title, body);
        }
        if prefs.sound_enabled && !sound.is_empty() {
            self.collaborators.sound.play(sound);
        }
    }

    /// Write the current snapshot. Mirrors never write.
    fn persist(&mut self, now: DateTime<Utc>) {
        if self.role == Role::Mirror {
            return;
        }
        self.submit(PendingWrite::Snapshot {
            snapshot: self.snapshot.clone(),
            at: now,
        });
    }

    fn submit(&mut self, write: PendingWrite) {
        if let Some(result) = self.writer.submit(write) {
            self.settle(result);
        }
    }

    fn collect_writes(&mut self) {
        for result in self.writer.collect() {
            self.settle(result);
        }
    }

    fn settle(&mut self, written: WriteResult) {
        match written.result {
            Ok(()) if written.kind == WriteKind::Snapshot => {
                if !self.synced {
                    tracing::info!("timer state persisted again after store outage");
                }
                self.synced = true;
            }
            Ok(()) => {}
            Err(e) => self.note_store_failure(&e),
        }
    }

    /// A running owner writes every tick; a mirror that hears nothing for
    /// long enough assumes the owner is gone.
    fn owner_went_quiet(&self, now: DateTime<Utc>) -> bool {
        self.owner_seen_at
            .map_or(true, |seen| now - seen >= self.config.behavior.owner_silence())
    }

    fn note_store_failure(&mut self, error: &StoreError) {
        tracing::warn!(error = %error, "timer state is not guaranteed durable");
        if self.synced {
            self.synced = false;
            self.collaborators.notify(
                NotificationKind::Warning,
                "Timer not syncing",
                "Your session keeps running but is not being saved right now.",
            );
        }
    }

    fn reject(&self, action: &'static str) -> TimerError {
        tracing::warn!(action, phase = %self.phase, "rejected invalid transition");
        TimerError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}

impl std::fmt::Debug for FocusTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusTimer")
            .field("phase", &self.phase)
            .field("role", &self.role)
            .field("snapshot", &self.snapshot)
            .field("synced", &self.synced)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::StatsSink;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStats {
        completed: Mutex<Vec<u32>>,
        credited: Mutex<Vec<(u32, bool)>>,
    }

    impl StatsSink for RecordingStats {
        fn on_session_completed(&self, duration_minutes: u32) {
            self.completed.lock().unwrap().push(duration_minutes);
        }
        fn on_session_credited(&self, duration_minutes: u32, counts_as_unit: bool) {
            self.credited
                .lock()
                .unwrap()
                .push((duration_minutes, counts_as_unit));
        }
    }

    struct Fixture {
        clock: ManualClock,
        store: MemoryStore,
        stats: Arc<RecordingStats>,
        timer: FocusTimer,
    }

    fn fixture_with(config: TimerConfig) -> Fixture {
        let clock = ManualClock::new(
            DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let store = MemoryStore::new();
        let stats = Arc::new(RecordingStats::default());
        let collaborators = Collaborators {
            stats: stats.clone(),
            ..Collaborators::default()
        };
        let timer = FocusTimer::new(
            Arc::new(clock.clone()),
            TimerStateStore::with_origin(Arc::new(store.clone()), "main"),
            config,
            collaborators,
        );
        Fixture {
            clock,
            store,
            stats,
            timer,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(TimerConfig::default())
    }

    #[test]
    fn start_pause_resume() {
        let mut f = fixture();
        assert_eq!(f.timer.phase(), TimerPhase::Idle);

        f.timer.start(StartOptions::countdown(25)).unwrap();
        assert_eq!(f.timer.phase(), TimerPhase::Running);
        assert!(f.timer.snapshot().is_consistent());

        f.timer.pause().unwrap();
        assert_eq!(f.timer.phase(), TimerPhase::Paused);
        assert!(f.timer.snapshot().is_consistent());
        assert!(!f.timer.wants_ticks());

        f.timer.resume().unwrap();
        assert_eq!(f.timer.phase(), TimerPhase::Running);
        assert!(f.timer.snapshot().is_consistent());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut f = fixture();
        assert_eq!(
            f.timer.pause(),
            Err(TimerError::InvalidTransition {
                action: "pause",
                phase: TimerPhase::Idle
            })
        );
        assert!(f.timer.resume().is_err());
        assert!(f.timer.stop(StopDisposition::discard()).is_err());
        f.timer.start(StartOptions::countdown(25)).unwrap();
        assert!(f.timer.start(StartOptions::countdown(25)).is_err());
        assert!(f.timer.resume().is_err());
    }

    #[test]
    fn tick_recomputes_from_end_timestamp() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        // A single late tick sees the full ten minutes, not one tick's worth.
        f.clock.advance(Duration::minutes(10));
        assert!(f.timer.tick().is_none());
        assert_eq!(f.timer.remaining_seconds(), Some(15 * 60));
        assert_eq!(f.timer.session().unwrap().actual_duration_minutes, 10);
    }

    #[test]
    fn tick_is_idempotent_for_the_same_instant() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::seconds(90));
        f.timer.tick();
        let first = (f.timer.snapshot().clone(), f.timer.session().cloned());
        f.timer.tick();
        assert_eq!(first, (f.timer.snapshot().clone(), f.timer.session().cloned()));
    }

    #[test]
    fn pause_then_immediate_resume_keeps_remaining() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::milliseconds(61_400));
        let before = f.timer.remaining_seconds();
        f.timer.pause().unwrap();
        f.timer.resume().unwrap();
        assert_eq!(f.timer.remaining_seconds(), before);
    }

    #[test]
    fn countdown_completes_once_and_offers_short_break() {
        let mut f = fixture_with(TimerConfig {
            behavior: crate::storage::BehaviorConfig {
                auto_start_breaks: false,
                ..Default::default()
            },
            ..Default::default()
        });
        f.timer.start(StartOptions::countdown(1)).unwrap();
        let mut completions = 0;
        for _ in 0..120 {
            f.clock.advance(Duration::seconds(1));
            if let Some(Event::SessionCompleted { duration_minutes, .. }) = f.timer.tick() {
                completions += 1;
                assert_eq!(duration_minutes, 1);
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(f.stats.completed.lock().unwrap().as_slice(), &[1]);
        assert_eq!(f.timer.phase(), TimerPhase::Completed);
        assert_eq!(f.timer.break_offer().map(|o| o.minutes), Some(5));

        let record = f.timer.history().list().unwrap().pop().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.actual_duration_minutes, 1);

        f.timer.start_break().unwrap();
        assert!(f.timer.is_break());
        assert_eq!(f.timer.remaining_seconds(), Some(300));
    }

    #[test]
    fn auto_break_then_idle_without_auto_continue() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(1)).unwrap();
        f.clock.advance(Duration::seconds(60));
        assert!(matches!(f.timer.tick(), Some(Event::SessionCompleted { .. })));
        assert_eq!(f.timer.phase(), TimerPhase::Running);
        assert!(f.timer.is_break());

        f.clock.advance(Duration::minutes(5));
        assert!(matches!(
            f.timer.tick(),
            Some(Event::BreakCompleted {
                auto_continue: false,
                ..
            })
        ));
        assert_eq!(f.timer.phase(), TimerPhase::Idle);
        assert!(!f.timer.snapshot().is_active);
    }

    #[test]
    fn break_auto_continues_with_last_duration() {
        let mut f = fixture_with(TimerConfig {
            behavior: crate::storage::BehaviorConfig {
                auto_continue: true,
                ..Default::default()
            },
            ..Default::default()
        });
        f.timer.start(StartOptions::countdown(2)).unwrap();
        f.clock.advance(Duration::minutes(2));
        f.timer.tick();
        f.clock.advance(Duration::minutes(5));
        f.timer.tick();
        assert_eq!(f.timer.phase(), TimerPhase::Running);
        assert!(!f.timer.is_break());
        assert_eq!(f.timer.snapshot().selected_minutes, 2);
    }

    #[test]
    fn fourth_unit_earns_long_break() {
        let mut f = fixture_with(TimerConfig {
            behavior: crate::storage::BehaviorConfig {
                auto_start_breaks: false,
                ..Default::default()
            },
            ..Default::default()
        });
        let mut offers = Vec::new();
        for _ in 0..4 {
            f.timer.start(StartOptions::countdown(1)).unwrap();
            f.clock.advance(Duration::minutes(1));
            f.timer.tick();
            offers.push(f.timer.break_offer().unwrap().minutes);
            f.timer.stop(StopDisposition::discard()).unwrap();
        }
        assert_eq!(offers, vec![5, 5, 5, 15]);
    }

    #[test]
    fn skip_break_starts_focus_with_last_duration() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(3)).unwrap();
        f.clock.advance(Duration::minutes(3));
        f.timer.tick();
        assert!(f.timer.is_break());

        let events = f.timer.skip_break().unwrap();
        assert!(matches!(events[0], Event::BreakSkipped { .. }));
        assert!(!f.timer.is_break());
        assert_eq!(f.timer.snapshot().selected_minutes, 3);
        assert_eq!(f.timer.remaining_seconds(), Some(180));
        // Only the first focus session reached the stats sink.
        assert_eq!(f.stats.completed.lock().unwrap().len(), 1);
    }

    #[test]
    fn skip_break_outside_a_break_is_rejected() {
        let mut f = fixture();
        assert!(f.timer.skip_break().is_err());
        f.timer.start(StartOptions::countdown(25)).unwrap();
        assert!(f.timer.skip_break().is_err());
    }

    #[test]
    fn early_countdown_stop_honors_disposition() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::seconds(7 * 60 + 59));
        let event = f.timer.stop(StopDisposition::credit_only()).unwrap();
        assert!(matches!(
            event,
            Event::TimerStopped {
                status: Some(SessionStatus::Interrupted),
                actual_minutes: 7,
                credited: true,
                ..
            }
        ));
        assert_eq!(f.stats.credited.lock().unwrap().as_slice(), &[(7, false)]);
        assert_eq!(f.timer.cycle().completed_units, 0);
        assert_eq!(f.timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn open_ended_stop_is_always_credited_and_counted() {
        let mut f = fixture();
        f.timer.start(StartOptions::open_ended()).unwrap();
        f.clock.advance(Duration::minutes(10));
        f.timer.tick();
        f.timer.stop(StopDisposition::discard()).unwrap();
        assert_eq!(f.stats.credited.lock().unwrap().as_slice(), &[(10, true)]);
        let record = f.timer.history().list().unwrap().pop().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.actual_duration_minutes, 10);
        assert_eq!(f.timer.cycle().completed_units, 1);
    }

    #[test]
    fn open_ended_pause_freezes_elapsed() {
        let mut f = fixture();
        f.timer.start(StartOptions::open_ended()).unwrap();
        f.clock.advance(Duration::minutes(4));
        f.timer.pause().unwrap();
        assert_eq!(f.timer.snapshot().paused_elapsed_seconds, Some(240));
        f.clock.advance(Duration::hours(2));
        assert_eq!(f.timer.elapsed_seconds(), Some(240));
        f.timer.resume().unwrap();
        f.clock.advance(Duration::minutes(1));
        assert_eq!(f.timer.elapsed_seconds(), Some(300));
    }

    #[test]
    fn start_with_paused_session_is_ambiguous() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.timer.pause().unwrap();
        assert_eq!(
            f.timer.start(StartOptions::countdown(25)),
            Err(TimerError::AmbiguousResume)
        );
    }

    #[test]
    fn start_fresh_crediting_books_paused_time() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::minutes(6));
        f.timer.pause().unwrap();
        f.clock.advance(Duration::minutes(30));

        let events = f
            .timer
            .start_resolving(StartOptions::countdown(50), PausedSessionChoice::StartFreshCrediting)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(f.stats.credited.lock().unwrap().as_slice(), &[(6, false)]);
        assert_eq!(f.timer.snapshot().selected_minutes, 50);

        let history = f.timer.history().list().unwrap();
        assert_eq!(history[0].status, SessionStatus::Interrupted);
        assert_eq!(history[0].actual_duration_minutes, 6);
        assert_eq!(history[1].status, SessionStatus::Active);
    }

    #[test]
    fn start_fresh_discarding_credits_nothing() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::minutes(6));
        f.timer.pause().unwrap();
        f.timer
            .start_resolving(StartOptions::open_ended(), PausedSessionChoice::StartFreshDiscarding)
            .unwrap();
        assert!(f.stats.credited.lock().unwrap().is_empty());
        assert!(f.timer.snapshot().is_open_ended);
    }

    #[test]
    fn resolving_by_resume_keeps_paused_session() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::minutes(5));
        f.timer.pause().unwrap();
        let id = f.timer.session().unwrap().id.clone();
        f.timer
            .start_resolving(StartOptions::countdown(50), PausedSessionChoice::ResumePaused)
            .unwrap();
        assert_eq!(f.timer.session().unwrap().id, id);
        assert_eq!(f.timer.remaining_seconds(), Some(20 * 60));
    }

    #[test]
    fn resolving_by_resume_ignores_new_options() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.clock.advance(Duration::minutes(5));
        f.timer.pause().unwrap();

        let bad = StartOptions::countdown(0);
        assert!(matches!(
            f.timer
                .start_resolving(bad.clone(), PausedSessionChoice::StartFreshDiscarding),
            Err(TimerError::InvalidOptions(_))
        ));
        assert_eq!(f.timer.phase(), TimerPhase::Paused);
        f.timer
            .start_resolving(bad, PausedSessionChoice::ResumePaused)
            .unwrap();
        assert_eq!(f.timer.phase(), TimerPhase::Running);
        assert_eq!(f.timer.remaining_seconds(), Some(20 * 60));
    }

    #[test]
    fn store_outage_degrades_then_recovers() {
        let mut f = fixture();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.store.set_offline(true);
        f.clock.advance(Duration::seconds(1));
        f.timer.tick();
        assert!(!f.timer.is_synced());
        // Still counts down in memory.
        f.timer.pause().unwrap();
        assert_eq!(f.timer.phase(), TimerPhase::Paused);
        assert!(f.timer.wants_ticks());

        f.store.set_offline(false);
        f.timer.tick();
        assert!(f.timer.is_synced());
        let saved = f.timer.store().read().unwrap().unwrap();
        assert!(saved.is_paused);
    }

    #[test]
    fn own_echo_is_ignored() {
        let mut f = fixture();
        let mut sub = f.timer.store().subscribe();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        let echo = sub.try_next().unwrap();
        assert!(f.timer.apply_remote(echo).is_none());
        assert_eq!(f.timer.role(), Role::Owner);
    }

    #[test]
    fn blocking_follows_focus_runs() {
        #[derive(Default)]
        struct Blocker(Mutex<Vec<Option<u32>>>);
        impl crate::collaborators::DistractionBlocker for Blocker {
            fn enable(&self, duration_minutes: u32) {
                self.0.lock().unwrap().push(Some(duration_minutes));
            }
            fn disable(&self) {
                self.0.lock().unwrap().push(None);
            }
        }

        let blocker = Arc::new(Blocker::default());
        let clock = ManualClock::new(Utc::now());
        let mut config = TimerConfig::default();
        config.blocking.enabled = true;
        let mut timer = FocusTimer::new(
            Arc::new(clock.clone()),
            TimerStateStore::new(Arc::new(MemoryStore::new())),
            config,
            Collaborators {
                blocker: blocker.clone(),
                ..Collaborators::default()
            },
        );
        timer.start(StartOptions::countdown(25)).unwrap();
        clock.advance(Duration::seconds(30));
        timer.pause().unwrap();
        timer.resume().unwrap();
        timer.stop(StopDisposition::discard()).unwrap();
        assert_eq!(
            blocker.0.lock().unwrap().as_slice(),
            &[Some(25), None, Some(25), None]
        );
    }

    #[test]
    fn unused_store_keys_stay_untouched() {
        let mut f = fixture();
        f.store.set("unrelated", "x").unwrap();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.timer.stop(StopDisposition::discard()).unwrap();
        assert_eq!(f.store.get("unrelated").unwrap().as_deref(), Some("x"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tick_does_not_wait_on_a_locked_store() {
        use crate::storage::SqliteStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focuskit.db");
        let clock = ManualClock::new(Utc::now());
        let mut timer = FocusTimer::new(
            Arc::new(clock.clone()),
            TimerStateStore::with_origin(Arc::new(SqliteStore::open_at(&path).unwrap()), "main"),
            TimerConfig::default(),
            Collaborators::default(),
        );
        timer.write_behind();
        timer.start(StartOptions::countdown(25)).unwrap();
        timer.flush_writes().unwrap().await.unwrap();
        assert!(timer.is_synced());

        // Another process holds the database.
        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        clock.advance(Duration::seconds(1));
        let started = std::time::Instant::now();
        assert!(timer.tick().is_none());
        assert_eq!(timer.display_state().seconds, 25 * 60 - 1);
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
        assert!(timer.wants_ticks());

        // The queued write gives up after the busy timeout; the next tick
        // notices and retries.
        timer.flush_writes().unwrap().await.unwrap();
        other.execute_batch("ROLLBACK;").unwrap();
        clock.advance(Duration::seconds(1));
        timer.tick();
        assert!(!timer.is_synced());

        timer.flush_writes().unwrap().await.unwrap();
        timer.tick();
        assert!(timer.is_synced());
    }

    #[tokio::test]
    async fn paused_timer_keeps_ticking_until_writes_settle() {
        let mut f = fixture();
        f.timer.write_behind();
        f.timer.start(StartOptions::countdown(25)).unwrap();
        f.timer.pause().unwrap();
        assert!(f.timer.wants_ticks());

        f.timer.flush_writes().unwrap().await.unwrap();
        f.timer.tick();
        assert!(!f.timer.wants_ticks());
        let saved = f.timer.store().read().unwrap().unwrap();
        assert!(saved.is_paused);
    }
}

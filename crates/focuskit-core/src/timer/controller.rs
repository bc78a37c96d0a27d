//! Async driver for a [`FocusTimer`].
//!
//! Owns the timer behind a tokio mutex, runs the periodic tick while the timer
//! wants one, and follows snapshot writes from other surfaces. Every event is
//! re-published on a broadcast channel for the UI. Store writes go through the
//! timer's background writer, so the mutex is never held across store I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use super::engine::FocusTimer;
use super::options::{DisplayState, PausedSessionChoice, StartOptions, StopDisposition};
use crate::error::TimerError;
use crate::events::Event;
use crate::sync::SurfaceSync;

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct Shared {
    timer: Mutex<FocusTimer>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<Event>,
    tick_interval: Duration,
}

pub struct TimerController {
    shared: Arc<Shared>,
    follower: Option<JoinHandle<()>>,
}

impl TimerController {
    /// Wrap `timer` and start following other surfaces.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(mut timer: FocusTimer) -> Self {
        timer.write_behind();
        let tick_interval = Duration::from_millis(timer.config().behavior.tick_interval_ms.max(1));
        let sync = SurfaceSync::attach(timer.store());
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            timer: Mutex::new(timer),
            ticker: Mutex::new(None),
            events,
            tick_interval,
        });
        let follower = Some(spawn_follower(shared.clone(), sync));
        Self { shared, follower }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    pub async fn display_state(&self) -> DisplayState {
        self.shared.timer.lock().await.display_state()
    }

    /// Run `f` against the timer for queries not covered here.
    pub async fn with_timer<R>(&self, f: impl FnOnce(&FocusTimer) -> R) -> R {
        f(&*self.shared.timer.lock().await)
    }

    /// Resume ticking for a timer that was rehydrated before being wrapped.
    pub async fn refresh(&self) {
        refresh_ticker(&self.shared).await;
    }

    pub async fn start(&self, options: StartOptions) -> Result<Event, TimerError> {
        self.run(|timer| timer.start(options).map(|e| vec![e]))
            .await
            .map(first)
    }

    pub async fn start_resolving(
        &self,
        options: StartOptions,
        choice: PausedSessionChoice,
    ) -> Result<Vec<Event>, TimerError> {
        self.run(|timer| timer.start_resolving(options, choice)).await
    }

    pub async fn pause(&self) -> Result<Event, TimerError> {
        self.run(|timer| timer.pause().map(|e| vec![e])).await.map(first)
    }

    pub async fn resume(&self) -> Result<Event, TimerError> {
        self.run(|timer| timer.resume().map(|e| vec![e])).await.map(first)
    }

    pub async fn stop(&self, disposition: StopDisposition) -> Result<Event, TimerError> {
        self.run(|timer| timer.stop(disposition).map(|e| vec![e]))
            .await
            .map(first)
    }

    pub async fn start_break(&self) -> Result<Event, TimerError> {
        self.run(|timer| timer.start_break().map(|e| vec![e]))
            .await
            .map(first)
    }

    pub async fn skip_break(&self) -> Result<Vec<Event>, TimerError> {
        self.run(FocusTimer::skip_break).await
    }

    /// Wait until every store write made so far has landed.
    pub async fn flush(&self) {
        let pending = self.shared.timer.lock().await.flush_writes();
        if let Some(done) = pending {
            if done.await.is_err() {
                tracing::warn!("store writer stopped before flushing");
            }
        }
        self.shared.timer.lock().await.settle_writes();
    }

    /// Stop ticking and following once pending writes have landed. The
    /// timer's persisted state is untouched.
    pub async fn shutdown(mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
        cancel_ticker(&self.shared).await;
        self.flush().await;
    }

    async fn run(
        &self,
        command: impl FnOnce(&mut FocusTimer) -> Result<Vec<Event>, TimerError>,
    ) -> Result<Vec<Event>, TimerError> {
        let events = {
            let mut timer = self.shared.timer.lock().await;
            command(&mut timer)?
        };
        for event in &events {
            publish(&self.shared, event.clone());
        }
        refresh_ticker(&self.shared).await;
        Ok(events)
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
        if let Ok(mut ticker) = self.shared.ticker.try_lock() {
            if let Some(handle) = ticker.take() {
                handle.abort();
            }
        }
    }
}

fn first(mut events: Vec<Event>) -> Event {
    events.swap_remove(0)
}

fn publish(shared: &Shared, event: Event) {
    // No subscribers is fine.
    let _ = shared.events.send(event);
}

/// Start or stop the tick task to match what the timer wants.
async fn refresh_ticker(shared: &Arc<Shared>) {
    let wants_ticks = shared.timer.lock().await.wants_ticks();
    let mut ticker = shared.ticker.lock().await;
    let running = ticker.as_ref().is_some_and(|handle| !handle.is_finished());
    match (wants_ticks, running) {
        (true, false) => *ticker = Some(spawn_ticker(shared.clone())),
        (false, true) => {
            if let Some(handle) = ticker.take() {
                handle.abort();
            }
        }
        _ => {}
    }
}

async fn cancel_ticker(shared: &Shared) {
    if let Some(handle) = shared.ticker.lock().await.take() {
        handle.abort();
    }
}

fn spawn_ticker(shared: Arc<Shared>) -> JoinHandle<()> {
    tracing::debug!(interval_ms = shared.tick_interval.as_millis() as u64, "tick task started");
    tokio::spawn(async move {
        let mut interval = time::interval(shared.tick_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let (event, wants_ticks) = {
                let mut timer = shared.timer.lock().await;
                let event = timer.tick();
                (event, timer.wants_ticks())
            };
            if let Some(event) = event {
                publish(&shared, event);
            }
            if !wants_ticks {
                tracing::debug!("tick task finished");
                break;
            }
        }
    })
}

fn spawn_follower(shared: Arc<Shared>, mut sync: SurfaceSync) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut poll = time::interval(shared.tick_interval);
        poll.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                envelope = sync.next_remote() => {
                    let Some(envelope) = envelope else { break };
                    let event = shared.timer.lock().await.apply_remote(envelope);
                    if let Some(event) = event {
                        publish(&shared, event);
                        refresh_ticker(&shared).await;
                    }
                }
                _ = poll.tick() => sync.poll_external(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::Collaborators;
    use crate::storage::{KeyValueStore, MemoryStore, TimerConfig, TimerStateStore};
    use crate::timer::{DisplayMode, TimerPhase};
    use chrono::Utc;

    fn controller(store: Arc<dyn KeyValueStore>, clock: &ManualClock, origin: &str) -> TimerController {
        TimerController::new(FocusTimer::new(
            Arc::new(clock.clone()),
            TimerStateStore::with_origin(store, origin),
            TimerConfig::default(),
            Collaborators::default(),
        ))
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_completes_countdown_once() {
        let clock = ManualClock::new(Utc::now());
        let controller = controller(Arc::new(MemoryStore::new()), &clock, "main");
        let mut rx = controller.subscribe();

        controller.start(StartOptions::countdown(1)).await.unwrap();
        for _ in 0..90 {
            clock.advance(chrono::Duration::seconds(1));
            time::sleep(Duration::from_secs(1)).await;
        }

        let completions = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, Event::SessionCompleted { .. }))
            .count();
        assert_eq!(completions, 1);
        // The break started automatically and is still counting down.
        assert!(controller.with_timer(|t| t.is_break()).await);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_while_paused() {
        let clock = ManualClock::new(Utc::now());
        let controller = controller(Arc::new(MemoryStore::new()), &clock, "main");
        controller.start(StartOptions::countdown(25)).await.unwrap();
        controller.pause().await.unwrap();
        time::sleep(Duration::from_secs(3)).await;
        // The tick task lingers only until the pause write has settled.
        let ticker = controller.shared.ticker.lock().await;
        assert!(ticker.as_ref().map_or(true, JoinHandle::is_finished));
        drop(ticker);

        controller.resume().await.unwrap();
        assert!(controller.shared.ticker.lock().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn second_controller_mirrors_the_first() {
        let shared: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let main = controller(shared.clone(), &clock, "main");
        let popup = controller(shared, &clock, "popup");

        main.start(StartOptions::open_ended()).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        let display = popup.display_state().await;
        assert_eq!(display.mode, DisplayMode::OpenEnded);
        assert!(display.is_mirror);

        main.stop(StopDisposition::credit_and_count()).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(popup.with_timer(|t| t.phase()).await, TimerPhase::Idle);
    }

    #[tokio::test]
    async fn rejected_commands_publish_nothing() {
        let clock = ManualClock::new(Utc::now());
        let controller = controller(Arc::new(MemoryStore::new()), &clock, "main");
        let mut rx = controller.subscribe();
        assert!(controller.pause().await.is_err());
        assert!(drain(&mut rx).is_empty());
    }
}

//! Write-behind persistence for the timer.
//!
//! A [`StoreWriter`] starts out writing inline. Once moved to the background
//! it queues writes to a task that runs them on tokio's blocking pool, so a
//! slow or locked store never holds up a tick. Queued writes to the same key
//! collapse to the latest one, and results come back on a channel for the
//! timer to collect.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use super::{CycleState, SessionHistory, TimerStateStore};
use crate::error::StoreError;
use crate::session::SessionRecord;
use crate::timer::TimerSnapshot;

pub(crate) enum PendingWrite {
    Snapshot {
        snapshot: TimerSnapshot,
        at: DateTime<Utc>,
    },
    Session(SessionRecord),
    Cycle(CycleState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Snapshot,
    Session,
    Cycle,
}

#[derive(Debug)]
pub(crate) struct WriteResult {
    pub kind: WriteKind,
    pub result: Result<(), StoreError>,
}

impl PendingWrite {
    fn kind(&self) -> WriteKind {
        match self {
            PendingWrite::Snapshot { .. } => WriteKind::Snapshot,
            PendingWrite::Session(_) => WriteKind::Session,
            PendingWrite::Cycle(_) => WriteKind::Cycle,
        }
    }

    /// Whether writing `self` makes `earlier` pointless.
    fn supersedes(&self, earlier: &PendingWrite) -> bool {
        match (self, earlier) {
            (PendingWrite::Session(a), PendingWrite::Session(b)) => a.id == b.id,
            _ => self.kind() != WriteKind::Session && self.kind() == earlier.kind(),
        }
    }

    fn apply(self, state: &TimerStateStore, history: &SessionHistory) -> WriteResult {
        let kind = self.kind();
        let result = match self {
            PendingWrite::Snapshot { snapshot, at } => state.write(&snapshot, at),
            PendingWrite::Session(record) => history.upsert(&record),
            PendingWrite::Cycle(cycle) => state.write_cycle(&cycle),
        };
        WriteResult { kind, result }
    }
}

enum Job {
    Write(PendingWrite),
    Flush(oneshot::Sender<()>),
}

/// Results of one batch, accounting for `submitted` queued writes.
struct Settled {
    submitted: usize,
    results: Vec<WriteResult>,
}

struct Background {
    jobs: mpsc::UnboundedSender<Job>,
    settled: mpsc::UnboundedReceiver<Settled>,
    in_flight: usize,
}

pub(crate) struct StoreWriter {
    state: TimerStateStore,
    history: SessionHistory,
    background: Option<Background>,
}

impl StoreWriter {
    pub fn new(state: TimerStateStore, history: SessionHistory) -> Self {
        Self {
            state,
            history,
            background: None,
        }
    }

    /// Move writes onto a background task. Must be called inside a tokio
    /// runtime; calling it again is a no-op.
    pub fn spawn_background(&mut self) {
        if self.background.is_some() {
            return;
        }
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(
            self.state.clone(),
            self.history.clone(),
            job_rx,
            settled_tx,
        ));
        tracing::debug!(origin = self.state.origin(), "store writer moved to background");
        self.background = Some(Background {
            jobs,
            settled,
            in_flight: 0,
        });
    }

    /// Write now and return the result, or queue the write and return `None`.
    pub fn submit(&mut self, write: PendingWrite) -> Option<WriteResult> {
        let Some(background) = self.background.as_mut() else {
            return Some(write.apply(&self.state, &self.history));
        };
        let kind = write.kind();
        match background.jobs.send(Job::Write(write)) {
            Ok(()) => {
                background.in_flight += 1;
                None
            }
            Err(_) => Some(WriteResult {
                kind,
                result: Err(StoreError::Unavailable("store writer has stopped".into())),
            }),
        }
    }

    /// Results of background writes that finished since the last call.
    pub fn collect(&mut self) -> Vec<WriteResult> {
        let Some(background) = self.background.as_mut() else {
            return Vec::new();
        };
        let mut results = Vec::new();
        while let Ok(settled) = background.settled.try_recv() {
            background.in_flight = background.in_flight.saturating_sub(settled.submitted);
            results.extend(settled.results);
        }
        results
    }

    /// Queued writes whose results have not been collected yet.
    pub fn in_flight(&self) -> bool {
        self.background.as_ref().is_some_and(|b| b.in_flight > 0)
    }

    /// Resolves once every write queued before this call has run. `None`
    /// when writing inline.
    pub fn flush(&self) -> Option<oneshot::Receiver<()>> {
        let background = self.background.as_ref()?;
        let (done, rx) = oneshot::channel();
        background.jobs.send(Job::Flush(done)).ok()?;
        Some(rx)
    }
}

async fn run_writer(
    state: TimerStateStore,
    history: SessionHistory,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    settled: mpsc::UnboundedSender<Settled>,
) {
    while let Some(job) = jobs.recv().await {
        let mut batch = vec![job];
        while let Ok(job) = jobs.try_recv() {
            batch.push(job);
        }

        let mut writes = Vec::new();
        let mut flushes = Vec::new();
        for job in batch {
            match job {
                Job::Write(write) => writes.push(write),
                Job::Flush(done) => flushes.push(done),
            }
        }

        let submitted = writes.len();
        if submitted > 0 {
            let writes = coalesce(writes);
            let (state, history) = (state.clone(), history.clone());
            let results = tokio::task::spawn_blocking(move || {
                writes
                    .into_iter()
                    .map(|write| write.apply(&state, &history))
                    .collect::<Vec<_>>()
            })
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "store write worker failed");
                vec![WriteResult {
                    kind: WriteKind::Snapshot,
                    result: Err(StoreError::Unavailable(e.to_string())),
                }]
            });
            // The timer may already be gone.
            let _ = settled.send(Settled { submitted, results });
        }
        for done in flushes {
            let _ = done.send(());
        }
    }
    tracing::debug!("store writer stopped");
}

/// Keep only the last write per key, in the order those writes were queued.
fn coalesce(writes: Vec<PendingWrite>) -> Vec<PendingWrite> {
    let mut kept: Vec<PendingWrite> = Vec::with_capacity(writes.len());
    for write in writes {
        kept.retain(|earlier| !write.supersedes(earlier));
        kept.push(write);
    }
    kept
}

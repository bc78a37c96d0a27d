use std::time::Duration;

use clap::{ArgGroup, Subcommand};
use focuskit_core::{
    BoredomLevel, DisplayState, Event, FocusTimer, PausedSessionChoice, RestoreOutcome, Role,
    SessionRecord, StartOptions, StopDisposition, TimerController, TimerError, TimerPhase,
    TimerSnapshot,
};
use serde::Serialize;

use crate::surface::{self, Surface};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a focus session
    #[command(group(ArgGroup::new("paused_choice").args(["resume_paused", "credit_paused", "discard_paused"])))]
    Start {
        /// Countdown length in minutes (defaults to durations.focus_minutes)
        #[arg(long, conflicts_with = "open_ended")]
        minutes: Option<u32>,
        /// Count up until stopped instead of counting down
        #[arg(long)]
        open_ended: bool,
        /// Title of the task this session is for
        #[arg(long)]
        task: Option<String>,
        /// Id of the task this session is for
        #[arg(long, requires = "task")]
        task_id: Option<String>,
        /// How bored you are with the task, 1 (engaged) to 5
        #[arg(long)]
        boredom: Option<u8>,
        /// If a session is paused, resume it instead of starting
        #[arg(long)]
        resume_paused: bool,
        /// If a session is paused, book its time as interrupted and start fresh
        #[arg(long)]
        credit_paused: bool,
        /// If a session is paused, drop its time and start fresh
        #[arg(long)]
        discard_paused: bool,
    },
    /// Pause the running session or break
    Pause,
    /// Resume the paused session or break
    Resume,
    /// Stop the current session or break
    Stop {
        /// Add the minutes worked to today's totals
        #[arg(long)]
        credit: bool,
        /// Count the session as a completed focus unit
        #[arg(long)]
        count: bool,
    },
    /// End the break and start the next focus session
    SkipBreak,
    /// Take the break offered after a completed session
    StartBreak,
    /// Print current timer state as JSON without acting on it
    Status,
    /// Show what startup restore found, without acting on a prompt
    Restore,
    /// Drop a saved or paused session without crediting it
    Discard,
    /// Print the clock every second until the session ends
    Watch {
        /// Drive a countdown that was left running by a surface that is gone
        #[arg(long)]
        take_over: bool,
    },
}

#[derive(Serialize)]
struct StatusReport<'a> {
    phase: TimerPhase,
    role: Role,
    clock: String,
    display: DisplayState,
    snapshot: &'a TimerSnapshot,
    session: Option<&'a SessionRecord>,
    restored: serde_json::Value,
}

impl<'a> StatusReport<'a> {
    fn of(timer: &'a FocusTimer, restored: &RestoreOutcome) -> Self {
        let display = timer.display_state();
        Self {
            phase: timer.phase(),
            role: timer.role(),
            clock: display.clock_face(),
            display,
            snapshot: timer.snapshot(),
            session: timer.session(),
            restored: describe(restored),
        }
    }
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TimerAction::Restore => {
            let surface = surface::open()?;
            println!("{}", serde_json::to_string_pretty(&describe(&surface.restored))?);
            return Ok(());
        }
        TimerAction::Status => {
            let surface = surface::open()?;
            let report = StatusReport::of(&surface.timer, &surface.restored);
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        TimerAction::Discard => return discard(surface::open()?),
        TimerAction::Watch { take_over: false } => return watch(surface::open()?),
        TimerAction::Watch { take_over: true } => return watch(surface::open_resuming()?),
        _ => {}
    }

    let Surface {
        mut timer,
        restored,
    } = surface::open_resuming()?;
    let events = match action {
        TimerAction::Start {
            minutes,
            open_ended,
            task,
            task_id,
            boredom,
            resume_paused,
            credit_paused,
            discard_paused,
        } => {
            let mut options = if open_ended {
                StartOptions::open_ended()
            } else {
                StartOptions::countdown(minutes.unwrap_or(timer.config().durations.focus_minutes))
            };
            if let Some(title) = task {
                options = options.linked_task(title, task_id);
            }
            if let Some(level) = boredom {
                options = options.boredom(BoredomLevel::try_from(level)?);
            }
            let choice = if resume_paused {
                Some(PausedSessionChoice::ResumePaused)
            } else if credit_paused {
                Some(PausedSessionChoice::StartFreshCrediting)
            } else if discard_paused {
                Some(PausedSessionChoice::StartFreshDiscarding)
            } else {
                None
            };
            match choice {
                Some(choice) => timer.start_resolving(options, choice)?,
                None => vec![timer.start(options).map_err(explain_paused)?],
            }
        }
        TimerAction::Pause => vec![timer.pause()?],
        TimerAction::Resume => vec![timer.resume()?],
        TimerAction::Stop { credit, count } => vec![timer.stop(StopDisposition {
            credit_time: credit,
            count_as_unit: count,
        })?],
        TimerAction::SkipBreak => timer.skip_break()?,
        TimerAction::StartBreak => vec![timer.start_break()?],
        TimerAction::Status
        | TimerAction::Restore
        | TimerAction::Discard
        | TimerAction::Watch { .. } => Vec::new(),
    };

    for event in &events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    if events.is_empty() {
        let report = StatusReport::of(&timer, &restored);
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn explain_paused(error: TimerError) -> Box<dyn std::error::Error> {
    match error {
        TimerError::AmbiguousResume => format!(
            "{error}; pass --resume-paused, --credit-paused or --discard-paused"
        )
        .into(),
        other => other.into(),
    }
}

fn describe(outcome: &RestoreOutcome) -> serde_json::Value {
    match outcome {
        RestoreOutcome::NothingSaved => serde_json::json!({ "outcome": "nothing_saved" }),
        RestoreOutcome::ClearedInactive => serde_json::json!({ "outcome": "cleared_inactive" }),
        RestoreOutcome::Stale { age_hours } => {
            serde_json::json!({ "outcome": "stale", "ageHours": age_hours })
        }
        RestoreOutcome::PausedRehydrated => serde_json::json!({ "outcome": "paused" }),
        RestoreOutcome::ExpiredWhileClosed => {
            serde_json::json!({ "outcome": "expired_while_closed" })
        }
        RestoreOutcome::ResumePrompt(pending) => serde_json::json!({
            "outcome": "resume_prompt",
            "remainingSecs": pending.remaining_secs,
            "isBreak": pending.is_break,
        }),
        RestoreOutcome::ResumedOpenEnded { elapsed_secs } => {
            serde_json::json!({ "outcome": "resumed_open_ended", "elapsedSecs": elapsed_secs })
        }
        RestoreOutcome::FollowingOwner { origin } => {
            serde_json::json!({ "outcome": "following_owner", "origin": origin })
        }
        RestoreOutcome::Unreadable => serde_json::json!({ "outcome": "unreadable" }),
    }
}

fn discard(surface: Surface) -> Result<(), Box<dyn std::error::Error>> {
    let Surface {
        mut timer,
        restored,
        ..
    } = surface;
    if let RestoreOutcome::ResumePrompt(pending) = restored {
        pending.discard(&mut timer);
        println!("{}", serde_json::json!({ "type": "saved_session_discarded" }));
        return Ok(());
    }
    if timer.phase() == TimerPhase::Idle {
        return Err("nothing to discard".into());
    }
    let event = timer.stop(StopDisposition::discard())?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

fn watch(surface: Surface) -> Result<(), Box<dyn std::error::Error>> {
    if let RestoreOutcome::ResumePrompt(pending) = &surface.restored {
        return Err(format!(
            "a saved {} has {} left and no surface is driving it; \
             pass --take-over to drive it here or run `focuskit timer discard`",
            if pending.is_break { "break" } else { "countdown" },
            minutes_and_seconds(pending.remaining_secs)
        )
        .into());
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let controller = TimerController::new(surface.timer);
        controller.refresh().await;
        let mut events = controller.subscribe();
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            while let Ok(event) = events.try_recv() {
                print_event_line(&event);
            }
            let display = controller.display_state().await;
            let phase = controller.with_timer(FocusTimer::phase).await;
            println!("{}", status_line(&display, phase));
            if phase == TimerPhase::Idle {
                break;
            }
        }
        controller.shutdown().await;
    });
    Ok(())
}

fn minutes_and_seconds(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn print_event_line(event: &Event) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "could not encode event"),
    }
}

fn status_line(display: &DisplayState, phase: TimerPhase) -> String {
    let mut line = format!("{} {}", display.clock_face(), phase);
    if display.is_break {
        line.push_str(" (break)");
    }
    if display.is_mirror {
        line.push_str(" (following another surface)");
    }
    if !display.is_synced {
        line.push_str(" (not saved)");
    }
    if let Some(offer) = display.break_offer {
        line.push_str(&format!(" - {} minute break available", offer.minutes));
    }
    line
}

use clap::Subcommand;
use zomodoro_core::{App, Event, TimerMode};

use super::{announce, format_clock, open, print_events, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Stop and re-arm the current mode
    Reset,
    /// Switch to a mode (focus, short-break, long-break) without starting it
    Mode {
        mode: TimerMode,
    },
    /// Print current timer state as JSON
    Status,
    /// Run the countdown in the foreground until interrupted
    Run {
        /// Stop after this many completed sessions
        #[arg(long)]
        sessions: Option<u32>,
        /// Ambient sounds to play while running (comma separated)
        #[arg(long, value_delimiter = ',')]
        sounds: Vec<String>,
    },
}

pub async fn run(action: TimerAction) -> CliResult {
    if let TimerAction::Run { sessions, sounds } = action {
        return run_foreground(sessions, sounds).await;
    }

    let mut session = open()?;
    let app = &mut session.app;

    // Catch up with whatever happened since the last invocation.
    app.timer().resync();
    let mut events = app.drain_events();

    match action {
        TimerAction::Start => app.timer().start(),
        TimerAction::Pause => app.timer().pause(),
        TimerAction::Reset => app.timer().reset(),
        TimerAction::Mode { mode } => app.timer().set_mode(mode),
        TimerAction::Status | TimerAction::Run { .. } => {}
    }
    events.extend(app.drain_events());
    events.push(app.timer().snapshot());

    print_events(&events)?;
    announce(&events);
    app.save()?;
    Ok(())
}

async fn run_foreground(sessions: Option<u32>, sounds: Vec<String>) -> CliResult {
    #[cfg(feature = "audio-output")]
    let (mut session, _output) = super::open_audible()?;
    #[cfg(not(feature = "audio-output"))]
    let mut session = {
        if !sounds.is_empty() {
            return Err(super::NO_AUDIO.into());
        }
        open()?
    };
    let app = &mut session.app;

    app.preload_sounds();
    for name in &sounds {
        app.sounds().play(name)?;
    }
    app.timer().resync();
    app.timer().start();

    let mut completed = 0;
    loop {
        let batch = tokio::select! {
            batch = app.next_events() => batch,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(batch) = batch else {
            app.timer().pause();
            break;
        };
        show(app, &batch)?;
        match after_batch(&batch, &mut completed, sessions) {
            Next::Finish => break,
            Next::StartNext => app.timer().start(),
            Next::Wait => {}
        }
    }

    let rest = app.drain_events();
    print_events(&rest)?;
    app.sounds().stop_all();
    app.save()?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Next {
    Wait,
    /// The next mode is armed but auto-start is off.
    StartNext,
    Finish,
}

/// Count completions in `batch` and decide how the foreground run goes on.
/// With a session limit the runner starts each armed mode itself.
fn after_batch(batch: &[Event], completed: &mut u32, sessions: Option<u32>) -> Next {
    let mut next = Next::Wait;
    for event in batch {
        if let Event::SessionCompleted { auto_start, .. } = event {
            *completed += 1;
            if sessions.is_some_and(|n| *completed >= n) {
                return Next::Finish;
            }
            next = if !auto_start && sessions.is_some() {
                Next::StartNext
            } else {
                Next::Wait
            };
        }
    }
    next
}

/// Ticks redraw a status line on stderr; everything else is printed.
fn show(app: &App, events: &[Event]) -> CliResult {
    for event in events {
        match event {
            Event::TimerTick {
                mode, remaining_secs, ..
            } => {
                let count = app.timer().with_timer(|t| t.cycle_position());
                eprint!(
                    "\r{} {} (#{count}/{})   ",
                    mode.label(),
                    format_clock(*remaining_secs),
                    app.settings().long_break_interval()
                );
            }
            other => {
                eprintln!();
                print_events(std::slice::from_ref(other))?;
                announce(std::slice::from_ref(other));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(auto_start: bool) -> Event {
        serde_json::from_value(serde_json::json!({
            "type": "SessionCompleted",
            "finished": "focus",
            "next": "short-break",
            "session_count": 1,
            "auto_start": auto_start,
            "at": "2026-01-01T09:25:00Z",
        }))
        .unwrap()
    }

    fn tick() -> Event {
        serde_json::from_value(serde_json::json!({
            "type": "TimerTick",
            "mode": "focus",
            "remaining_secs": 60,
            "total_secs": 1500,
        }))
        .unwrap()
    }

    #[test]
    fn test_ticks_keep_waiting() {
        let mut count = 0;
        assert_eq!(after_batch(&[tick()], &mut count, Some(2)), Next::Wait);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_session_limit_starts_next_mode_without_auto_start() {
        let mut count = 0;
        assert_eq!(after_batch(&[completed(false)], &mut count, Some(3)), Next::StartNext);
        assert_eq!(after_batch(&[completed(false)], &mut count, Some(3)), Next::StartNext);
        assert_eq!(after_batch(&[completed(false)], &mut count, Some(3)), Next::Finish);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_auto_start_chains_by_itself() {
        let mut count = 0;
        assert_eq!(after_batch(&[completed(true)], &mut count, Some(2)), Next::Wait);
        assert_eq!(after_batch(&[completed(true)], &mut count, Some(2)), Next::Finish);
    }

    #[test]
    fn test_without_limit_settings_decide() {
        let mut count = 0;
        assert_eq!(after_batch(&[completed(false)], &mut count, None), Next::Wait);
        assert_eq!(count, 1);
    }
}

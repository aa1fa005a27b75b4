//! Async driver around [`SessionTimer`].
//!
//! Owns the once-per-second ticker task and the delayed auto-start of the
//! next mode. At most one ticker is ever live: every command bumps a
//! generation counter under the timer lock and aborts the previous tasks,
//! and stale tasks check the generation before touching the timer.
//!
//! Must be used from inside a tokio runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::clock::Clock;
use super::engine::{completion, SessionTimer};
use super::mode::TimerMode;
use crate::events::Event;
use crate::storage::Settings;

/// Delay between a completion and the automatic start of the next mode.
pub const AUTO_START_DELAY: Duration = Duration::from_secs(3);

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct TimerDriver {
    inner: Arc<Inner>,
}

struct Inner {
    timer: Mutex<SessionTimer>,
    handles: Mutex<Handles>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<Event>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct Handles {
    ticker: Option<JoinHandle<()>>,
    auto_start: Option<JoinHandle<()>>,
}

impl TimerDriver {
    /// Wrap `timer`. Every event it produces is sent to the returned receiver.
    pub fn new(timer: SessionTimer, clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            timer: Mutex::new(timer),
            handles: Mutex::new(Handles::default()),
            generation: AtomicU64::new(0),
            events: tx,
            clock,
        });
        (Self { inner }, rx)
    }

    /// Read the timer state.
    pub fn with_timer<R>(&self, f: impl FnOnce(&SessionTimer) -> R) -> R {
        f(&self.inner.timer())
    }

    pub fn snapshot(&self) -> Event {
        self.inner.timer().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.timer().is_running()
    }

    pub fn start(&self) {
        let mut timer = self.inner.timer();
        let generation = self.inner.cancel_tasks();
        let events = timer.start(self.inner.clock.now_ms());
        self.inner.emit(events);
        if timer.is_running() {
            spawn_ticker(&self.inner, generation);
        }
    }

    pub fn pause(&self) {
        let mut timer = self.inner.timer();
        self.inner.cancel_tasks();
        self.inner.emit(timer.pause().into_iter().collect());
    }

    /// Start when stopped, pause when running.
    pub fn toggle(&self) {
        if self.is_running() {
            self.pause();
        } else {
            self.start();
        }
    }

    pub fn reset(&self) {
        let mut timer = self.inner.timer();
        self.inner.cancel_tasks();
        let events = timer.reset();
        self.inner.emit(events);
    }

    pub fn set_mode(&self, mode: TimerMode) {
        let mut timer = self.inner.timer();
        self.inner.cancel_tasks();
        let event = timer.set_mode(mode);
        self.inner.emit(vec![event]);
    }

    pub fn set_config(&self, settings: Settings) {
        let mut timer = self.inner.timer();
        self.inner.cancel_tasks();
        let events = timer.set_config(settings);
        self.inner.emit(events);
    }

    /// Recompute remaining time from the wall clock. Call on wake/visibility.
    pub fn resync(&self) {
        let mut timer = self.inner.timer();
        let events = timer.resync(self.inner.clock.now_ms());
        if let Some((_, next, auto_start)) = completion(&events) {
            let generation = self.inner.cancel_tasks();
            self.inner.emit(events);
            if auto_start {
                schedule_auto_start(&self.inner, generation, next);
            }
        } else {
            self.inner.emit(events);
        }
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.inner.cancel_tasks();
    }
}

impl Inner {
    fn timer(&self) -> MutexGuard<'_, SessionTimer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self) -> MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate and abort the ticker and any pending auto-start.
    /// Returns the new generation.
    fn cancel_tasks(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut handles = self.handles();
        if let Some(handle) = handles.ticker.take() {
            handle.abort();
        }
        if let Some(handle) = handles.auto_start.take() {
            tracing::debug!("cancelled pending auto-start");
            handle.abort();
        }
        generation
    }

    fn emit(&self, events: Vec<Event>) {
        for event in events {
            // Nobody listening is fine.
            let _ = self.events.send(event);
        }
    }
}

fn spawn_ticker(inner: &Arc<Inner>, generation: u64) {
    let task = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        loop {
            interval.tick().await;
            let mut timer = task.timer();
            if !task.is_current(generation) || !timer.is_running() {
                return;
            }
            let events = timer.tick();
            let done = completion(&events);
            task.emit(events);
            if let Some((finished, next, auto_start)) = done {
                tracing::info!(%finished, %next, auto_start, "session completed");
                if auto_start {
                    schedule_auto_start(&task, generation, next);
                }
                return;
            }
        }
    });
    inner.handles().ticker = Some(handle);
}

fn schedule_auto_start(inner: &Arc<Inner>, generation: u64, next: TimerMode) {
    let task = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(AUTO_START_DELAY).await;
        let mut timer = task.timer();
        if !task.is_current(generation) {
            return;
        }
        let mut events = vec![timer.set_mode(next)];
        events.extend(timer.start(task.clock.now_ms()));
        task.emit(events);
        spawn_ticker(&task, generation);
    });
    inner.handles().auto_start = Some(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    fn settings(focus: u32, short: u32) -> Settings {
        Settings {
            focus_duration: focus,
            short_break_duration: short,
            ..Settings::default()
        }
    }

    fn driver(settings: Settings) -> (TimerDriver, mpsc::UnboundedReceiver<Event>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (driver, rx) = TimerDriver::new(SessionTimer::new(settings), clock.clone());
        (driver, rx, clock)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second() {
        let (driver, mut rx, _) = driver(settings(1, 1));
        driver.start();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(driver.with_timer(|t| t.time_left_secs()), 57);
        let ticks = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, Event::TimerTick { .. }))
            .count();
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_keeps_a_single_ticker() {
        let (driver, _rx, _) = driver(settings(1, 1));
        driver.start();
        driver.start();
        driver.pause();
        driver.start();
        driver.start();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(driver.with_timer(|t| t.time_left_secs()), 55);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticking() {
        let (driver, _rx, _) = driver(settings(1, 1));
        driver.start();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        driver.pause();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(driver.with_timer(|t| t.time_left_secs()), 58);
        assert!(!driver.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_start_chains_after_delay() {
        let mut s = settings(0, 1);
        s.auto_start_breaks = true;
        let (driver, mut rx, _) = driver(s);
        driver.start();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let events = drain(&mut rx);
        assert_eq!(
            completion(&events),
            Some((TimerMode::Focus, TimerMode::ShortBreak, true))
        );
        assert_eq!(driver.with_timer(|t| t.mode()), TimerMode::Focus);

        tokio::time::sleep(AUTO_START_DELAY).await;
        assert_eq!(driver.with_timer(|t| t.mode()), TimerMode::ShortBreak);
        assert!(driver.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_command_cancels_pending_auto_start() {
        let mut s = settings(0, 1);
        s.auto_start_breaks = true;
        let (driver, _rx, _) = driver(s);
        driver.start();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        driver.pause();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(driver.with_timer(|t| t.mode()), TimerMode::Focus);
        assert!(!driver.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn without_auto_start_next_mode_waits() {
        let (driver, mut rx, _) = driver(settings(0, 1));
        driver.start();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(driver.with_timer(|t| t.mode()), TimerMode::ShortBreak);
        assert!(!driver.is_running());
        let completions = drain(&mut rx)
            .iter()
            .filter(|e| matches!(e, Event::SessionCompleted { .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_uses_wall_clock() {
        let (driver, _rx, clock) = driver(settings(1, 1));
        driver.start();
        clock.advance(Duration::from_secs(40));
        driver.resync();
        assert_eq!(driver.with_timer(|t| t.time_left_secs()), 20);

        clock.advance(Duration::from_secs(30));
        driver.resync();
        assert_eq!(driver.with_timer(|t| t.mode()), TimerMode::ShortBreak);
        assert_eq!(driver.with_timer(|t| t.session_count()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_config_rearms_and_stops() {
        let (driver, _rx, _) = driver(settings(1, 1));
        driver.start();
        driver.set_config(settings(2, 1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(driver.with_timer(|t| t.time_left_secs()), 120);
    }
}

//! Application context.
//!
//! [`App`] owns the persisted state, the timer driver, the ambient sound
//! engine and the cue player, and reacts to timer events: completed focus
//! sessions update statistics, credit a task and may unlock achievements.
//! State is written back to the [`BlobStore`] after every change.
//!
//! The running timer is stored next to the application record so that a
//! short-lived process (one CLI invocation) can pick up a countdown started
//! by a previous one and resync it against the wall clock.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::sync::mpsc;

use crate::error::{Result, ValidationError};
use crate::events::Event;
use crate::sound::{AssetFetcher, Catalog, Cue, CuePlayer, SharedBackend, SoundEngine};
use crate::stats::{AchievementBook, Statistics};
use crate::storage::{AppData, BlobStore, Settings};
use crate::task::{Task, TaskList};
use crate::timer::{Clock, SessionTimer, TimerDriver, TimerMode};

/// Key of the serialized [`SessionTimer`] in the [`BlobStore`].
pub const TIMER_KEY: &str = "zomodoro-timer";

pub struct App {
    data: AppData,
    store: Box<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    timer: TimerDriver,
    events: mpsc::UnboundedReceiver<Event>,
    sounds: SoundEngine,
    cues: CuePlayer,
}

impl App {
    /// Load state from `store` and wire up the timer and sound engine.
    ///
    /// A missing or corrupt record yields defaults. Must be called inside a
    /// tokio runtime.
    pub fn new(
        store: Box<dyn BlobStore>,
        backend: SharedBackend,
        catalog: Catalog,
        fetcher: Arc<dyn AssetFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut data = AppData::load(store.as_ref());
        let today = local_date(clock.now_ms());
        data.statistics.roll_over(today);

        let timer = restore_timer(store.as_ref(), &data);
        let (timer, events) = TimerDriver::new(timer, Arc::clone(&clock));
        let sounds = SoundEngine::new(Arc::clone(&backend), catalog, fetcher)?;
        let cues = CuePlayer::new(backend, data.settings.sound_enabled);

        Ok(Self {
            data,
            store,
            clock,
            timer,
            events,
            sounds,
            cues,
        })
    }

    pub fn data(&self) -> &AppData {
        &self.data
    }

    pub fn settings(&self) -> &Settings {
        &self.data.settings
    }

    pub fn tasks(&self) -> &TaskList {
        &self.data.tasks
    }

    pub fn statistics(&self) -> &Statistics {
        &self.data.statistics
    }

    pub fn achievements(&self) -> &AchievementBook {
        &self.data.achievements
    }

    pub fn timer(&self) -> &TimerDriver {
        &self.timer
    }

    pub fn sounds(&self) -> &SoundEngine {
        &self.sounds
    }

    pub fn cues(&self) -> &CuePlayer {
        &self.cues
    }

    /// Start background loads of the default tracks. Call once when a
    /// long-lived session begins.
    pub fn preload_sounds(&self) {
        self.sounds.preload_defaults();
    }

    /// Local calendar day according to the app clock.
    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now_ms())
    }

    /// Handle every queued timer event without waiting. Returns the timer
    /// events followed, each, by whatever they caused.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.extend(self.process(event));
        }
        out
    }

    /// Wait for the next timer event, handle it and everything queued
    /// behind it.
    pub async fn next_events(&mut self) -> Option<Vec<Event>> {
        let event = self.events.recv().await?;
        let mut out = self.process(event);
        out.extend(self.drain_events());
        Some(out)
    }

    fn process(&mut self, event: Event) -> Vec<Event> {
        let derived = self.handle(&event);
        let mut out = Vec::with_capacity(1 + derived.len());
        out.push(event);
        out.extend(derived);
        out
    }

    /// React to one timer event. Returns the events it caused.
    pub fn handle(&mut self, event: &Event) -> Vec<Event> {
        match event {
            Event::TimerStarted { .. } => {
                self.cue(Cue::Start);
                Vec::new()
            }
            Event::SessionCompleted {
                finished,
                session_count,
                ..
            } => {
                self.data.session_count = *session_count;
                let mut derived = Vec::new();
                if *finished == TimerMode::Focus {
                    let today = self.today();
                    self.data.statistics.roll_over(today);
                    self.data.statistics.record_pomodoro(today);
                    if let Some(id) = self.data.tasks.assign_pomodoro() {
                        tracing::debug!(task = %id, "credited pomodoro");
                    }
                    derived = self.check_achievements();
                }
                self.cue(Cue::Complete);
                self.persist();
                derived
            }
            _ => Vec::new(),
        }
    }

    fn check_achievements(&mut self) -> Vec<Event> {
        let completed = self.data.tasks.completed_count();
        let unlocked = self.data.achievements.check(&self.data.statistics, completed);
        let mut events = Vec::new();
        for achievement in unlocked {
            tracing::info!(id = %achievement.id, "achievement unlocked");
            self.cue(Cue::Achievement);
            events.push(Event::AchievementUnlocked {
                id: achievement.id.clone(),
                title: achievement.title.clone(),
                icon: achievement.icon.clone(),
                at: Utc::now(),
            });
            events.push(Event::notification(
                format!("Achievement Unlocked! {}", achievement.icon),
                achievement.title,
            ));
        }
        events
    }

    fn cue(&self, cue: Cue) {
        if let Err(e) = self.cues.play(cue) {
            tracing::debug!(?cue, error = %e, "cue failed");
        }
    }

    /// Write the application record and the timer.
    ///
    /// # Errors
    /// Returns an error if serialization or the store write fails.
    pub fn save(&mut self) -> Result<()> {
        let timer = self.timer.with_timer(|t| {
            self.data.session_count = t.session_count();
            self.data.completed_pomodoros = t.completed_pomodoros();
            serde_json::to_string(t)
        })?;
        self.data.save(self.store.as_ref())?;
        self.store.write(TIMER_KEY, &timer)?;
        Ok(())
    }

    /// Save, logging instead of failing.
    fn persist(&mut self) {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "could not save state");
        }
    }

    /// Id of the task whose id is `prefix` or starts with it.
    ///
    /// # Errors
    /// Returns [`ValidationError::NotFound`] unless exactly one task matches.
    pub fn find_task(&self, prefix: &str) -> Result<String> {
        if let Some(task) = self.data.tasks.get(prefix) {
            return Ok(task.id.clone());
        }
        let mut matches = self.data.tasks.iter().filter(|t| !prefix.is_empty() && t.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.id.clone()),
            _ => Err(ValidationError::NotFound {
                kind: "task".into(),
                id: prefix.into(),
            }
            .into()),
        }
    }

    pub fn add_task(&mut self, name: &str, required_pomodoros: u32) -> Result<Task> {
        let task = self.data.tasks.add(name, required_pomodoros)?.clone();
        self.save()?;
        Ok(task)
    }

    /// Flip a task's completed flag. Returns the new flag and any
    /// achievements it unlocked.
    pub fn toggle_task(&mut self, id: &str) -> Result<(bool, Vec<Event>)> {
        let completed = self.data.tasks.toggle(id)?;
        let events = self.check_achievements();
        self.save()?;
        Ok((completed, events))
    }

    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        let task = self.data.tasks.delete(id).ok_or_else(|| ValidationError::NotFound {
            kind: "task".into(),
            id: id.into(),
        })?;
        self.save()?;
        Ok(task)
    }

    /// Remove every task. Returns the notification to show.
    pub fn clear_tasks(&mut self) -> Result<Event> {
        let count = self.data.tasks.clear();
        if count == 0 {
            return Ok(Event::notification("No Tasks", "There are no tasks to clear."));
        }
        self.save()?;
        let plural = if count == 1 { "" } else { "s" };
        Ok(Event::notification(
            "Tasks Cleared",
            format!("Successfully cleared {count} task{plural}."),
        ))
    }

    /// Change one setting by key, re-arm the timer and save.
    ///
    /// # Errors
    /// Unknown keys are errors; bad values keep the prior setting.
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<Event> {
        let mut settings = self.data.settings.clone();
        settings.set(key, value)?;
        self.apply_settings(settings)
    }

    pub fn reset_settings(&mut self) -> Result<Event> {
        self.apply_settings(Settings::default())
    }

    fn apply_settings(&mut self, settings: Settings) -> Result<Event> {
        self.cues.set_enabled(settings.sound_enabled);
        self.timer.set_config(settings.clone());
        self.data.settings = settings;
        self.save()?;
        Ok(Event::notification("Settings Saved", "Your preferences have been updated."))
    }

    /// Stop every ambient track. Returns the notification to show.
    pub fn stop_all_sounds(&self) -> Event {
        self.sounds.stop_all();
        Event::notification("🔇 Sounds Stopped", "All focus sounds have been stopped.")
    }
}

fn restore_timer(store: &dyn BlobStore, data: &AppData) -> SessionTimer {
    let saved = match store.read(TIMER_KEY) {
        Ok(Some(json)) => match serde_json::from_str::<SessionTimer>(&json) {
            Ok(timer) => Some(timer),
            Err(e) => {
                tracing::warn!(error = %e, "discarding corrupt saved timer");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "could not read saved timer");
            None
        }
    };
    match saved {
        Some(mut timer) => {
            if timer.settings() != &data.settings {
                timer.set_config(data.settings.clone());
            }
            timer
        }
        None => SessionTimer::with_counts(data.settings.clone(), data.session_count, data.completed_pomodoros),
    }
}

fn local_date(now_ms: u64) -> NaiveDate {
    let ms = i64::try_from(now_ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .with_timezone(&Local)
        .date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::buffer::wav_bytes;
    use crate::sound::testing::{MockBackend, MockKind, Reply, ScriptedFetcher};
    use crate::sound::SoundGroup;
    use crate::storage::{MemoryStore, STATE_KEY};
    use crate::timer::ManualClock;
    use std::sync::Mutex;

    const T0: u64 = 1_700_000_000_000;

    struct Fixture {
        store: Arc<MemoryStore>,
        mock: Arc<Mutex<MockBackend>>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new(record: Option<&str>) -> Self {
            let store = match record {
                Some(json) => MemoryStore::with_record(STATE_KEY, json),
                None => MemoryStore::new(),
            };
            let (mock, _) = MockBackend::new().shared();
            Self {
                store: Arc::new(store),
                mock,
                clock: Arc::new(ManualClock::new(T0)),
            }
        }

        fn app(&self) -> App {
            self.app_with(Arc::new(ScriptedFetcher::new(Reply::Hang)))
        }

        fn app_with(&self, fetcher: Arc<ScriptedFetcher>) -> App {
            let backend: SharedBackend = self.mock.clone();
            App::new(
                Box::new(Arc::clone(&self.store)),
                backend,
                Catalog::default(),
                fetcher,
                self.clock.clone(),
            )
            .unwrap()
        }

        fn saved(&self) -> AppData {
            AppData::load(self.store.as_ref())
        }

        fn oscillators(&self) -> usize {
            let mock = self.mock.lock().unwrap();
            mock.nodes()
                .filter(|(_, n)| matches!(n.kind, MockKind::Oscillator { .. }))
                .count()
        }
    }

    fn titles(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Notification { title, .. } => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn preload_sounds_loads_the_cozy_tracks() {
        let fixture = Fixture::new(None);
        let fetcher = Arc::new(ScriptedFetcher::new(Reply::Bytes(wav_bytes(&[0.1, 0.2], 8_000, 1))));
        let app = fixture.app_with(fetcher.clone());
        app.preload_sounds();
        app.sounds().wait_idle().await;

        assert_eq!(fetcher.calls(), 6);
        let status = app.sounds().status();
        let cozy: Vec<_> = status.iter().filter(|s| s.group == SoundGroup::Cozy).collect();
        assert_eq!(cozy.len(), 6);
        assert!(cozy.iter().all(|s| s.loaded && !s.playing));
        assert_eq!(fixture.mock.lock().unwrap().live_sources().len(), 0);
    }

    #[tokio::test]
    async fn empty_store_gives_defaults() {
        let fixture = Fixture::new(None);
        let app = fixture.app();
        assert_eq!(app.settings(), &Settings::default());
        assert!(app.tasks().is_empty());
        assert_eq!(app.timer().with_timer(|t| t.time_left_secs()), 25 * 60);
    }

    #[tokio::test]
    async fn corrupt_store_gives_defaults() {
        let fixture = Fixture::new(Some("{not json"));
        let app = fixture.app();
        assert_eq!(app.data(), &AppData::default());
    }

    #[tokio::test(start_paused = true)]
    async fn focus_completion_updates_everything() {
        let fixture = Fixture::new(Some(r#"{"settings":{"focusDuration":1}}"#));
        let mut app = fixture.app();
        let task = app.add_task("write report", 2).unwrap();

        app.timer().start();
        let mut seen = Vec::new();
        while !seen.iter().any(|e| matches!(e, Event::SessionCompleted { .. })) {
            seen.extend(app.next_events().await.unwrap());
        }

        assert_eq!(app.statistics().total_pomodoros, 1);
        assert_eq!(app.tasks().get(&task.id).unwrap().completed_pomodoros, 1);
        assert!(seen
            .iter()
            .any(|e| matches!(e, Event::AchievementUnlocked { id, .. } if id == "first_pomodoro")));
        let titles = titles(&seen);
        assert!(titles.contains(&"Focus Session Complete!".to_string()));
        assert!(titles.iter().any(|t| t.starts_with("Achievement Unlocked!")));

        // start + complete arpeggio + achievement arpeggio
        assert_eq!(fixture.oscillators(), 1 + 3 + 4);

        let saved = fixture.saved();
        assert_eq!(saved.session_count, 1);
        assert_eq!(saved.completed_pomodoros, 1);
        assert_eq!(saved.statistics.total_pomodoros, 1);
    }

    #[tokio::test]
    async fn running_timer_survives_restart() {
        let fixture = Fixture::new(Some(r#"{"settings":{"focusDuration":1}}"#));
        {
            let mut app = fixture.app();
            app.timer().start();
            app.drain_events();
            app.save().unwrap();
        }

        fixture.clock.set(T0 + 30_000);
        let mut app = fixture.app();
        assert!(app.timer().is_running());
        app.timer().resync();
        app.drain_events();
        assert_eq!(app.timer().with_timer(|t| t.time_left_secs()), 30);

        fixture.clock.set(T0 + 61_000);
        app.timer().resync();
        let events = app.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::SessionCompleted { finished: TimerMode::Focus, next: TimerMode::ShortBreak, .. }
        )));
        assert_eq!(app.statistics().total_pomodoros, 1);
        assert_eq!(app.timer().with_timer(|t| t.mode()), TimerMode::ShortBreak);
        assert_eq!(fixture.saved().session_count, 1);
    }

    #[tokio::test]
    async fn changed_settings_rearm_restored_timer() {
        let fixture = Fixture::new(None);
        {
            let mut app = fixture.app();
            app.save().unwrap();
        }
        let mut data = fixture.saved();
        data.settings.focus_duration = 50;
        data.save(fixture.store.as_ref()).unwrap();

        let app = fixture.app();
        assert_eq!(app.timer().with_timer(|t| t.total_secs()), 50 * 60);
    }

    #[tokio::test]
    async fn set_setting_saves_and_rearms() {
        let fixture = Fixture::new(None);
        let mut app = fixture.app();

        let notice = app.set_setting("focusDuration", "40").unwrap();
        assert_eq!(titles(&[notice]), vec!["Settings Saved"]);
        assert_eq!(app.timer().with_timer(|t| t.total_secs()), 40 * 60);
        assert_eq!(fixture.saved().settings.focus_duration, 40);

        app.set_setting("focusDuration", "-3").unwrap();
        assert_eq!(app.settings().focus_duration, 40);

        assert!(app.set_setting("volume", "3").is_err());

        app.set_setting("soundEnabled", "false").unwrap();
        assert!(!app.cues().is_enabled());

        app.reset_settings().unwrap();
        assert_eq!(fixture.saved().settings, Settings::default());
    }

    #[tokio::test]
    async fn disabled_sound_skips_cues() {
        let fixture = Fixture::new(Some(r#"{"settings":{"soundEnabled":false}}"#));
        let mut app = fixture.app();
        app.timer().start();
        app.drain_events();
        assert_eq!(fixture.oscillators(), 0);
    }

    #[tokio::test]
    async fn task_crud_is_persisted() {
        let fixture = Fixture::new(None);
        let mut app = fixture.app();
        let a = app.add_task("a", 1).unwrap();
        let b = app.add_task("b", 3).unwrap();
        assert!(app.add_task("   ", 1).is_err());

        let (done, _) = app.toggle_task(&a.id).unwrap();
        assert!(done);
        app.delete_task(&b.id).unwrap();
        assert!(app.delete_task(&b.id).is_err());

        let saved = fixture.saved();
        assert_eq!(saved.tasks.len(), 1);
        assert!(saved.tasks.get(&a.id).unwrap().completed);
    }

    #[tokio::test]
    async fn clear_tasks_reports_count() {
        let fixture = Fixture::new(None);
        let mut app = fixture.app();
        assert_eq!(titles(&[app.clear_tasks().unwrap()]), vec!["No Tasks"]);

        app.add_task("a", 1).unwrap();
        app.add_task("b", 1).unwrap();
        match app.clear_tasks().unwrap() {
            Event::Notification { message, .. } => assert_eq!(message, "Successfully cleared 2 tasks."),
            other => panic!("unexpected {other:?}"),
        }
        assert!(fixture.saved().tasks.is_empty());
    }

    #[tokio::test]
    async fn completing_ten_tasks_unlocks_task_master() {
        let fixture = Fixture::new(None);
        let mut app = fixture.app();
        let ids: Vec<String> = (0..10).map(|i| app.add_task(&format!("t{i}"), 1).unwrap().id).collect();
        let mut unlocked = Vec::new();
        for id in &ids {
            unlocked.extend(app.toggle_task(id).unwrap().1);
        }
        assert!(unlocked
            .iter()
            .any(|e| matches!(e, Event::AchievementUnlocked { id, .. } if id == "task_master")));
        assert!(fixture.saved().achievements.iter().any(|a| a.id == "task_master" && a.unlocked));
    }

    #[tokio::test]
    async fn find_task_by_prefix() {
        let fixture = Fixture::new(None);
        let mut app = fixture.app();
        let task = app.add_task("a", 1).unwrap();
        assert_eq!(app.find_task(&task.id[..8]).unwrap(), task.id);
        assert_eq!(app.find_task(&task.id).unwrap(), task.id);
        assert!(app.find_task("zzzz").is_err());
        assert!(app.find_task("").is_err());
    }

    #[tokio::test]
    async fn stop_all_sounds_notifies() {
        let fixture = Fixture::new(None);
        let app = fixture.app();
        app.sounds().play("white-noise").unwrap();
        let notice = app.stop_all_sounds();
        assert_eq!(titles(&[notice]), vec!["🔇 Sounds Stopped"]);
        assert!(!app.sounds().is_playing("white-noise"));
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    config::ApplianceConfig,
    notify::{ChangeNotifier, SubscriptionId},
    power::{DoorSample, PowerSample},
    profile::CycleProfile,
    timers::{TimerSet, TimerSlot},
    types::{ApplianceState, ApplianceStatus, ApplianceType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerAction {
    ConfirmRunning,
    CancelStartCandidate,
    ConfirmFinished,
    ResetCycle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleRecord {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_runtime_seconds: Option<f64>,
    pub door_open: Option<bool>,
    pub door_last_opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CycleEngine {
    id: String,
    name: String,
    appliance_type: ApplianceType,
    profile: CycleProfile,
    has_door_sensor: bool,

    state: ApplianceState,
    record: CycleRecord,
    // Latest usable reading; cleared by unavailable or unparsable samples.
    live_power_w: Option<f64>,

    timers: TimerSet<TimerAction>,
    notifier: ChangeNotifier,
}

impl CycleEngine {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        appliance_type: ApplianceType,
        profile: CycleProfile,
        has_door_sensor: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            appliance_type,
            profile,
            has_door_sensor,
            state: ApplianceState::Idle,
            record: CycleRecord::default(),
            live_power_w: None,
            timers: TimerSet::new(),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn from_config(config: &ApplianceConfig, profile: CycleProfile) -> Self {
        Self::new(
            config.id.clone(),
            config.name.clone(),
            config.appliance_type,
            profile,
            config.has_door_sensor(),
        )
    }

    pub fn state(&self) -> ApplianceState {
        self.state
    }

    pub fn record(&self) -> &CycleRecord {
        &self.record
    }

    pub fn profile(&self) -> &CycleProfile {
        &self.profile
    }

    pub fn is_timer_pending(&self, slot: TimerSlot) -> bool {
        self.timers.is_pending(slot)
    }

    pub fn timer_due_at(&self, slot: TimerSlot) -> Option<DateTime<Utc>> {
        self.timers.due_at(slot)
    }

    pub fn subscribe(&mut self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    pub fn start(&mut self, now: DateTime<Utc>, tick_interval: Duration) {
        self.timers.schedule_recurring(tick_interval, now);
    }

    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
    }

    pub fn seed_door(&mut self, is_open: bool, last_changed: DateTime<Utc>) {
        self.record.door_open = Some(is_open);
        if is_open {
            self.record.door_last_opened_at = Some(last_changed);
        }
    }

    pub fn update_profile(&mut self, profile: CycleProfile) {
        if self.profile != profile {
            info!("{}: profile updated", self.id);
            self.profile = profile;
        }
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }

    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.fire_due(now, true);
    }

    pub fn handle_power(&mut self, sample: &PowerSample) {
        self.fire_due(sample.at, false);

        let Some(watts) = sample.watts() else {
            debug!("{}: ignoring unusable power reading {:?}", self.id, sample.value);
            self.live_power_w = None;
            return;
        };
        self.live_power_w = Some(watts);
        let now = sample.at;

        match self.state {
            ApplianceState::Idle => self.idle_power(watts, now),
            ApplianceState::Running => self.running_power(watts, now),
            ApplianceState::Finished => {}
        }
    }

    pub fn handle_door(&mut self, sample: &DoorSample) {
        if !sample.available {
            debug!("{}: ignoring unavailable door reading", self.id);
            return;
        }
        self.fire_due(sample.at, false);
        let now = sample.at;

        let was_open = self.record.door_open == Some(true);
        self.record.door_open = Some(sample.is_open);

        if sample.is_open && !was_open {
            self.record.door_last_opened_at = Some(now);
            match self.state {
                ApplianceState::Running => {
                    self.timers.cancel(TimerSlot::StopConfirm);
                    let runtime = self.runtime_secs(now);
                    if runtime < self.profile.min_run_secs() {
                        info!("{}: door opened after {runtime:.0}s, discarding false start", self.id);
                        self.reset_cycle();
                    } else {
                        self.finish(now, runtime);
                        self.timers.schedule(
                            TimerSlot::Resume,
                            self.profile.resume_grace(),
                            TimerAction::ResetCycle,
                            now,
                        );
                    }
                }
                ApplianceState::Finished => {
                    info!("{}: door opened, cycle acknowledged", self.id);
                    self.reset_cycle();
                }
                ApplianceState::Idle => {}
            }
        }

        self.notifier.raise();
    }

    pub fn run_time_seconds(&self, now: DateTime<Utc>) -> f64 {
        if self.state == ApplianceState::Running {
            self.runtime_secs(now)
        } else {
            0.0
        }
    }

    pub fn seconds_since_finished(&self, now: DateTime<Utc>) -> f64 {
        let Some(finished_at) = self.record.finished_at else {
            return 0.0;
        };
        if self
            .record
            .door_last_opened_at
            .is_some_and(|opened| opened >= finished_at)
        {
            return 0.0;
        }
        secs_between(finished_at, now)
    }

    pub fn label(&self, now: DateTime<Utc>) -> String {
        if self.record.door_open == Some(true) {
            return "Open".to_string();
        }
        match self.state {
            ApplianceState::Running => {
                let total_minutes = self.run_time_seconds(now) as u64 / 60;
                let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
                if hours > 0 {
                    format!("{hours}h {minutes:02}m")
                } else {
                    format!("{minutes}m")
                }
            }
            ApplianceState::Finished => "Finished".to_string(),
            ApplianceState::Idle => "Idle".to_string(),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> ApplianceStatus {
        ApplianceStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            appliance_type: self.appliance_type,
            state: self.state,
            running: self.state == ApplianceState::Running,
            label: self.label(now),
            started_at: self.record.started_at,
            finished_at: self.record.finished_at,
            run_time_seconds: self.run_time_seconds(now) as u64,
            last_runtime_seconds: self.record.last_runtime_seconds.map(|secs| secs as u64),
            door_open: self.record.door_open,
            door_last_opened_at: self.record.door_last_opened_at,
            seconds_since_finished: self.seconds_since_finished(now) as u64,
        }
    }

    fn fire_due(&mut self, now: DateTime<Utc>, inclusive: bool) {
        while let Some(due) = self.timers.next_due() {
            if due > now || (!inclusive && due == now) {
                break;
            }
            if let Some(fired) = self.timers.pop_due(due) {
                debug!("{}: {} timer fired", self.id, fired.slot.as_str());
                self.run_action(fired.action, fired.due);
            } else if let Some(tick_at) = self.timers.take_tick(now) {
                // One refresh for however many intervals were missed.
                self.on_tick(tick_at);
            }
        }
    }

    fn run_action(&mut self, action: TimerAction, now: DateTime<Utc>) {
        match action {
            TimerAction::ConfirmRunning => self.confirm_running(now),
            TimerAction::CancelStartCandidate => self.cancel_start_candidate(),
            TimerAction::ConfirmFinished => self.confirm_finished(now),
            TimerAction::ResetCycle => {
                info!("{}: resume grace elapsed", self.id);
                self.reset_cycle();
                self.notifier.raise();
            }
        }
    }

    fn idle_power(&mut self, watts: f64, now: DateTime<Utc>) {
        if watts >= self.profile.on_threshold {
            // Recovery stops the abandon countdown but leaves the original
            // confirmation deadline in place.
            self.timers.cancel(TimerSlot::StartGrace);
            if self.timers.schedule(
                TimerSlot::StartConfirm,
                self.profile.delay_on(),
                TimerAction::ConfirmRunning,
                now,
            ) {
                debug!("{}: start candidate at {watts}W", self.id);
            }
        } else if self.timers.is_pending(TimerSlot::StartConfirm) {
            if self.profile.start_grace > 0 {
                self.timers.schedule(
                    TimerSlot::StartGrace,
                    self.profile.start_grace(),
                    TimerAction::CancelStartCandidate,
                    now,
                );
            } else {
                self.cancel_start_candidate();
            }
        }
    }

    fn running_power(&mut self, watts: f64, now: DateTime<Utc>) {
        if watts <= self.profile.off_threshold {
            self.timers.schedule(
                TimerSlot::StopConfirm,
                self.profile.stop_delay(),
                TimerAction::ConfirmFinished,
                now,
            );
        } else {
            self.timers.cancel(TimerSlot::StopConfirm);
        }
    }

    fn cancel_start_candidate(&mut self) {
        self.timers.cancel(TimerSlot::StartGrace);
        if self.timers.cancel(TimerSlot::StartConfirm) {
            debug!("{}: start candidate abandoned", self.id);
        }
    }

    fn confirm_running(&mut self, now: DateTime<Utc>) {
        self.timers.cancel(TimerSlot::StartConfirm);
        self.timers.cancel(TimerSlot::StartGrace);

        match self.live_power_w {
            Some(watts) if watts >= self.profile.on_threshold => {}
            _ => {
                debug!("{}: power not sustained at start confirmation", self.id);
                return;
            }
        }

        self.record.finished_at = None;
        self.record.started_at = Some(now);
        self.state = ApplianceState::Running;
        info!("{}: cycle started", self.id);
        self.notifier.raise();
    }

    fn confirm_finished(&mut self, now: DateTime<Utc>) {
        self.timers.cancel(TimerSlot::StopConfirm);

        match self.live_power_w {
            Some(watts) if watts <= self.profile.off_threshold => {}
            _ => {
                debug!("{}: power returned before stop confirmation", self.id);
                return;
            }
        }

        let runtime = self.runtime_secs(now);
        if runtime < self.profile.min_run_secs() {
            info!("{}: run of {runtime:.0}s below min_run, discarding false start", self.id);
            self.reset_cycle();
            self.notifier.raise();
            return;
        }

        self.finish(now, runtime);
        if !self.has_door_sensor {
            self.timers.schedule(
                TimerSlot::Resume,
                self.profile.resume_grace(),
                TimerAction::ResetCycle,
                now,
            );
        }
        self.notifier.raise();
    }

    fn finish(&mut self, now: DateTime<Utc>, runtime: f64) {
        self.state = ApplianceState::Finished;
        self.record.finished_at = Some(now);
        self.record.last_runtime_seconds = Some(runtime);
        info!("{}: cycle finished after {runtime:.0}s", self.id);
    }

    fn on_tick(&mut self, _now: DateTime<Utc>) {
        if self.state == ApplianceState::Running {
            self.notifier.raise();
            return;
        }
        if let Some(finished_at) = self.record.finished_at {
            let acknowledged = self
                .record
                .door_last_opened_at
                .is_some_and(|opened| opened >= finished_at);
            if !acknowledged {
                self.notifier.raise();
            }
        }
    }

    /// Returns to Idle. Callers raise the notifier themselves so each event
    /// produces a single signal.
    fn reset_cycle(&mut self) {
        for slot in TimerSlot::ALL {
            self.timers.cancel(slot);
        }
        self.state = ApplianceState::Idle;
        self.record.started_at = None;
        self.record.finished_at = None;
    }

    fn runtime_secs(&self, now: DateTime<Utc>) -> f64 {
        self.record
            .started_at
            .map(|started| secs_between(started, now))
            .unwrap_or(0.0)
    }
}

fn secs_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1_000.0
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use pretty_assertions::assert_eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    struct Harness {
        engine: CycleEngine,
        notified: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new(profile: CycleProfile, has_door_sensor: bool) -> Self {
            let mut engine = CycleEngine::new(
                "washer-1",
                "Washer",
                ApplianceType::Washer,
                profile,
                has_door_sensor,
            );
            engine.start(at(0), Duration::from_secs(60));
            let notified = Arc::new(AtomicUsize::new(0));
            let seen = notified.clone();
            engine.subscribe(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            });
            Self { engine, notified }
        }

        fn washer() -> Self {
            Self::new(ApplianceType::Washer.default_profile(), false)
        }

        fn power(&mut self, secs: i64, watts: f64) {
            self.engine
                .handle_power(&PowerSample::new(watts.to_string(), Some("W"), at(secs)));
        }

        fn door(&mut self, secs: i64, is_open: bool) {
            self.engine.handle_door(&DoorSample::new(is_open, at(secs)));
        }

        fn advance(&mut self, secs: i64) {
            self.engine.advance(at(secs));
        }

        fn state(&self) -> ApplianceState {
            self.engine.state()
        }

        fn notifications(&self) -> usize {
            self.notified.load(Ordering::SeqCst)
        }

        fn running_at_90(&mut self) {
            self.power(0, 20.0);
            self.power(90, 20.0);
            self.advance(90);
            assert_eq!(self.state(), ApplianceState::Running);
        }
    }

    #[test]
    fn washer_scenario_without_door_sensor() {
        let mut h = Harness::washer();

        h.power(0, 20.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StartConfirm), Some(at(90)));

        h.power(90, 20.0);
        h.advance(90);
        assert_eq!(h.state(), ApplianceState::Running);
        assert_eq!(h.engine.record().started_at, Some(at(90)));

        h.power(300, 9.5);
        h.power(400, 5.0);
        assert!(h.engine.is_timer_pending(TimerSlot::StopConfirm));
        h.power(430, 12.0);
        assert!(!h.engine.is_timer_pending(TimerSlot::StopConfirm));

        h.power(700, 5.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StopConfirm), Some(at(1_120)));

        h.advance(1_120);
        assert_eq!(h.state(), ApplianceState::Finished);
        assert_eq!(h.engine.record().finished_at, Some(at(1_120)));
        assert_eq!(h.engine.record().last_runtime_seconds, Some(1_030.0));
        assert_eq!(h.engine.timer_due_at(TimerSlot::Resume), Some(at(1_300)));

        h.advance(1_299);
        assert_eq!(h.state(), ApplianceState::Finished);
        h.advance(1_300);
        assert_eq!(h.state(), ApplianceState::Idle);
        assert_eq!(h.engine.record().started_at, None);
        assert_eq!(h.engine.record().finished_at, None);
        assert_eq!(h.engine.record().last_runtime_seconds, Some(1_030.0));
    }

    #[test]
    fn running_starts_exactly_at_delay_on_even_if_advanced_late() {
        let mut h = Harness::washer();
        h.power(10, 40.0);
        h.advance(500);

        assert_eq!(h.state(), ApplianceState::Running);
        assert_eq!(h.engine.record().started_at, Some(at(100)));
    }

    #[test]
    fn repeated_high_readings_do_not_restart_confirmation() {
        let mut h = Harness::washer();
        h.power(0, 20.0);
        h.power(60, 25.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StartConfirm), Some(at(90)));
    }

    #[test]
    fn short_dip_within_grace_does_not_abort_start() {
        let mut h = Harness::washer();
        h.power(0, 20.0);
        h.power(30, 3.0);
        assert!(h.engine.is_timer_pending(TimerSlot::StartGrace));
        h.power(60, 20.0);
        assert!(!h.engine.is_timer_pending(TimerSlot::StartGrace));

        h.advance(90);
        assert_eq!(h.state(), ApplianceState::Running);
        assert_eq!(h.engine.record().started_at, Some(at(90)));
    }

    #[test]
    fn dip_at_confirmation_instant_aborts_start() {
        let mut h = Harness::washer();
        h.power(0, 20.0);
        h.power(90, 3.0);
        h.advance(90);

        assert_eq!(h.state(), ApplianceState::Idle);
        assert!(!h.engine.is_timer_pending(TimerSlot::StartConfirm));
        assert!(!h.engine.is_timer_pending(TimerSlot::StartGrace));
        assert_eq!(h.notifications(), 0);

        // Recovery moments later starts a fresh attempt.
        h.power(95, 20.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StartConfirm), Some(at(185)));
    }

    #[test]
    fn sustained_dip_beyond_grace_abandons_start() {
        let profile = CycleProfile {
            delay_on: 300,
            start_grace: 60,
            ..ApplianceType::Washer.default_profile()
        };
        let mut h = Harness::new(profile, false);

        h.power(0, 20.0);
        h.power(10, 2.0);
        h.power(40, 2.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StartGrace), Some(at(70)));

        h.advance(70);
        assert!(!h.engine.is_timer_pending(TimerSlot::StartConfirm));
        assert!(!h.engine.is_timer_pending(TimerSlot::StartGrace));

        h.power(100, 20.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StartConfirm), Some(at(400)));
        h.advance(400);
        assert_eq!(h.engine.record().started_at, Some(at(400)));
    }

    #[test]
    fn zero_grace_aborts_start_on_first_low_reading() {
        let profile = CycleProfile {
            start_grace: 0,
            ..ApplianceType::Washer.default_profile()
        };
        let mut h = Harness::new(profile, false);

        h.power(0, 20.0);
        h.power(45, 1.0);
        assert!(!h.engine.is_timer_pending(TimerSlot::StartConfirm));

        h.advance(200);
        assert_eq!(h.state(), ApplianceState::Idle);
    }

    #[test]
    fn low_reading_without_candidate_does_nothing() {
        let mut h = Harness::washer();
        h.power(0, 2.0);
        assert!(!h.engine.is_timer_pending(TimerSlot::StartConfirm));
        assert!(!h.engine.is_timer_pending(TimerSlot::StartGrace));
    }

    #[test]
    fn unavailable_reading_is_ignored_but_blocks_confirmation() {
        let mut h = Harness::washer();
        h.power(0, 20.0);
        h.engine.handle_power(&PowerSample::unavailable(at(50)));

        assert_eq!(h.state(), ApplianceState::Idle);
        assert!(h.engine.is_timer_pending(TimerSlot::StartConfirm));
        assert!(!h.engine.is_timer_pending(TimerSlot::StartGrace));

        h.advance(90);
        assert_eq!(h.state(), ApplianceState::Idle);
    }

    #[test]
    fn unparsable_reading_is_ignored() {
        let mut h = Harness::washer();
        h.running_at_90();
        h.engine
            .handle_power(&PowerSample::new("n/a", None, at(200)));

        assert_eq!(h.state(), ApplianceState::Running);
        assert!(!h.engine.is_timer_pending(TimerSlot::StopConfirm));
    }

    #[test]
    fn kilowatt_readings_are_scaled_before_thresholding() {
        let mut h = Harness::washer();
        h.engine
            .handle_power(&PowerSample::new("0.02", Some("kW"), at(0)));
        assert!(h.engine.is_timer_pending(TimerSlot::StartConfirm));
    }

    #[test]
    fn power_rebound_before_stop_confirmation_keeps_running() {
        let mut h = Harness::washer();
        h.running_at_90();

        h.power(700, 5.0);
        h.power(1_120, 30.0);
        h.advance(1_120);

        assert_eq!(h.state(), ApplianceState::Running);
        assert!(!h.engine.is_timer_pending(TimerSlot::StopConfirm));
    }

    #[test]
    fn short_run_is_discarded_as_false_start() {
        let profile = CycleProfile {
            min_run: 600,
            ..ApplianceType::Washer.default_profile()
        };
        let mut h = Harness::new(profile, false);
        h.running_at_90();
        h.power(100, 1.0);
        h.advance(519);
        let before = h.notifications();

        h.advance(520);

        assert_eq!(h.state(), ApplianceState::Idle);
        assert_eq!(h.engine.record().started_at, None);
        assert_eq!(h.engine.record().last_runtime_seconds, None);
        assert_eq!(h.notifications(), before + 1);
    }

    #[test]
    fn door_open_during_short_run_resets_without_runtime() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.running_at_90();
        h.power(150, 1.0);
        h.advance(200);
        let before = h.notifications();

        h.door(200, true);

        assert_eq!(h.state(), ApplianceState::Idle);
        assert_eq!(h.engine.record().last_runtime_seconds, None);
        assert_eq!(h.engine.record().door_last_opened_at, Some(at(200)));
        assert!(!h.engine.is_timer_pending(TimerSlot::StopConfirm));
        assert_eq!(h.notifications(), before + 1);
    }

    #[test]
    fn door_open_after_min_run_finishes_immediately() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.running_at_90();
        h.power(500, 5.0);
        assert!(h.engine.is_timer_pending(TimerSlot::StopConfirm));

        h.door(600, true);

        assert_eq!(h.state(), ApplianceState::Finished);
        assert_eq!(h.engine.record().finished_at, Some(at(600)));
        assert_eq!(h.engine.record().last_runtime_seconds, Some(510.0));
        assert!(!h.engine.is_timer_pending(TimerSlot::StopConfirm));
        assert_eq!(h.engine.timer_due_at(TimerSlot::Resume), Some(at(780)));
        assert_eq!(h.engine.seconds_since_finished(at(700)), 0.0);

        h.door(650, false);
        assert_eq!(h.state(), ApplianceState::Finished);
        h.advance(780);
        assert_eq!(h.state(), ApplianceState::Idle);
    }

    #[test]
    fn door_open_while_finished_acknowledges_and_cancels_resume() {
        let mut h = Harness::washer();
        h.running_at_90();
        h.power(700, 5.0);
        h.advance(1_120);
        assert!(h.engine.is_timer_pending(TimerSlot::Resume));

        h.door(1_150, true);
        assert_eq!(h.state(), ApplianceState::Idle);
        assert!(!h.engine.is_timer_pending(TimerSlot::Resume));

        // A new cycle is not cut short by the old resume deadline.
        h.door(1_160, false);
        h.power(1_170, 20.0);
        h.advance(1_260);
        assert_eq!(h.state(), ApplianceState::Running);
        h.advance(1_400);
        assert_eq!(h.state(), ApplianceState::Running);
    }

    #[test]
    fn finished_with_door_sensor_waits_for_door() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.running_at_90();
        h.power(700, 5.0);
        h.advance(1_120);

        assert_eq!(h.state(), ApplianceState::Finished);
        assert!(!h.engine.is_timer_pending(TimerSlot::Resume));
        h.advance(5_000);
        assert_eq!(h.state(), ApplianceState::Finished);
        assert_eq!(h.engine.seconds_since_finished(at(5_000)), 3_880.0);
    }

    #[test]
    fn every_door_event_notifies_once() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);

        h.door(10, true);
        h.door(20, true);
        h.door(30, false);
        assert_eq!(h.notifications(), 3);
        assert_eq!(h.state(), ApplianceState::Idle);
        assert_eq!(h.engine.record().door_open, Some(false));
        assert_eq!(h.engine.record().door_last_opened_at, Some(at(10)));

        h.engine.handle_door(&DoorSample::unavailable(at(40)));
        assert_eq!(h.notifications(), 3);
        assert_eq!(h.engine.record().door_open, Some(false));
    }

    #[test]
    fn tick_refreshes_only_while_running_or_unacknowledged() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.advance(60);
        assert_eq!(h.notifications(), 0);

        h.running_at_90();
        let after_start = h.notifications();
        h.power(100, 20.0);
        h.advance(120);
        assert_eq!(h.notifications(), after_start + 1);

        h.power(700, 5.0);
        h.advance(1_120);
        let after_finish = h.notifications();
        h.advance(1_180);
        assert_eq!(h.notifications(), after_finish + 1);

        h.door(1_190, true);
        let after_door = h.notifications();
        h.advance(1_500);
        assert_eq!(h.notifications(), after_door);
    }

    #[test]
    fn tick_keeps_refreshing_when_door_opened_before_finish() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.engine.seed_door(true, at(-100));
        h.door(-50, false);
        h.running_at_90();
        h.power(700, 5.0);
        h.advance(1_120);

        let before = h.notifications();
        h.advance(1_200);
        assert_eq!(h.notifications(), before + 1);
        assert_eq!(h.engine.seconds_since_finished(at(1_200)), 80.0);
    }

    #[test]
    fn late_advance_collapses_missed_ticks() {
        let mut h = Harness::washer();
        h.running_at_90();
        let before = h.notifications();

        h.advance(90 + 6_000);

        assert_eq!(h.notifications(), before + 1);
        assert_eq!(h.engine.next_deadline(), Some(at(6_120)));
    }

    #[test]
    fn reset_clears_finished_at() {
        let mut h = Harness::washer();
        h.running_at_90();
        h.power(700, 5.0);
        h.advance(1_300);

        assert_eq!(h.state(), ApplianceState::Idle);
        assert_eq!(h.engine.record().finished_at, None);
        assert_eq!(h.engine.seconds_since_finished(at(1_400)), 0.0);
    }

    #[test]
    fn next_run_clears_previous_finish_and_keeps_last_runtime() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.running_at_90();
        h.power(700, 5.0);
        h.advance(1_120);
        h.door(1_200, true);
        h.door(1_210, false);

        h.power(2_000, 20.0);
        h.advance(2_090);
        assert_eq!(h.state(), ApplianceState::Running);
        assert_eq!(h.engine.record().finished_at, None);
        assert_eq!(h.engine.record().last_runtime_seconds, Some(1_030.0));
    }

    #[test]
    fn shutdown_cancels_everything() {
        let mut h = Harness::washer();
        h.power(0, 20.0);
        assert!(h.engine.next_deadline().is_some());

        h.engine.shutdown();
        assert_eq!(h.engine.next_deadline(), None);
        h.advance(10_000);
        assert_eq!(h.state(), ApplianceState::Idle);
        assert_eq!(h.notifications(), 0);
    }

    #[test]
    fn status_reflects_running_cycle() {
        let mut h = Harness::washer();
        h.running_at_90();

        let status = h.engine.status(at(90 + 3_725));
        assert_eq!(
            status,
            ApplianceStatus {
                id: "washer-1".to_string(),
                name: "Washer".to_string(),
                appliance_type: ApplianceType::Washer,
                state: ApplianceState::Running,
                running: true,
                label: "1h 02m".to_string(),
                started_at: Some(at(90)),
                finished_at: None,
                run_time_seconds: 3_725,
                last_runtime_seconds: None,
                door_open: None,
                door_last_opened_at: None,
                seconds_since_finished: 0,
            }
        );
        assert_eq!(h.engine.label(at(90 + 125)), "2m");
    }

    #[test]
    fn label_prefers_open_door() {
        let mut h = Harness::new(ApplianceType::Washer.default_profile(), true);
        h.door(5, true);
        assert_eq!(h.engine.label(at(6)), "Open");
        h.door(6, false);
        assert_eq!(h.engine.label(at(7)), "Idle");
    }

    #[test]
    fn profile_update_applies_to_new_timers() {
        let mut h = Harness::washer();
        h.power(0, 20.0);
        h.engine.update_profile(CycleProfile {
            delay_on: 10,
            ..ApplianceType::Washer.default_profile()
        });

        assert_eq!(h.engine.timer_due_at(TimerSlot::StartConfirm), Some(at(90)));
        h.power(1, 1.0);
        h.advance(90);
        assert_eq!(h.state(), ApplianceState::Idle);

        h.power(200, 20.0);
        assert_eq!(h.engine.timer_due_at(TimerSlot::StartConfirm), Some(at(210)));
    }
}

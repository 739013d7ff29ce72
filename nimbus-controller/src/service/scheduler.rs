//! Recurring Scheduler
//!
//! Every schedule installs one start trigger and one stop trigger keyed by
//! `(instance_id, direction)`. A dispatcher loop evaluates due triggers on a
//! fixed tick and hands them to the lifecycle controller.
//!
//! Firing rules:
//! - a trigger due within the grace window fires once, however many
//!   occurrences were missed
//! - a trigger overdue beyond the grace window is skipped until tomorrow
//! - a trigger whose previous fire is still executing is suppressed, not queued
//!
//! Times of day are local to one operating timezone. A local time skipped by
//! a DST jump resolves to the first valid instant after it; a repeated local
//! time resolves to its first occurrence.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use nimbus_core::domain::schedule::{Schedule, TimeOfDay};
use nimbus_core::domain::task::TaskId;
use nimbus_core::dto::schedule::{Direction, ScheduleView, TriggerInfo};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{ControlError, Result};
use crate::oplog::OperationLog;
use crate::registry::InstanceRegistry;
use crate::service::lifecycle::LifecycleController;
use crate::snapshot::SnapshotWriter;

/// Longest DST gap searched when resolving a skipped local time
const MAX_GAP_MINUTES: i64 = 180;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub timezone: Tz,
    /// Dispatcher loop period
    pub tick: Duration,
    /// How late a trigger may still fire
    pub grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerKey {
    pub instance_id: String,
    pub direction: Direction,
}

/// What happened to a due trigger on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Dispatched,
    /// Previous fire of the same trigger still executing
    Suppressed,
    /// Overdue beyond the grace window
    Missed,
}

struct Trigger {
    at: TimeOfDay,
    next_fire: DateTime<Utc>,
    executing: Arc<AtomicBool>,
}

#[derive(Default)]
struct SchedulerState {
    schedules: BTreeMap<String, Schedule>,
    triggers: BTreeMap<TriggerKey, Trigger>,
}

/// Clears a trigger's executing flag when the fire is over
struct ExecutingGuard(Arc<AtomicBool>);

impl ExecutingGuard {
    /// Marks the trigger executing, or `None` if it already is
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Instant of local time `at` on `date` in `tz`
pub fn resolve_local(tz: Tz, date: NaiveDate, at: TimeOfDay) -> DateTime<Utc> {
    let naive = date.and_time(at.to_naive_time());
    if let Some(local) = tz.from_local_datetime(&naive).earliest() {
        return local.with_timezone(&Utc);
    }

    // Skipped by a DST jump
    for minutes in 1..=MAX_GAP_MINUTES {
        let probe = naive + TimeDelta::minutes(minutes);
        if let Some(local) = tz.from_local_datetime(&probe).earliest() {
            return local.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&naive)
}

/// First occurrence of `at` strictly after `after`
pub fn next_occurrence(tz: Tz, at: TimeOfDay, after: DateTime<Utc>) -> DateTime<Utc> {
    let today = after.with_timezone(&tz).date_naive();
    (-1..=2)
        .map(|offset| resolve_local(tz, today + TimeDelta::days(offset), at))
        .find(|candidate| *candidate > after)
        .unwrap_or_else(|| resolve_local(tz, today + TimeDelta::days(3), at))
}

/// Latest occurrence of `at` at or before `now`
pub fn previous_occurrence(tz: Tz, at: TimeOfDay, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    (-2..=1)
        .rev()
        .map(|offset| resolve_local(tz, today + TimeDelta::days(offset), at))
        .find(|candidate| *candidate <= now)
        .unwrap_or_else(|| resolve_local(tz, today - TimeDelta::days(3), at))
}

pub struct Scheduler {
    lifecycle: Arc<LifecycleController>,
    registry: Arc<InstanceRegistry>,
    oplog: Arc<OperationLog>,
    snapshots: Arc<SnapshotWriter>,
    settings: SchedulerSettings,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        lifecycle: Arc<LifecycleController>,
        registry: Arc<InstanceRegistry>,
        oplog: Arc<OperationLog>,
        snapshots: Arc<SnapshotWriter>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            lifecycle,
            registry,
            oplog,
            snapshots,
            settings,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.settings.timezone
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn grace(&self) -> TimeDelta {
        TimeDelta::from_std(self.settings.grace).unwrap_or(TimeDelta::MAX)
    }

    /// Most recent occurrence if still within the grace window, else the next one
    fn initial_fire(&self, at: TimeOfDay, now: DateTime<Utc>) -> DateTime<Utc> {
        let tz = self.settings.timezone;
        let previous = previous_occurrence(tz, at, now);
        if now - previous <= self.grace() {
            previous
        } else {
            next_occurrence(tz, at, now)
        }
    }

    /// Replaces both triggers of the schedule's instance
    fn install(&self, state: &mut SchedulerState, schedule: Schedule, now: DateTime<Utc>) {
        let id = schedule.instance_id.clone();
        for (direction, at) in [
            (Direction::Start, schedule.start_time),
            (Direction::Stop, schedule.end_time),
        ] {
            let key = TriggerKey {
                instance_id: id.clone(),
                direction,
            };
            // An in-flight fire of the old trigger still counts as executing
            let executing = state
                .triggers
                .remove(&key)
                .map(|t| t.executing)
                .unwrap_or_default();
            let next_fire = self.initial_fire(at, now);
            debug!("Trigger {} {} at {} next fires {}", direction, id, at, next_fire);
            state.triggers.insert(
                key,
                Trigger {
                    at,
                    next_fire,
                    executing,
                },
            );
        }
        state.schedules.insert(id, schedule);
    }

    /// Validates and installs a daily schedule, replacing any previous one
    pub async fn set_schedule(
        &self,
        id: &str,
        start_time: &str,
        duration_minutes: i64,
    ) -> Result<Schedule> {
        self.set_schedule_at(id, start_time, duration_minutes, Utc::now())
            .await
    }

    pub(crate) async fn set_schedule_at(
        &self,
        id: &str,
        start_time: &str,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Schedule> {
        if !self.registry.contains(id) {
            return Err(ControlError::NotFound(id.to_string()));
        }
        let schedule = Schedule::parse(id, start_time, duration_minutes)?;

        self.commit_schedule(schedule.clone(), now)?;

        self.oplog.info(format!(
            "Schedule set for instance {}: start {} stop {} ({})",
            id, schedule.start_time, schedule.end_time, self.settings.timezone
        ));
        self.snapshots.persist().await;
        Ok(schedule)
    }

    /// Installs the triggers and records the schedule on the instance.
    /// Nothing stays installed if the instance vanished in between.
    pub(crate) fn commit_schedule(&self, schedule: Schedule, now: DateTime<Utc>) -> Result<()> {
        let id = schedule.instance_id.clone();
        self.install(&mut self.state(), schedule.clone(), now);
        if let Err(e) = self.registry.set_schedule(&id, Some(schedule)) {
            self.forget(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Removes both triggers and the instance's schedule
    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(ControlError::NotFound(id.to_string()));
        }
        if self.forget(id).is_none() {
            return Err(ControlError::NoSchedule(id.to_string()));
        }
        self.registry.set_schedule(id, None)?;

        self.oplog
            .info(format!("Schedule removed for instance {}", id));
        self.snapshots.persist().await;
        Ok(())
    }

    /// Drops the schedule and triggers of `id` without touching the registry
    pub fn forget(&self, id: &str) -> Option<Schedule> {
        let mut state = self.state();
        state.triggers.retain(|key, _| key.instance_id != id);
        state.schedules.remove(id)
    }

    /// Reinstalls restored schedules without saving
    pub fn restore(&self, schedules: Vec<Schedule>) -> usize {
        self.restore_at(schedules, Utc::now())
    }

    pub(crate) fn restore_at(&self, schedules: Vec<Schedule>, now: DateTime<Utc>) -> usize {
        let mut state = self.state();
        let mut restored = 0;
        for schedule in schedules {
            if !self.registry.contains(&schedule.instance_id) {
                self.oplog.warn(format!(
                    "Ignoring restored schedule for unknown instance {}",
                    schedule.instance_id
                ));
                continue;
            }
            self.install(&mut state, schedule, now);
            restored += 1;
        }
        restored
    }

    pub fn get_schedule(&self, id: &str) -> Option<Schedule> {
        self.state().schedules.get(id).cloned()
    }

    /// Evaluates due triggers at `now` and advances them past `now`
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<(TriggerKey, FireOutcome)> {
        let grace = self.grace();
        let tz = self.settings.timezone;
        let mut due = Vec::new();

        {
            let mut state = self.state();
            for (key, trigger) in state.triggers.iter_mut() {
                if trigger.next_fire > now {
                    continue;
                }
                let scheduled = trigger.next_fire;
                let fire = if now - scheduled > grace {
                    Err(FireOutcome::Missed)
                } else {
                    ExecutingGuard::acquire(&trigger.executing).ok_or(FireOutcome::Suppressed)
                };
                trigger.next_fire = next_occurrence(tz, trigger.at, now);
                due.push((key.clone(), scheduled, trigger.next_fire, fire));
            }
        }

        let mut outcomes = Vec::with_capacity(due.len());
        for (key, scheduled, next_fire, fire) in due {
            let outcome = match fire {
                Ok(guard) => {
                    // Failures are logged by dispatch; the trigger stays installed
                    let _ = self.dispatch(&key, guard, "Scheduled");
                    FireOutcome::Dispatched
                }
                Err(FireOutcome::Suppressed) => {
                    self.oplog.warn(format!(
                        "Skipped scheduled {} of instance {}: previous run still in progress",
                        key.direction, key.instance_id
                    ));
                    FireOutcome::Suppressed
                }
                Err(outcome) => {
                    self.oplog.warn(format!(
                        "Missed scheduled {} of instance {} due at {}, next run at {}",
                        key.direction, key.instance_id, scheduled, next_fire
                    ));
                    outcome
                }
            };
            outcomes.push((key, outcome));
        }
        outcomes
    }

    /// Hands a fire to the lifecycle controller and holds the guard until it completes
    fn dispatch(&self, key: &TriggerKey, guard: ExecutingGuard, origin: &str) -> Result<TaskId> {
        let id = &key.instance_id;
        let handle = match key.direction {
            Direction::Start => self.lifecycle.start(id),
            Direction::Stop => self.lifecycle.stop(id),
        };
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.oplog.error(format!(
                    "{} {} of instance {} failed: {}",
                    origin, key.direction, id, e
                ));
                return Err(e);
            }
        };

        let task_id = handle.id;
        self.oplog.info(format!(
            "{} {} of instance {} dispatched as task {}",
            origin, key.direction, id, task_id
        ));

        let oplog = Arc::clone(&self.oplog);
        let key = key.clone();
        let origin = origin.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = handle.wait().await {
                oplog.error(format!(
                    "{} {} of instance {} failed: {}",
                    origin, key.direction, key.instance_id, e
                ));
            }
        });

        Ok(task_id)
    }

    /// Fires the start trigger of `id` immediately
    pub fn run_now(&self, id: &str) -> Result<TaskId> {
        if !self.registry.contains(id) {
            return Err(ControlError::NotFound(id.to_string()));
        }

        let key = TriggerKey {
            instance_id: id.to_string(),
            direction: Direction::Start,
        };
        let guard = {
            let state = self.state();
            let trigger = state
                .triggers
                .get(&key)
                .ok_or_else(|| ControlError::NoSchedule(id.to_string()))?;
            ExecutingGuard::acquire(&trigger.executing).ok_or_else(|| {
                ControlError::Busy(format!(
                    "scheduled start of instance {} is still running",
                    id
                ))
            })?
        };

        self.dispatch(&key, guard, "Manual")
    }

    /// Schedules with their next start and stop instants
    pub fn list_schedules(&self) -> Vec<ScheduleView> {
        let state = self.state();
        let next = |id: &str, direction| {
            state
                .triggers
                .get(&TriggerKey {
                    instance_id: id.to_string(),
                    direction,
                })
                .map(|t| t.next_fire)
        };

        state
            .schedules
            .values()
            .map(|schedule| ScheduleView {
                schedule: schedule.clone(),
                timezone: self.settings.timezone.name().to_string(),
                next_start: next(&schedule.instance_id, Direction::Start),
                next_stop: next(&schedule.instance_id, Direction::Stop),
            })
            .collect()
    }

    /// Every installed trigger, ordered by instance and direction
    pub fn list_triggers(&self) -> Vec<TriggerInfo> {
        self.state()
            .triggers
            .iter()
            .map(|(key, trigger)| TriggerInfo {
                instance_id: key.instance_id.clone(),
                direction: key.direction,
                at: trigger.at,
                next_fire: trigger.next_fire,
                executing: trigger.executing.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Dispatcher loop; never returns
    pub async fn run(self: Arc<Self>) {
        info!(
            "Starting scheduler (tick: {:?}, grace: {:?}, timezone: {})",
            self.settings.tick, self.settings.grace, self.settings.timezone
        );

        let mut interval = time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let outcomes = self.tick_at(Utc::now());
            if !outcomes.is_empty() {
                debug!("Scheduler tick evaluated {} trigger(s)", outcomes.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RemoteState;
    use crate::testing::Harness;
    use nimbus_core::domain::instance::InstanceStatus;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn time(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    fn scheduler(h: &Harness, timezone: Tz) -> Scheduler {
        Scheduler::new(
            h.lifecycle.clone(),
            h.registry.clone(),
            h.oplog.clone(),
            h.snapshots.clone(),
            SchedulerSettings {
                timezone,
                tick: Duration::from_secs(15),
                grace: Duration::from_secs(300),
            },
        )
    }

    fn triggers_for(s: &Scheduler, id: &str) -> Vec<TriggerInfo> {
        s.list_triggers()
            .into_iter()
            .filter(|t| t.instance_id == id)
            .collect()
    }

    async fn wait_idle(s: &Scheduler) {
        for _ in 0..200 {
            if s.list_triggers().iter().all(|t| !t.executing) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("trigger still executing");
    }

    #[test]
    fn test_next_and_previous_occurrence_utc() {
        let now = at("2026-03-10T08:00:00Z");
        assert_eq!(
            next_occurrence(Tz::UTC, time("09:00"), now),
            at("2026-03-10T09:00:00Z")
        );
        assert_eq!(
            next_occurrence(Tz::UTC, time("07:00"), now),
            at("2026-03-11T07:00:00Z")
        );
        assert_eq!(
            next_occurrence(Tz::UTC, time("08:00"), now),
            at("2026-03-11T08:00:00Z")
        );
        assert_eq!(
            previous_occurrence(Tz::UTC, time("08:00"), now),
            at("2026-03-10T08:00:00Z")
        );
        assert_eq!(
            previous_occurrence(Tz::UTC, time("09:00"), now),
            at("2026-03-09T09:00:00Z")
        );
    }

    #[test]
    fn test_local_time_in_timezone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // EST is UTC-5 in January
        assert_eq!(
            next_occurrence(tz, time("09:00"), at("2026-01-15T12:00:00Z")),
            at("2026-01-15T14:00:00Z")
        );
    }

    #[test]
    fn test_dst_gap_resolves_to_first_valid_instant() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 29).unwrap();
        // 02:30 does not exist; clocks jump to 03:00 CEST
        assert_eq!(
            resolve_local(tz, date, time("02:30")),
            at("2026-03-29T01:00:00Z")
        );
    }

    #[test]
    fn test_dst_overlap_resolves_to_first_occurrence() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        assert_eq!(
            resolve_local(tz, date, time("02:30")),
            at("2026-10-25T00:30:00Z")
        );
    }

    #[tokio::test]
    async fn test_set_schedule_twice_keeps_one_pair() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);
        let now = at("2026-03-10T06:00:00Z");

        s.set_schedule_at("i-1", "09:00", 60, now).await.unwrap();
        s.set_schedule_at("i-1", "18:30", 90, now).await.unwrap();

        let triggers = triggers_for(&s, "i-1");
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].direction, Direction::Start);
        assert_eq!(triggers[0].at, time("18:30"));
        assert_eq!(triggers[1].direction, Direction::Stop);
        assert_eq!(triggers[1].at, time("20:00"));

        let schedules = s.list_schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].next_start, Some(at("2026-03-10T18:30:00Z")));
        assert_eq!(schedules[0].next_stop, Some(at("2026-03-10T20:00:00Z")));
        assert_eq!(schedules[0].timezone, "UTC");

        let stored = h.registry.get("i-1").unwrap().schedule.unwrap();
        assert_eq!(stored.start_time, time("18:30"));
    }

    #[tokio::test]
    async fn test_set_schedule_validation() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);

        assert!(matches!(
            s.set_schedule("i-missing", "09:00", 60).await,
            Err(ControlError::NotFound(_))
        ));
        assert!(matches!(
            s.set_schedule("i-1", "9am", 60).await,
            Err(ControlError::Validation(_))
        ));
        assert!(matches!(
            s.set_schedule("i-1", "09:00", 0).await,
            Err(ControlError::Validation(_))
        ));
        assert!(s.list_triggers().is_empty());
    }

    #[tokio::test]
    async fn test_remove_schedule() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);

        s.set_schedule("i-1", "09:00", 60).await.unwrap();
        s.remove_schedule("i-1").await.unwrap();

        assert!(s.list_schedules().is_empty());
        assert!(s.list_triggers().is_empty());
        assert!(h.registry.get("i-1").unwrap().schedule.is_none());
        assert!(matches!(
            s.remove_schedule("i-1").await,
            Err(ControlError::NoSchedule(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_for_removed_instance_leaves_no_triggers() {
        let h = Harness::new();
        let s = scheduler(&h, Tz::UTC);
        let schedule = Schedule::parse("i-gone", "09:00", 60).unwrap();

        assert!(matches!(
            s.commit_schedule(schedule, at("2024-03-01T08:00:00Z")),
            Err(ControlError::NotFound(_))
        ));
        assert!(s.list_triggers().is_empty());
        assert!(s.list_schedules().is_empty());
        assert!(s.get_schedule("i-gone").is_none());
    }

    #[tokio::test]
    async fn test_grace_window_catch_up() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);
        let now = at("2026-03-10T09:03:00Z");

        s.set_schedule_at("i-1", "09:00", 60, now).await.unwrap();
        assert_eq!(
            s.list_schedules()[0].next_start,
            Some(at("2026-03-10T09:00:00Z"))
        );

        let outcomes = s.tick_at(now);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0.direction, Direction::Start);
        assert_eq!(outcomes[0].1, FireOutcome::Dispatched);
        assert_eq!(
            s.list_schedules()[0].next_start,
            Some(at("2026-03-11T09:00:00Z"))
        );

        wait_idle(&s).await;
        assert_eq!(h.registry.get("i-1").unwrap().status, InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_outside_grace_waits_for_tomorrow() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);
        let now = at("2026-03-10T09:10:00Z");

        s.set_schedule_at("i-1", "09:00", 60, now).await.unwrap();
        assert!(s.tick_at(now).is_empty());
        assert_eq!(
            s.list_schedules()[0].next_start,
            Some(at("2026-03-11T09:00:00Z"))
        );
    }

    #[tokio::test]
    async fn test_missed_occurrences_coalesce() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);

        s.set_schedule_at("i-1", "09:00", 60, at("2026-03-10T06:00:00Z"))
            .await
            .unwrap();

        // Three days of downtime: one evaluation per trigger, not one per day
        let later = at("2026-03-13T12:00:00Z");
        let outcomes = s.tick_at(later);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, o)| *o == FireOutcome::Missed));
        assert!(s.tick_at(later).is_empty());

        let view = &s.list_schedules()[0];
        assert_eq!(view.next_start, Some(at("2026-03-14T09:00:00Z")));
        assert_eq!(view.next_stop, Some(at("2026-03-14T10:00:00Z")));
        assert_eq!(h.provider.start_calls(), 0);
        assert!(h.log_contains("Missed scheduled start of instance i-1"));
    }

    #[tokio::test]
    async fn test_overlapping_fire_is_suppressed() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        h.provider.hold_starts();
        let s = scheduler(&h, Tz::UTC);

        s.set_schedule_at("i-1", "09:00", 600, at("2026-03-10T06:00:00Z"))
            .await
            .unwrap();

        let first = s.tick_at(at("2026-03-10T09:00:30Z"));
        assert_eq!(first[0].1, FireOutcome::Dispatched);

        // Next day, the start is still blocked; yesterday's stop is long overdue
        let second = s.tick_at(at("2026-03-11T09:01:00Z"));
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].0.direction, Direction::Start);
        assert_eq!(second[0].1, FireOutcome::Suppressed);
        assert_eq!(second[1].1, FireOutcome::Missed);
        assert!(matches!(s.run_now("i-1"), Err(ControlError::Busy(_))));

        h.provider.release_starts(1);
        wait_idle(&s).await;
        assert_eq!(h.provider.start_calls(), 1);
        assert_eq!(h.registry.get("i-1").unwrap().status, InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_failed_fire_keeps_trigger() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        h.provider.fail_starts(true);
        let s = scheduler(&h, Tz::UTC);

        s.set_schedule_at("i-1", "09:00", 60, at("2026-03-10T06:00:00Z"))
            .await
            .unwrap();
        s.tick_at(at("2026-03-10T09:00:00Z"));
        wait_idle(&s).await;

        assert!(h.log_contains("Scheduled start of instance i-1 failed"));
        assert_eq!(triggers_for(&s, "i-1").len(), 2);
        assert_eq!(
            s.list_schedules()[0].next_start,
            Some(at("2026-03-11T09:00:00Z"))
        );
    }

    #[tokio::test]
    async fn test_run_now() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        h.track("i-2", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);

        assert!(matches!(s.run_now("i-missing"), Err(ControlError::NotFound(_))));
        assert!(matches!(s.run_now("i-2"), Err(ControlError::NoSchedule(_))));

        s.set_schedule("i-1", "09:00", 60).await.unwrap();
        s.run_now("i-1").unwrap();
        wait_idle(&s).await;

        assert_eq!(h.provider.start_calls(), 1);
        assert_eq!(h.registry.get("i-1").unwrap().status, InstanceStatus::Running);
        assert!(h.log_contains("Manual start of instance i-1 dispatched"));
    }

    #[tokio::test]
    async fn test_restore_skips_unknown_instances() {
        let h = Harness::new();
        h.track("i-1", RemoteState::Stopped).await;
        let s = scheduler(&h, Tz::UTC);

        let restored = s.restore(vec![
            Schedule::parse("i-1", "09:00", 60).unwrap(),
            Schedule::parse("i-gone", "10:00", 60).unwrap(),
        ]);

        assert_eq!(restored, 1);
        assert_eq!(s.list_triggers().len(), 2);
        assert_eq!(h.store.save_count(), 1);
    }
}

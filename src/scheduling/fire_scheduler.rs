use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    reminder::{Reminder, ReminderFireTime, ReminderId},
    storage::{ReminderStorage, StorageError, UpdateReminder},
};

use super::{Clock, LocalClock, ReminderDeliveryChannel, ReminderNotification};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const ACCELERATED_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Firing compares whole minutes, so a slower poll can step over a reminder's minute.
const MAX_RELIABLE_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Reminders marked as fired during this cycle.
    pub fired: Vec<ReminderId>,
    /// Fired reminders whose notification could not be delivered.
    pub undelivered: Vec<ReminderId>,
    /// Due reminders whose fired mark could not be persisted.
    pub failed: Vec<ReminderId>,
}

enum FireOutcome {
    Delivered,
    Undelivered,
    Vanished,
    Failed,
}

struct ReminderPoller {
    storage: Arc<dyn ReminderStorage>,
    delivery: Arc<dyn ReminderDeliveryChannel>,
    clock: Arc<dyn Clock>,
    cycle: Mutex<()>,
}

impl ReminderPoller {
    async fn poll(&self) -> PollReport {
        let _cycle = self.cycle.lock().await;

        let now = self.clock.now();
        let today = now.date();
        let mut report = PollReport::default();

        for reminder in self.storage.get_all().await {
            let Some(fire_time) = due_fire_time(&reminder, now) else {
                continue;
            };

            match self.fire(&reminder, fire_time, today).await {
                FireOutcome::Delivered => report.fired.push(reminder.id),
                FireOutcome::Undelivered => {
                    report.fired.push(reminder.id);
                    report.undelivered.push(reminder.id);
                }
                FireOutcome::Vanished => {}
                FireOutcome::Failed => report.failed.push(reminder.id),
            }
        }

        let status = format!("Last checked at {}", now.format("%H:%M"));
        if let Err(err) = self.delivery.report_status(&status).await {
            log::warn!("Unable to report scheduler status. [error = {err:#}]");
        }

        report
    }

    /// Persists the fired mark first; the notification is only sent once the mark is
    /// durable.
    async fn fire(
        &self,
        reminder: &Reminder,
        fire_time: ReminderFireTime,
        today: NaiveDate,
    ) -> FireOutcome {
        let id = reminder.id;
        let mark = UpdateReminder::new(id).last_fired_on(Some(today));

        let fired = match self.storage.update(mark).await {
            Ok(fired) => fired,
            Err(StorageError::NotFound(_)) => {
                log::info!("[FIRE] Reminder was removed before it could fire. ReminderId {id}");
                return FireOutcome::Vanished;
            }
            Err(err) => {
                log::error!(
                    "[FIRE] Unable to mark reminder as fired, it may fire again. [reminder_id = {id}, error = {err}]"
                );
                return FireOutcome::Failed;
            }
        };

        log::info!("[FIRE] Firing reminder at {fire_time}. ReminderId {id}");

        let notification = ReminderNotification::fired(&fired, fire_time);
        match self.delivery.notify(&notification).await {
            Ok(()) => FireOutcome::Delivered,
            Err(err) => {
                log::warn!(
                    "[FIRE] Notification delivery failed. [reminder_id = {id}, error = {err:#}]"
                );
                FireOutcome::Undelivered
            }
        }
    }
}

/// Returns the fire time when `reminder` should fire at `now`.
fn due_fire_time(reminder: &Reminder, now: NaiveDateTime) -> Option<ReminderFireTime> {
    if !reminder.active {
        return None;
    }

    let fire_time = match reminder.fire_time() {
        Ok(fire_time) => fire_time,
        Err(err) => {
            log::warn!(
                "Skipping reminder with malformed time of day. [reminder_id = {}, error = {err}]",
                reminder.id
            );
            return None;
        }
    };

    if reminder.fired_on(now.date()) || !fire_time.matches(&now.time()) {
        return None;
    }

    Some(fire_time)
}

/// Periodically fires due reminders, each at most once per calendar day.
///
/// Moves through `Idle -> Running -> Stopped`. Stopping is cooperative: a cycle that
/// is already running finishes before the loop exits.
pub struct FireScheduler {
    poller: Arc<ReminderPoller>,
    interval: Duration,
    accelerated: Arc<AtomicBool>,
    state: SchedulerState,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FireScheduler {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        delivery: Arc<dyn ReminderDeliveryChannel>,
    ) -> Self {
        Self::with_clock(storage, delivery, Arc::new(LocalClock))
    }

    /// Same as [`FireScheduler::new`], reading wall-clock time from `clock`.
    pub fn with_clock(
        storage: Arc<dyn ReminderStorage>,
        delivery: Arc<dyn ReminderDeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            poller: Arc::new(ReminderPoller {
                storage,
                delivery,
                clock,
                cycle: Mutex::new(()),
            }),
            interval: DEFAULT_POLL_INTERVAL,
            accelerated: Arc::new(AtomicBool::new(false)),
            state: SchedulerState::Idle,
            cancellation_token: CancellationToken::new(),
            task: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval > MAX_RELIABLE_POLL_INTERVAL {
            log::warn!(
                "Poll interval of {interval:?} is longer than a minute, reminders can be missed"
            );
        }
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Switches between the configured interval and the one second demo cadence.
    /// Applies from the next sleep on, also while running.
    pub fn set_accelerated(&self, accelerated: bool) {
        self.accelerated.store(accelerated, Ordering::Relaxed);
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated.load(Ordering::Relaxed)
    }

    /// Runs a single poll cycle right away. Never overlaps with a cycle of the loop.
    pub async fn poll_once(&self) -> PollReport {
        self.poller.poll().await
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.state != SchedulerState::Idle {
            anyhow::bail!("Scheduler can only be started once. [state = {:?}]", self.state);
        }

        let poller = Arc::clone(&self.poller);
        let accelerated = Arc::clone(&self.accelerated);
        let interval = self.interval;
        let cancellation_token = self.cancellation_token.child_token();

        self.task = Some(tokio::spawn(async move {
            run_poll_loop(poller, interval, accelerated, cancellation_token).await;
        }));
        self.state = SchedulerState::Running;

        Ok(())
    }

    /// Signals the loop and waits for it to exit.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        self.cancellation_token.cancel();
        self.state = SchedulerState::Stopped;

        if let Some(task) = self.task.take() {
            task.await.context("Scheduler loop terminated abnormally")?;
        }

        Ok(())
    }
}

impl Drop for FireScheduler {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

async fn run_poll_loop(
    poller: Arc<ReminderPoller>,
    interval: Duration,
    accelerated: Arc<AtomicBool>,
    cancellation_token: CancellationToken,
) {
    log::info!("[SCHEDULER] Poll loop started. [interval = {interval:?}]");

    while !cancellation_token.is_cancelled() {
        let report = poller.poll().await;
        if !report.fired.is_empty() || !report.failed.is_empty() {
            log::debug!("[SCHEDULER] Cycle finished. [report = {report:?}]");
        }

        let delay = if accelerated.load(Ordering::Relaxed) {
            ACCELERATED_POLL_INTERVAL
        } else {
            interval
        };

        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    log::info!("[SCHEDULER] Poll loop stopped");
}

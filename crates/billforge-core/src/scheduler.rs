//! Task scheduler (§4.7): daily and interval jobs with real cancellation.
//!
//! Each scheduled task owns a `tokio::task::JoinHandle`, retained so
//! `cancel()` can abort an in-flight run rather than merely stop scheduling
//! future ones. The driver polls at sub-second granularity, applies a
//! per-run timeout, and never starts a new run of a task while the previous
//! one is still in flight.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Error;

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);
const TASK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Scheduled,
    Running,
    Cancelled,
}

enum Schedule {
    Daily { hour: u32, minute: u32 },
    Interval { period: Duration },
}

struct ScheduledTask {
    task: TaskFn,
    schedule: Schedule,
    next_run: DateTime<Utc>,
    running_handle: Option<JoinHandle<()>>,
    status: TaskStatus,
}

/// A lightweight cooperative scheduler: one `driver()` future polls a table
/// of tasks and spawns each one's run when due. There is no background
/// thread implicitly started — the caller drives it by awaiting `driver()`,
/// typically inside its own `tokio::spawn`.
pub struct TaskScheduler {
    clock: Arc<dyn Clock>,
    tasks: Mutex<HashMap<Uuid, ScheduledTask>>,
}

impl TaskScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, tasks: Mutex::new(HashMap::new()) }
    }

    /// Schedules `task` to run once a day at `hour:minute` (UTC). Returns a
    /// task id usable with `cancel`/`status`.
    pub async fn schedule_daily(&self, task: TaskFn, hour: u32, minute: u32) -> Result<Uuid, Error> {
        if hour > 23 || minute > 59 {
            return Err(Error::invalid_input("hour must be 0..=23 and minute 0..=59"));
        }
        let now = self.clock.now();
        let next_run = next_daily_occurrence(now, hour, minute);
        let id = Uuid::new_v4();
        self.tasks.lock().await.insert(
            id,
            ScheduledTask {
                task,
                schedule: Schedule::Daily { hour, minute },
                next_run,
                running_handle: None,
                status: TaskStatus::Scheduled,
            },
        );
        Ok(id)
    }

    /// Schedules `task` to run every `period`, starting one period from now.
    pub async fn schedule_interval(&self, task: TaskFn, period: Duration) -> Result<Uuid, Error> {
        if period <= Duration::zero() {
            return Err(Error::invalid_input("interval period must be positive"));
        }
        let now = self.clock.now();
        let id = Uuid::new_v4();
        self.tasks.lock().await.insert(
            id,
            ScheduledTask {
                task,
                schedule: Schedule::Interval { period },
                next_run: now + period,
                running_handle: None,
                status: TaskStatus::Scheduled,
            },
        );
        Ok(id)
    }

    /// Marks the task cancelled and aborts its in-flight run, if any.
    pub async fn cancel(&self, task_id: Uuid) -> Result<(), Error> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or_else(|| Error::not_found(format!("task {} not found", task_id)))?;
        if let Some(handle) = entry.running_handle.take() {
            handle.abort();
        }
        entry.status = TaskStatus::Cancelled;
        Ok(())
    }

    pub async fn status(&self, task_id: Uuid) -> Result<TaskStatus, Error> {
        let tasks = self.tasks.lock().await;
        tasks.get(&task_id).map(|t| t.status).ok_or_else(|| Error::not_found(format!("task {} not found", task_id)))
    }

    /// Polls the task table at `POLL_INTERVAL` and spawns each due task's
    /// run under a `TASK_TIMEOUT` guard. Runs until the caller drops the
    /// returned future (e.g. by aborting the `tokio::spawn` that drives it).
    pub async fn driver(self: Arc<Self>) {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let now = self.clock.now();
            let due_ids: Vec<Uuid> = {
                let tasks = self.tasks.lock().await;
                tasks
                    .iter()
                    .filter(|(_, t)| t.status != TaskStatus::Cancelled && t.next_run <= now && t.running_handle.is_none())
                    .map(|(id, _)| *id)
                    .collect()
            };
            for id in due_ids {
                self.clone().spawn_run(id, now).await;
            }
        }
    }

    /// Spawns one run of `task_id` and, once it completes (successfully,
    /// with an error, or on timeout), writes the task's `status`/
    /// `running_handle` back to `Scheduled`/`None` so the next `driver()`
    /// tick can select it as due again. A task left `Cancelled` by a
    /// concurrent `cancel()` call is not reset back to `Scheduled`.
    async fn spawn_run(self: Arc<Self>, task_id: Uuid, now: DateTime<Utc>) {
        let task = {
            let mut tasks = self.tasks.lock().await;
            let Some(entry) = tasks.get_mut(&task_id) else { return };
            let task = entry.task.clone();
            entry.next_run = match entry.schedule {
                Schedule::Daily { hour, minute } => next_daily_occurrence(now, hour, minute),
                Schedule::Interval { period } => now + period,
            };
            entry.status = TaskStatus::Running;
            task
        };
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(TASK_TIMEOUT, task()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(task_id = %task_id, error = %err, "scheduled task failed"),
                Err(_) => warn!(task_id = %task_id, "scheduled task timed out"),
            }
            let mut tasks = scheduler.tasks.lock().await;
            if let Some(entry) = tasks.get_mut(&task_id) {
                if entry.status != TaskStatus::Cancelled {
                    entry.status = TaskStatus::Scheduled;
                }
                entry.running_handle = None;
            }
        });
        if let Some(entry) = self.tasks.lock().await.get_mut(&task_id) {
            entry.running_handle = Some(handle);
        }
    }
}

fn next_daily_occurrence(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let today = now.date_naive().and_hms_opt(hour, minute, 0).expect("validated hour/minute").and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_task(counter: Arc<AtomicU32>) -> TaskFn {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn interval_task_runs_once_reached() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = Arc::new(TaskScheduler::new(clock.clone() as Arc<dyn Clock>));
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.schedule_interval(counting_task(counter.clone()), Duration::seconds(10)).await.unwrap();

        clock.advance(Duration::seconds(11));
        let now = clock.now();
        let due_ids: Vec<Uuid> = {
            let tasks = scheduler.tasks.lock().await;
            tasks.iter().filter(|(_, t)| t.next_run <= now).map(|(id, _)| *id).collect()
        };
        for id in due_ids {
            scheduler.clone().spawn_run(id, now).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completed_run_is_rescheduled_and_fires_again() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = Arc::new(TaskScheduler::new(clock.clone() as Arc<dyn Clock>));
        let counter = Arc::new(AtomicU32::new(0));
        let id = scheduler.schedule_interval(counting_task(counter.clone()), Duration::seconds(10)).await.unwrap();

        clock.advance(Duration::seconds(11));
        scheduler.clone().spawn_run(id, clock.now()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status(id).await.unwrap(), TaskStatus::Scheduled);

        clock.advance(Duration::seconds(11));
        scheduler.clone().spawn_run(id, clock.now()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_run() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = Arc::new(TaskScheduler::new(clock.clone() as Arc<dyn Clock>));
        let task: TaskFn = Arc::new(|| {
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            })
        });
        let id = scheduler.schedule_interval(task, Duration::seconds(1)).await.unwrap();

        clock.advance(Duration::seconds(2));
        let now = clock.now();
        scheduler.spawn_run(id, now).await;
        assert_eq!(scheduler.status(id).await.unwrap(), TaskStatus::Running);

        scheduler.cancel(id).await.unwrap();
        assert_eq!(scheduler.status(id).await.unwrap(), TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_task_id_is_not_found() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = TaskScheduler::new(clock as Arc<dyn Clock>);
        assert!(scheduler.status(Uuid::new_v4()).await.is_err());
        assert!(scheduler.cancel(Uuid::new_v4()).await.is_err());
    }
}

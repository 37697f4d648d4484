//! Cooperative multi-rate run loop.
//!
//! All activities share one task and one [`Vessel`]. The loop waits for
//! whichever comes first: shutdown, a remote command, or the earliest due
//! activity. Activities only yield between ticks, so the vessel state is
//! never observed half updated.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, sleep_until};

use crate::command::Command;
use crate::config::ScheduleConfig;
use crate::error::ConfigError;
use crate::telemetry::Report;
use crate::vessel::Vessel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    GpsFusion,
    CompassFusion,
    Steering,
    Status,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activity::GpsFusion => "gps",
            Activity::CompassFusion => "compass",
            Activity::Steering => "steering",
            Activity::Status => "status",
        };
        write!(f, "{}", name)
    }
}

/// Per-activity execution statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub executions: u64,
    /// Ticks that finished after the next one was already due.
    pub overruns: u64,
    pub max_execution_us: u64,
}

struct Task {
    activity: Activity,
    period: Duration,
    next_due: Instant,
    stats: TaskStats,
}

pub struct Scheduler {
    vessel: Vessel,
    /// Registration order breaks ties between activities due at once.
    tasks: Vec<Task>,
}

impl Scheduler {
    pub fn new(vessel: Vessel, config: &ScheduleConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let now = Instant::now();
        let task = |activity, period_ms| Task {
            activity,
            period: Duration::from_millis(period_ms),
            next_due: now,
            stats: TaskStats::default(),
        };

        Ok(Self {
            vessel,
            tasks: vec![
                task(Activity::GpsFusion, config.gps_period_ms),
                task(Activity::CompassFusion, config.compass_period_ms),
                task(Activity::Steering, config.steer_period_ms),
                task(Activity::Status, config.status_period_ms),
            ],
        })
    }

    pub fn vessel(&self) -> &Vessel {
        &self.vessel
    }

    pub fn stats(&self) -> Vec<(Activity, TaskStats)> {
        self.tasks
            .iter()
            .map(|task| (task.activity, task.stats))
            .collect()
    }

    /// Runs until `shutdown` resolves, then performs every activity's
    /// cleanup. Steering frames and state reports go out on `reports`;
    /// a full queue drops the frame rather than stalling the loop.
    pub async fn run<F>(
        &mut self,
        mut commands: mpsc::Receiver<Command>,
        reports: mpsc::Sender<Report>,
        shutdown: F,
    ) -> Vec<(Activity, TaskStats)>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut commands_open = true;

        let start = Instant::now();
        for task in &mut self.tasks {
            task.next_due = start;
            info!("{} activity every {} ms", task.activity, task.period.as_millis());
        }

        loop {
            let (index, due) = self.next_task();

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }

                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command, &reports),
                    None => {
                        debug!("command channel closed");
                        commands_open = false;
                    }
                },

                _ = sleep_until(due) => self.run_task(index, &reports),
            }
        }

        self.shutdown();
        self.stats()
    }

    fn next_task(&self) -> (usize, Instant) {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (index, task.next_due))
            .min_by_key(|&(_, due)| due)
            .unwrap_or((0, Instant::now()))
    }

    fn run_task(&mut self, index: usize, reports: &mpsc::Sender<Report>) {
        let Some(activity) = self.tasks.get(index).map(|task| task.activity) else {
            return;
        };

        let started = Instant::now();
        match activity {
            Activity::GpsFusion => self.vessel.fuse_gps_tick(started),
            Activity::CompassFusion => self.vessel.fuse_compass_tick(),
            Activity::Steering => {
                if let Some(frame) = self.vessel.steer_tick() {
                    publish(reports, Report::Steering(frame));
                }
            }
            Activity::Status => self.vessel.status_tick(started),
        }
        let finished = Instant::now();

        let task = &mut self.tasks[index];
        let elapsed_us =
            u64::try_from(finished.duration_since(started).as_micros()).unwrap_or(u64::MAX);
        task.stats.executions += 1;
        task.stats.max_execution_us = task.stats.max_execution_us.max(elapsed_us);

        let (next_due, late) = reschedule(task.next_due, task.period, finished);
        task.next_due = next_due;
        if late {
            task.stats.overruns += 1;
            warn!(
                "{} activity overran its {} ms period",
                activity,
                task.period.as_millis()
            );
        }
    }

    fn handle_command(&mut self, command: Command, reports: &mpsc::Sender<Report>) {
        match self.vessel.apply_command(command) {
            Ok(Some(state)) => publish(reports, Report::Thruster(state)),
            Ok(None) => {}
            Err(e) => warn!("command rejected: {}", e),
        }
    }

    fn shutdown(&mut self) {
        for task in &self.tasks {
            if task.activity == Activity::Steering {
                self.vessel.shutdown_steering();
            }
            info!(
                "{} stopped: {} runs, {} overruns, max {} us",
                task.activity,
                task.stats.executions,
                task.stats.overruns,
                task.stats.max_execution_us
            );
        }
    }
}

/// Advances a deadline by one period. A deadline that is already in the
/// past re-anchors to `now + period` instead of bursting to catch up.
fn reschedule(due: Instant, period: Duration, now: Instant) -> (Instant, bool) {
    let next = due + period;
    if next <= now {
        (now + period, true)
    } else {
        (next, false)
    }
}

fn publish(reports: &mpsc::Sender<Report>, report: Report) {
    match reports.try_send(report) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!("report queue full, frame dropped"),
        Err(TrySendError::Closed(_)) => {}
    }
}

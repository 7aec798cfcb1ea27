// notification_service/src/scheduler.rs
//! Background timers for the three jobs. One tokio task per job, each
//! running its batch to completion before sleeping again — no mid-batch
//! cancellation.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::jobs::Jobs;

pub struct Scheduler {
    jobs: Arc<Jobs>,
    sweep_interval: Duration,
    diary_nudge_time: (u32, u32),
    birthday_check_time: (u32, u32),
}

impl Scheduler {
    pub fn new(
        jobs: Arc<Jobs>,
        sweep_interval: Duration,
        diary_nudge_time: (u32, u32),
        birthday_check_time: (u32, u32),
    ) -> Self {
        Scheduler { jobs, sweep_interval, diary_nudge_time, birthday_check_time }
    }

    /// Registers the three recurring jobs and returns their task handles.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        info!(
            "Scheduler starting: sweep every {:?}, diary nudge at {:02}:{:02}, birthday check at {:02}:{:02}",
            self.sweep_interval,
            self.diary_nudge_time.0,
            self.diary_nudge_time.1,
            self.birthday_check_time.0,
            self.birthday_check_time.1
        );

        let sweep = {
            let jobs = self.jobs.clone();
            let period = self.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let now = Local::now().naive_local();
                    match jobs.run_reminder_sweep(now).await {
                        Ok(sent) if sent > 0 => info!("Reminder sweep confirmed {} send(s)", sent),
                        Ok(_) => {}
                        Err(e) => error!("Reminder sweep failed: {}", e),
                    }
                }
            })
        };

        let diary = {
            let jobs = self.jobs.clone();
            let (hour, minute) = self.diary_nudge_time;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(duration_until(Local::now().naive_local(), hour, minute)).await;
                    if let Err(e) = jobs.run_diary_nudge().await {
                        error!("Diary nudge failed: {}", e);
                    }
                }
            })
        };

        let birthday = {
            let jobs = self.jobs.clone();
            let (hour, minute) = self.birthday_check_time;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(duration_until(Local::now().naive_local(), hour, minute)).await;
                    if let Err(e) = jobs.run_birthday_check(Local::now().date_naive()).await {
                        error!("Birthday check failed: {}", e);
                    }
                }
            })
        };

        vec![sweep, diary, birthday]
    }
}

/// Wall-clock wait until the next local occurrence of `hour:minute`.
fn duration_until(now: NaiveDateTime, hour: u32, minute: u32) -> Duration {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let mut target = now.date().and_time(time);
    if target <= now {
        target += ChronoDuration::days(1);
    }
    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}

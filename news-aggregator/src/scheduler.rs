//! Interval loops driving the pipeline: one for fetch cycles, one for
//! publish ticks.
//!
//! Loops are spawned tasks sharing a `watch` shutdown channel. An operation
//! failure never kills a loop: it is logged and the loop waits for its next
//! tick. Each loop records when it will fire next so status snapshots can
//! show the schedule.

use crate::aggregator::NewsAggregator;
use crate::publisher::PostRunner;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

type NextRun = Arc<RwLock<Option<DateTime<Utc>>>>;

fn next_after(period: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero())
}

pub struct Scheduler {
    aggregator: Arc<NewsAggregator>,
    runner: Arc<PostRunner>,
    shutdown_tx: watch::Sender<bool>,
    fetch_handle: Option<JoinHandle<()>>,
    post_handle: Option<JoinHandle<()>>,
    next_fetch_at: NextRun,
    next_post_at: NextRun,
    fetch_minutes: u64,
    post_minutes: u64,
}

impl Scheduler {
    /// Spawn both loops. The first fetch cycle fires immediately; the first
    /// publish tick waits one full interval.
    pub fn start(
        aggregator: Arc<NewsAggregator>,
        runner: Arc<PostRunner>,
        fetch_minutes: u64,
        post_minutes: u64,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let mut scheduler = Self {
            aggregator,
            runner,
            shutdown_tx,
            fetch_handle: None,
            post_handle: None,
            next_fetch_at: Arc::new(RwLock::new(None)),
            next_post_at: Arc::new(RwLock::new(None)),
            fetch_minutes,
            post_minutes,
        };
        scheduler.spawn_fetch_loop();
        scheduler.spawn_post_loop();
        info!(fetch_minutes, post_minutes, "scheduler started");
        scheduler
    }

    fn spawn_fetch_loop(&mut self) {
        let aggregator = self.aggregator.clone();
        let next_run = self.next_fetch_at.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(self.fetch_minutes * 60);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = aggregator.run_cycle().await {
                            error!(error = %e, "fetch cycle failed");
                        }
                        *next_run.write().await = Some(next_after(period));
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("fetch loop stopped");
        });
        self.fetch_handle = Some(handle);
    }

    fn spawn_post_loop(&mut self) {
        let runner = self.runner.clone();
        let next_run = self.next_post_at.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = Duration::from_secs(self.post_minutes * 60);

        let handle = tokio::spawn(async move {
            *next_run.write().await = Some(next_after(period));
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = runner.post_next().await {
                            error!(error = %e, "publish tick failed");
                        }
                        *next_run.write().await = Some(next_after(period));
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("publish loop stopped");
        });
        self.post_handle = Some(handle);
    }

    /// Apply new intervals. Loops whose interval is unchanged keep their
    /// current timer; changed ones restart with the new period.
    pub async fn reschedule(&mut self, fetch_minutes: u64, post_minutes: u64) {
        if fetch_minutes != self.fetch_minutes {
            if let Some(handle) = self.fetch_handle.take() {
                handle.abort();
            }
            self.fetch_minutes = fetch_minutes;
            self.spawn_fetch_loop();
            info!(fetch_minutes, "fetch loop rescheduled");
        }
        if post_minutes != self.post_minutes {
            if let Some(handle) = self.post_handle.take() {
                handle.abort();
            }
            self.post_minutes = post_minutes;
            self.spawn_post_loop();
            info!(post_minutes, "publish loop rescheduled");
        }
    }

    pub async fn next_fetch_at(&self) -> Option<DateTime<Utc>> {
        *self.next_fetch_at.read().await
    }

    pub async fn next_post_at(&self) -> Option<DateTime<Utc>> {
        *self.next_post_at.read().await
    }

    /// Stop both loops and wait for them to wind down.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.fetch_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.post_handle.take() {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }
}

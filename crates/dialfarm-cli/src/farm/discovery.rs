//! Discovery loop: polls attached devices and supervises session workers.
//!
//! The loop owns the device tracker and aggregate stats outright. Workers
//! never touch them; a finished worker's [`SessionReport`] comes back
//! through the `JoinSet` and is applied here, so every start, finish and
//! disconnect is handled by one task in order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dialfarm_core::device::DeviceId;
use dialfarm_core::outcome::FarmStats;
use dialfarm_core::tracker::DeviceTracker;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::farm::recorder::OutcomeSink;
use crate::farm::session::{SessionDriver, SessionReport};
use crate::farm::transport::Transport;

/// How long to wait for in-flight sessions to finish during shutdown.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DiscoveryLoop {
    transport: Arc<dyn Transport>,
    driver: Arc<SessionDriver>,
    recorder: Arc<dyn OutcomeSink>,
    tracker: DeviceTracker,
    stats: FarmStats,
    sessions: JoinSet<SessionReport>,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
}

impl DiscoveryLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        driver: Arc<SessionDriver>,
        recorder: Arc<dyn OutcomeSink>,
        poll_interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            driver,
            recorder,
            tracker: DeviceTracker::new(cooldown),
            stats: FarmStats::default(),
            sessions: JoinSet::new(),
            poll_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle that stops [`DiscoveryLoop::run`] when notified.
    ///
    /// Use `notify_one` so a signal sent between polls is not lost.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    #[cfg(test)]
    pub fn stats(&self) -> FarmStats {
        self.stats
    }

    /// Poll until shutdown, then drain in-flight sessions.
    pub async fn run(mut self) -> FarmStats {
        info!(
            "Polling for devices every {:?} (Ctrl+C to stop)",
            self.poll_interval
        );
        let shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                Some(joined) = self.sessions.join_next(), if !self.sessions.is_empty() => {
                    self.on_joined(joined).await;
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received, waiting for in-flight sessions");
                    break;
                }
            }
        }

        self.drain().await;
        info!(
            processed = self.stats.processed,
            succeeded = self.stats.succeeded,
            "Stopped. Total time {:.2}s, average {:.2}s per device",
            self.stats.total.as_secs_f64(),
            self.stats.average().as_secs_f64()
        );
        self.stats
    }

    /// One poll: reconcile the attached list and start due sessions.
    ///
    /// A failed listing skips reconciliation so a transient bridge error
    /// doesn't wipe device history.
    pub async fn tick(&mut self) {
        let attached = match self.transport.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device listing failed, skipping this poll: {}", e);
                return;
            }
        };

        debug!(attached = attached.len(), "Polled devices");
        for device in self.tracker.poll(&attached, Instant::now()) {
            self.spawn_session(device);
        }
    }

    /// Start a supervised worker for one device.
    ///
    /// The session runs in its own task; the supervising task turns a panic
    /// into an `Error` report so the device is still recorded and released.
    fn spawn_session(&mut self, device: DeviceId) {
        info!(
            device = %device,
            active = self.tracker.active_count(),
            "New device session"
        );
        let driver = self.driver.clone();
        self.sessions.spawn(async move {
            let started = Instant::now();
            let worker = tokio::spawn({
                let device = device.clone();
                async move { driver.run(device).await }
            });
            match worker.await {
                Ok(report) => report,
                Err(e) => {
                    error!(device = %device, "Session worker crashed: {}", e);
                    SessionReport::crashed(device, started.elapsed(), format!("worker crashed: {}", e))
                }
            }
        });
    }

    async fn on_joined(&mut self, joined: Result<SessionReport, JoinError>) {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                // Only reachable through cancellation of the supervisor.
                error!("Session supervisor failed: {}", e);
                return;
            }
        };

        self.tracker.finish(&report.device, Instant::now());
        self.stats.record(report.status, report.duration);

        if let Err(e) = self.recorder.record(&report.to_record()).await {
            error!(device = %report.device, "Failed to record outcome: {}", e);
        }

        info!(
            device = %report.device,
            status = %report.status,
            processed = self.stats.processed,
            "Stats: total {:.2}s, average {:.2}s per device",
            self.stats.total.as_secs_f64(),
            self.stats.average().as_secs_f64()
        );
    }

    /// Wait for running sessions, recording each, then abort stragglers.
    async fn drain(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        info!("Waiting for {} in-flight session(s)", self.sessions.len());

        let deadline = tokio::time::Instant::now() + GRACEFUL_SHUTDOWN_TIMEOUT;
        loop {
            match tokio::time::timeout_at(deadline, self.sessions.join_next()).await {
                Ok(Some(joined)) => self.on_joined(joined).await,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        let remaining = self.sessions.len();
        warn!(
            "Graceful shutdown timed out after {:?}, abandoning {} session(s)",
            GRACEFUL_SHUTDOWN_TIMEOUT, remaining
        );
        self.sessions.abort_all();
    }

    /// Wait for every running session and apply its report.
    #[cfg(test)]
    pub async fn join_all(&mut self) {
        while let Some(joined) = self.sessions.join_next().await {
            self.on_joined(joined).await;
        }
    }
}

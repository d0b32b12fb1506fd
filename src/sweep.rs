//! # Missing-Pony Sweep
//!
//! Scans `normal` ponies and moves the ones that have been silent longer than
//! `dark_minute + grace` to `missing`. Runs once from the CLI or periodically inside
//! the server. A failure on one pony is logged and counted; the pass continues.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::KeeperError;
use crate::liveness;
use crate::models::PonyStatus;
use crate::service::PonyService;

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `normal` ponies inspected
    pub total: usize,
    /// Ponies found overdue (dry run) or moved to `missing`. A pony that checks in
    /// between the scan and its update is not counted.
    pub missing: usize,
    /// Overdue ponies whose transition could not be persisted
    pub failed: usize,
}

pub struct SweepJob {
    service: Arc<PonyService>,
    grace_minutes: u32,
    interval: Duration,
}

impl SweepJob {
    pub fn new(service: Arc<PonyService>, grace_minutes: u32, interval: Duration) -> Self {
        Self {
            service,
            grace_minutes,
            interval,
        }
    }

    /// Run one pass. With `dry_run` nothing is written and nothing is sent.
    pub async fn sweep(&self, dry_run: bool) -> Result<SweepReport, KeeperError> {
        let t0 = self.service.clock().now();
        let candidates = self
            .service
            .store()
            .list_by_status(PonyStatus::Normal)
            .await?;

        let mut report = SweepReport {
            total: candidates.len(),
            ..SweepReport::default()
        };

        for pony in candidates {
            let Some(last_hi) = pony.last_hi_utc() else {
                continue;
            };
            if !liveness::is_overdue(last_hi, pony.dark_minute, self.grace_minutes, t0) {
                continue;
            }

            if dry_run {
                debug!(pony = %pony.name, "Pony overdue (dry run)");
                report.missing += 1;
                continue;
            }

            let name = pony.name.clone();
            match self.service.mark_missing(pony).await {
                Ok(result) if result.changed => report.missing += 1,
                Ok(_) => debug!(pony = %name, "Pony checked in during sweep; left alone"),
                Err(err) => {
                    report.failed += 1;
                    error!(pony = %name, error = %err, "Failed to mark pony missing");
                }
            }
        }

        gauge!("keeper_sweep_normal_ponies").set(report.total as f64);
        if !dry_run {
            counter!("keeper_sweep_missing_total").increment(report.missing as u64);
            counter!("keeper_sweep_failed_total").increment(report.failed as u64);
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_seconds = self.interval.as_secs(),
            grace_minutes = self.grace_minutes,
            "Starting sweep loop"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sweep loop shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {
                    let started = Instant::now();
                    match self.sweep(false).await {
                        Ok(report) => info!(
                            total = report.total,
                            missing = report.missing,
                            failed = report.failed,
                            "Sweep finished"
                        ),
                        Err(err) => error!(error = %err, "Sweep failed"),
                    }
                    histogram!("keeper_sweep_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sweep loop stopped");
    }
}

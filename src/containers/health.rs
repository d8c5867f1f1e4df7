//! Healthcheck scheduler (spec §4.1 "Health checks")

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::model::{HealthStatus, HealthcheckSpec, ProbeResult};
use super::ContainerManager;
use crate::runtime::{ExecSpec, Io, VmHandle};

const MAX_RETAINED_RESULTS: usize = 5;

/// Spawns the interval-driven probe loop for one container. Runs until
/// `cancel` fires (container exit or daemon shutdown) and exits immediately
/// if the VM handle disappears.
pub fn spawn(
    manager: Arc<ContainerManager>,
    container_id: String,
    handle: VmHandle,
    spec: HealthcheckSpec,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let start_period = Duration::from_secs(spec.start_period_secs);
        let interval_during_start = if spec.start_interval_secs > 0 {
            Duration::from_secs(spec.start_interval_secs)
        } else {
            Duration::from_secs(spec.interval_secs)
        };
        let interval_after_start = Duration::from_secs(spec.interval_secs.max(1));
        let timeout = Duration::from_secs(spec.timeout_secs.max(1));
        let started_at = tokio::time::Instant::now();

        loop {
            let in_start_period = started_at.elapsed() < start_period;
            let wait = if in_start_period {
                interval_during_start
            } else {
                interval_after_start
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            let probe_start = Utc::now();
            let outcome = tokio::time::timeout(timeout, run_probe(&manager, &handle, &spec.test)).await;
            let (exit_code, output) = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => (-1, e.to_string()),
                Err(_) => (-1, "healthcheck timed out".to_string()),
            };
            let probe_end = Utc::now();

            let success = exit_code == 0;

            manager.record_health_probe(
                &container_id,
                ProbeResult {
                    start: probe_start,
                    end: probe_end,
                    exit_code,
                    output,
                },
                success,
                in_start_period,
                spec.retries,
                MAX_RETAINED_RESULTS,
            );
        }
    });
}

async fn run_probe(
    manager: &ContainerManager,
    handle: &VmHandle,
    test: &[String],
) -> crate::runtime::RuntimeResult<(i64, String)> {
    let status = manager
        .runtime
        .exec_in(
            handle,
            ExecSpec {
                command: test.to_vec(),
                env: vec![],
                user: None,
                tty: false,
                working_dir: None,
            },
            Io {
                stdin: Box::new(tokio::io::empty()),
                stdout: Box::new(tokio::io::sink()),
                stderr: Box::new(tokio::io::sink()),
            },
        )
        .await?;
    Ok((status.code, String::new()))
}

pub fn next_status(current: Option<HealthStatus>, failing_streak: u32, retries: u32) -> HealthStatus {
    if failing_streak >= retries.max(1) {
        HealthStatus::Unhealthy
    } else if failing_streak == 0 {
        HealthStatus::Healthy
    } else {
        current.unwrap_or(HealthStatus::Starting)
    }
}

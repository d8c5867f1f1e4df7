//! Restart-policy evaluation and exit-monitor loop (spec §4.1)

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tokio_util::sync::CancellationToken;

use super::model::RestartPolicy;
use super::ContainerManager;
use crate::runtime::VmHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Restart,
    StayExited,
}

/// Decide whether a container should be restarted given its policy, exit
/// code, and whether the exit followed a manual stop request. Attempt
/// counts are tracked by the caller per spec's "attempts are counted; reset
/// on successful run beyond a threshold".
pub fn decide(policy: &RestartPolicy, exit_code: i64, manual_stop: bool, attempts_so_far: u32) -> Decision {
    if manual_stop {
        // `always` restarts even after a manual stop, but only on next
        // daemon boot, not immediately — see restart_on_boot below.
        return Decision::StayExited;
    }
    match policy {
        RestartPolicy::No => Decision::StayExited,
        RestartPolicy::OnFailure { max_retries } => {
            if exit_code != 0 && (*max_retries == 0 || attempts_so_far < *max_retries) {
                Decision::Restart
            } else {
                Decision::StayExited
            }
        }
        RestartPolicy::Always => Decision::Restart,
        RestartPolicy::UnlessStopped => Decision::Restart,
    }
}

/// Whether a container with this policy should be restarted at daemon boot
/// after a manual stop. Decided open question: `always` resumes on the next
/// boot even if manually stopped; `unless-stopped` stays stopped until
/// explicitly started again (durable across restarts, per its name).
pub fn restart_on_boot_after_manual_stop(policy: &RestartPolicy) -> bool {
    matches!(policy, RestartPolicy::Always)
}

/// Exponential back-off starting at 100ms, capped, reset after a container
/// has run cleanly past a stability threshold.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(30))
        .with_max_elapsed_time(None)
        .build();
    let mut delay = Duration::from_millis(100);
    for _ in 0..attempt {
        delay = backoff.next_backoff().unwrap_or(delay);
    }
    delay
}

/// One exit-monitor task per running container: awaits the VM's exit,
/// evaluates restart policy, and either reschedules a start or finalizes
/// the exited phase.
pub fn spawn_exit_monitor(
    manager: Arc<ContainerManager>,
    container_id: String,
    handle: VmHandle,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let status = tokio::select! {
            _ = cancel.cancelled() => return,
            status = manager.runtime.wait(&handle) => status,
        };

        let Ok(status) = status else { return };
        manager.handle_exit(&container_id, status.code, status.oom_killed).await;
    });
}

/// Tracks consecutive restart attempts per container so `on-failure(N)` can
/// cap them and `always`/`unless-stopped` can back off without bound.
#[derive(Default)]
pub struct AttemptCounter(AtomicU32);

impl AttemptCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

//! Supervisor tick: poll sensors, advance the PID controller, persist a
//! snapshot, then sleep until the next tick or a shutdown request.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use bmc_core::{persistence, GlobalState};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Run the supervisor loop until `shutdown` is set. Each iteration polls the
/// sensor model, lets the PID controller compute a new fan duty, releases the
/// state lock, and persists both the state and event log snapshots before
/// sleeping for `poll_interval_secs` (overridable via `--poll-interval`).
pub async fn run(
    state: Arc<Mutex<GlobalState>>,
    shutdown: &'static AtomicBool,
    poll_interval_secs: f64,
    state_path: &Path,
    sel_path: &Path,
) {
    info!("control loop starting (poll interval {}s)", poll_interval_secs);

    let dt = poll_interval_secs;
    let mut rng_state: u64 = 0x9E3779B97F4A7C15;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("control loop shutting down");
            break;
        }

        let now = now_unix();
        {
            let mut guard = state.lock().await;
            guard.tick(now, dt, || {
                rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((rng_state >> 33) as u32) as f64 / u32::MAX as f64
            });
        }

        if let Err(e) = persist(&state, state_path, sel_path).await {
            error!("failed to persist snapshot: {}", e);
        }

        sleep_respecting_shutdown(Duration::from_secs_f64(dt), shutdown).await;
    }

    info!("control loop stopped");
}

async fn persist(state: &Arc<Mutex<GlobalState>>, state_path: &Path, sel_path: &Path) -> bmc_core::Result<()> {
    let guard = state.lock().await;
    persistence::save_atomic(state_path, &guard.snapshot())?;
    persistence::save_atomic(sel_path, &guard.event_log.snapshot())?;
    debug!("persisted state and event log snapshots");
    Ok(())
}

async fn sleep_respecting_shutdown(total: Duration, shutdown: &'static AtomicBool) {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let chunk = remaining.min(SHUTDOWN_POLL_INTERVAL);
        tokio::time::sleep(chunk).await;
        remaining -= chunk;
    }
}

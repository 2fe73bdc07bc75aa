use std::sync::Arc;
use std::time::Duration;

use leadsweep_core::workflow::{CycleError, LeadProcessor, Trigger};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Fixed cycle cadence. Changing it means a redeploy.
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(600);

/// Spawns the periodic trigger. The first cycle runs one interval
/// after startup; a batch-level error never stops the loop.
pub fn spawn(processor: Arc<LeadProcessor>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(processor, CYCLE_INTERVAL))
}

async fn run(processor: Arc<LeadProcessor>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so startup does
    // not double as a cycle.
    ticker.tick().await;

    info!(
        event_name = "system.scheduler.started",
        correlation_id = "bootstrap",
        interval_secs = interval.as_secs(),
        "periodic trigger started"
    );

    loop {
        ticker.tick().await;
        match processor.run_cycle(Trigger::Timer).await {
            Ok(report) => {
                info!(
                    event_name = "system.scheduler.cycle_completed",
                    cycle_id = %report.cycle_id,
                    summary = %report.summary(),
                    "scheduled cycle completed"
                );
            }
            Err(CycleError::NoLeads) => {
                info!(
                    event_name = "system.scheduler.cycle_empty",
                    "no leads to process; waiting for the next tick"
                );
            }
            Err(CycleError::Overlapping) => {
                warn!(
                    event_name = "system.scheduler.cycle_dropped",
                    "previous cycle still running; this tick was dropped"
                );
            }
            Err(error) => {
                error!(
                    event_name = "system.scheduler.cycle_failed",
                    error = %error,
                    "scheduled cycle aborted; next tick retries from scratch"
                );
            }
        }
    }
}

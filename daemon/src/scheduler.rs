use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::probe::Prober;
use crate::reconcile::{CycleReport, Reconciler};

/// When the loop fires.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub interval: Duration,
    /// Fire the first cycle right away instead of one interval after start.
    pub probe_immediately: bool,
}

/// Runs probe → reconcile cycles every [`Schedule::interval`] until `stop`
/// turns `true` (or its sender is dropped), then returns the reconciler.
///
/// Cycles run inline, one at a time. Ticks that come due while a cycle is
/// still running are dropped rather than queued: an overrunning cycle
/// restarts the interval from its own end. `stop` is only looked at between
/// cycles so a cycle in flight always completes.
pub async fn run(
    schedule: Schedule,
    prober: Box<dyn Prober>,
    mut reconciler: Reconciler,
    mut stop: watch::Receiver<bool>,
) -> Reconciler {
    let start = if schedule.probe_immediately {
        Instant::now()
    } else {
        Instant::now() + schedule.interval
    };
    let mut ticker = interval_at(start, schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cycles: u64 = 0;
    let mut failures: u64 = 0;

    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let began = Instant::now();
        let outcome = prober.probe().await;
        cycles += 1;
        match reconciler.tick(outcome).await {
            CycleReport::Unchanged => {}
            CycleReport::Published { snapshot, alerted } => {
                tracing::debug!("Cycle {cycles} published {snapshot} (alert: {alerted})");
            }
            CycleReport::Failed => failures += 1,
        }

        let elapsed = began.elapsed();
        if elapsed >= schedule.interval {
            tracing::warn!(
                "Cycle took {elapsed:?}, longer than the {:?} interval; dropping missed ticks",
                schedule.interval
            );
            ticker.reset();
        }
    }

    tracing::info!("Scheduler stopped after {cycles} cycles ({failures} failed)");
    reconciler.shutdown().await;
    reconciler
}

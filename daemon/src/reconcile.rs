/// Decides, once per tick, what the published notice needs.
///
/// [`decide`] is pure: it maps the previous snapshot and a fresh probe
/// outcome to an [`Action`], an optional alert and the snapshot to commit.
/// [`Reconciler`] owns the snapshot and the notice handle and runs one
/// guarded cycle per tick, committing the new snapshot only once the store
/// accepted the change.
use tokio::time::Instant;

use crate::notifier::Notifier;
use crate::probe::Outcome;
use crate::recovery::Recovered;
use crate::status::{Availability, StatusSnapshot};
use crate::store::MessageId;

/// What to do with the notice this tick. Carries the snapshot to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// Remove the current notice and post a new one.
    Replace(StatusSnapshot),
    /// Edit the current notice in place.
    Update(StatusSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub alert: Option<Availability>,
    pub next: StatusSnapshot,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Policy {
    /// Attach an alert to player-count-only changes as well.
    pub alert_on_player_change: bool,
}

/// The snapshot an outcome stands for. Probe errors read as offline.
pub fn observed(outcome: &Outcome) -> StatusSnapshot {
    match outcome {
        Outcome::Online { players } => StatusSnapshot::Online { players: *players },
        Outcome::Offline | Outcome::ProbeError(_) => StatusSnapshot::Offline,
    }
}

pub fn decide(previous: StatusSnapshot, outcome: &Outcome, policy: Policy) -> Decision {
    let next = observed(outcome);

    // Leaving Unknown always counts as a change.
    if next.availability() != previous.availability() {
        return Decision {
            action: Action::Replace(next),
            alert: Some(next.availability()),
            next,
        };
    }

    if let (StatusSnapshot::Online { players: now }, StatusSnapshot::Online { players: before }) =
        (next, previous)
    {
        if now != before {
            return Decision {
                action: Action::Update(next),
                alert: policy
                    .alert_on_player_change
                    .then_some(Availability::Online),
                next,
            };
        }
    }

    Decision {
        action: Action::None,
        alert: None,
        next: previous,
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    Unchanged,
    Published {
        snapshot: StatusSnapshot,
        alerted: bool,
    },
    /// The notice could not be posted; the snapshot was kept for a retry.
    Failed,
}

pub struct Reconciler {
    snapshot: StatusSnapshot,
    handle: Option<MessageId>,
    notifier: Notifier,
    policy: Policy,
}

impl Reconciler {
    pub fn new(recovered: Recovered, notifier: Notifier, policy: Policy) -> Self {
        Self {
            snapshot: recovered.snapshot,
            handle: recovered.handle,
            notifier,
            policy,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot
    }

    pub fn handle(&self) -> Option<&MessageId> {
        self.handle.as_ref()
    }

    /// Runs one probe → decide → apply cycle for `outcome`.
    pub async fn tick(&mut self, outcome: Outcome) -> CycleReport {
        self.notifier.sweep_alerts(Instant::now()).await;

        if let Outcome::ProbeError(e) = &outcome {
            tracing::debug!("Probe failed, treating server as offline: {e}");
        }

        let mut decision = decide(self.snapshot, &outcome, self.policy);
        if decision.action == Action::None {
            // A create that failed after the old notice was removed leaves no
            // notice at all; an unchanged status must still bring it back.
            if self.handle.is_none() && self.snapshot != StatusSnapshot::Unknown {
                tracing::warn!("No notice in the channel for {}; republishing", self.snapshot);
                decision.action = Action::Replace(decision.next);
            } else {
                tracing::debug!("Status unchanged: {}", self.snapshot);
                return CycleReport::Unchanged;
            }
        }

        match self
            .notifier
            .apply(&mut self.handle, &decision.action, decision.alert)
            .await
        {
            Ok(alerted) => {
                tracing::info!("Status {} -> {}", self.snapshot, decision.next);
                self.snapshot = decision.next;
                CycleReport::Published {
                    snapshot: decision.next,
                    alerted,
                }
            }
            Err(e) => {
                tracing::error!(
                    "Cycle failed, keeping {} and retrying next tick: {e}",
                    self.snapshot
                );
                CycleReport::Failed
            }
        }
    }

    /// Cleans up transient messages before the process exits.
    pub async fn shutdown(&mut self) {
        let pending = self.notifier.pending_alert_count();
        if pending > 0 {
            tracing::info!("Removing {pending} outstanding alert message(s)");
        }
        self.notifier.flush_alerts().await;
    }
}

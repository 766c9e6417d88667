/// Executes reconciler actions against the message store.
///
/// Every store failure except the final create is absorbed here: a failed
/// delete orphans the old message, a failed edit degrades to posting a new
/// notice. The notice handle is only ever written by [`Notifier::apply`].
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::{AlertConfig, AlertMode};
use crate::reconcile::Action;
use crate::render::NoticeRenderer;
use crate::status::Availability;
use crate::store::{ChannelId, Embed, MessageId, MessageStore, OutgoingMessage, StoreError};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("could not post notice: {0}")]
    Create(#[source] StoreError),
}

/// Result of a best-effort delete. Never fatal.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Failed(StoreError),
}

/// A separate alert message waiting to be cleaned up.
#[derive(Debug)]
struct PendingAlert {
    id: MessageId,
    expires_at: Instant,
}

pub struct Notifier {
    store: Arc<dyn MessageStore>,
    channel: ChannelId,
    renderer: NoticeRenderer,
    alert_mode: AlertMode,
    alert_ttl: Duration,
    pending_alerts: Vec<PendingAlert>,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn MessageStore>,
        channel: ChannelId,
        renderer: NoticeRenderer,
        alerts: &AlertConfig,
    ) -> Self {
        Self {
            store,
            channel,
            renderer,
            alert_mode: alerts.mode,
            alert_ttl: alerts.ttl(),
            pending_alerts: Vec::new(),
        }
    }

    /// Applies `action`, updating `handle` to point at the current notice.
    /// Returns whether a role ping actually went out.
    ///
    /// On error the handle is left empty when the previous notice was removed
    /// (or found missing) before the create failed.
    pub async fn apply(
        &mut self,
        handle: &mut Option<MessageId>,
        action: &Action,
        alert: Option<Availability>,
    ) -> Result<bool, NotifyError> {
        match action {
            Action::None => Ok(false),
            Action::Replace(snapshot) => {
                let embed = self.renderer.render(snapshot);
                self.replace(handle, embed, alert).await
            }
            Action::Update(snapshot) => {
                let embed = self.renderer.render(snapshot);
                if let Some(id) = handle.as_ref() {
                    let update = OutgoingMessage::embed(embed.clone());
                    match self.store.edit(&self.channel, id, &update).await {
                        Ok(()) => {
                            tracing::debug!("Edited notice {id}");
                            return Ok(match alert {
                                Some(availability) => self.send_alert(availability).await,
                                None => false,
                            });
                        }
                        Err(e) => {
                            tracing::warn!("Could not edit notice {id} ({e}); posting a new one");
                        }
                    }
                } else {
                    tracing::info!("No notice to edit; posting a new one");
                }

                // Fallback posts silently; a requested alert still goes out on its own.
                self.replace(handle, embed, None).await?;
                Ok(match alert {
                    Some(availability) => self.send_alert(availability).await,
                    None => false,
                })
            }
        }
    }

    async fn replace(
        &mut self,
        handle: &mut Option<MessageId>,
        embed: Embed,
        alert: Option<Availability>,
    ) -> Result<bool, NotifyError> {
        if let Some(old) = handle.take() {
            match self.delete_message(&old).await {
                DeleteOutcome::Deleted => tracing::debug!("Deleted previous notice {old}"),
                DeleteOutcome::NotFound => tracing::info!("Previous notice {old} was already gone"),
                DeleteOutcome::Failed(e) => {
                    tracing::warn!("Could not delete previous notice {old}: {e}");
                }
            }
        }

        let mut message = OutgoingMessage::embed(embed);
        let inline_role = match (alert, self.alert_mode, self.renderer.role_id()) {
            (Some(_), AlertMode::Inline, Some(role)) => Some(role.to_string()),
            _ => None,
        };
        if let Some(role) = &inline_role {
            message = message.with_role_mention(role);
        }

        let id = self
            .store
            .send(&self.channel, &message)
            .await
            .map_err(NotifyError::Create)?;
        tracing::info!("Posted notice {id}");
        *handle = Some(id);

        // The alert follows the notice, so a failed create never leaves an alert behind.
        let Some(availability) = alert else {
            return Ok(false);
        };
        Ok(match self.alert_mode {
            AlertMode::Inline if inline_role.is_some() => true,
            AlertMode::Inline => {
                tracing::debug!("No role configured; {availability} not pinged");
                false
            }
            AlertMode::Separate => self.send_alert(availability).await,
        })
    }

    async fn delete_message(&self, id: &MessageId) -> DeleteOutcome {
        match self.store.delete(&self.channel, id).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(StoreError::NotFound) => DeleteOutcome::NotFound,
            Err(e) => DeleteOutcome::Failed(e),
        }
    }

    /// Sends one short-lived alert message. Failures are logged and never retried.
    /// Returns whether the message pinged anyone.
    async fn send_alert(&mut self, availability: Availability) -> bool {
        let mut message = OutgoingMessage {
            content: Some(self.renderer.alert_text(availability)),
            ..OutgoingMessage::default()
        };
        if let Some(role) = self.renderer.role_id() {
            message = message.with_role_mention(role);
        }
        let pings = message.pings();

        match self.store.send(&self.channel, &message).await {
            Ok(id) => {
                tracing::info!("Sent {availability} alert {id}");
                self.pending_alerts.push(PendingAlert {
                    id,
                    expires_at: Instant::now() + self.alert_ttl,
                });
                pings
            }
            Err(e) => {
                tracing::warn!("Could not send {availability} alert: {e}");
                false
            }
        }
    }

    /// Deletes alert messages whose lifetime ended at or before `now`.
    pub async fn sweep_alerts(&mut self, now: Instant) {
        if !self.pending_alerts.iter().any(|a| a.expires_at <= now) {
            return;
        }
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_alerts)
            .into_iter()
            .partition(|a| a.expires_at <= now);
        self.pending_alerts = live;
        for alert in expired {
            self.expire_alert(&alert.id).await;
        }
    }

    /// Deletes every outstanding alert message. Used on shutdown.
    pub async fn flush_alerts(&mut self) {
        for alert in std::mem::take(&mut self.pending_alerts) {
            self.expire_alert(&alert.id).await;
        }
    }

    pub fn pending_alert_count(&self) -> usize {
        self.pending_alerts.len()
    }

    async fn expire_alert(&self, id: &MessageId) {
        match self.delete_message(id).await {
            DeleteOutcome::Deleted | DeleteOutcome::NotFound => {
                tracing::debug!("Removed alert {id}");
            }
            DeleteOutcome::Failed(e) => tracing::warn!("Could not remove alert {id}: {e}"),
        }
    }
}

/// Notifier wired to an in-memory store, pinging role `77`.
#[cfg(test)]
pub(crate) fn test_notifier(
    store: Arc<crate::store::memory::MemoryStore>,
    mode: AlertMode,
) -> Notifier {
    use crate::config::{NoticeConfig, ServerConfig};
    use crate::store::memory::MemoryStore;

    let alerts = AlertConfig {
        mode,
        ..AlertConfig::default()
    };
    let renderer = NoticeRenderer::new(&ServerConfig::default(), &NoticeConfig::default(), Some("77"));
    Notifier::new(store, MemoryStore::channel(), renderer, &alerts)
}

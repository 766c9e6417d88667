/// Rebuilds the reconciler's starting point from channel history.
///
/// After a restart the last notice this bot posted is still in the channel.
/// Reading it back lets the first tick skip a redundant re-publish, and lets
/// the next transition replace that notice instead of leaving a duplicate.
use thiserror::Error;

use crate::render::parse_notice;
use crate::status::StatusSnapshot;
use crate::store::{Channel, ChannelId, Message, MessageId, MessageStore, StoreError, User, UserId};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("channel {0} is not reachable: {1}")]
    Channel(ChannelId, #[source] StoreError),
    #[error("could not identify the bot user: {0}")]
    Identity(#[source] StoreError),
}

/// Everything the daemon learns before its first tick.
#[derive(Debug)]
pub struct Startup {
    pub channel: Channel,
    pub me: User,
    pub recovered: Recovered,
}

/// Snapshot and notice handle to start reconciling from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovered {
    pub snapshot: StatusSnapshot,
    pub handle: Option<MessageId>,
}

/// Verifies the channel, identifies the bot and recovers its last notice.
///
/// Only the first two steps are fatal; recovery itself never fails.
pub async fn bootstrap(
    store: &dyn MessageStore,
    channel: &ChannelId,
    window: u8,
) -> Result<Startup, BootstrapError> {
    let found = store
        .fetch_channel(channel)
        .await
        .map_err(|e| BootstrapError::Channel(channel.clone(), e))?;
    let me = store.current_user().await.map_err(BootstrapError::Identity)?;
    let recovered = recover(store, channel, &me.id, window).await;
    Ok(Startup {
        channel: found,
        me,
        recovered,
    })
}

/// Scans the newest `window` messages of `channel` for the latest notice
/// authored by `self_id`.
///
/// Never fails: an unreadable history yields a fresh start, and a notice
/// that cannot be parsed unambiguously yields `Unknown` (its handle is kept
/// so the forced first publish replaces it).
pub async fn recover(
    store: &dyn MessageStore,
    channel: &ChannelId,
    self_id: &UserId,
    window: u8,
) -> Recovered {
    let history = match store.recent_history(channel, window).await {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!("Could not read channel history, starting fresh: {e}");
            return Recovered::default();
        }
    };

    remove_stale_alerts(store, channel, &history, self_id).await;

    let Some(notice) = latest_notice(&history, self_id) else {
        tracing::info!("No previous notice in the last {window} messages");
        return Recovered::default();
    };

    let snapshot = match notice.embeds.as_slice() {
        [embed] => match parse_notice(embed) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Previous notice {} is unreadable ({e}); status unknown", notice.id);
                StatusSnapshot::Unknown
            }
        },
        embeds => {
            tracing::warn!(
                "Previous notice {} has {} embeds; status unknown",
                notice.id,
                embeds.len()
            );
            StatusSnapshot::Unknown
        }
    };

    tracing::info!("Recovered notice {} showing {snapshot}", notice.id);
    Recovered {
        snapshot,
        handle: Some(notice.id.clone()),
    }
}

/// Deletes alert messages (own messages without an embed) left behind by a
/// process that exited before its alerts expired. Best effort.
async fn remove_stale_alerts(
    store: &dyn MessageStore,
    channel: &ChannelId,
    history: &[Message],
    self_id: &UserId,
) {
    for alert in history
        .iter()
        .filter(|m| &m.author.id == self_id && m.embeds.is_empty())
    {
        match store.delete(channel, &alert.id).await {
            Ok(()) | Err(StoreError::NotFound) => {
                tracing::info!("Removed stale alert {}", alert.id);
            }
            Err(e) => tracing::warn!("Could not remove stale alert {}: {e}", alert.id),
        }
    }
}

/// Newest message by `self_id` that carries an embed. Plain-text messages
/// (such as separate alerts) are skipped.
fn latest_notice<'a>(history: &'a [Message], self_id: &UserId) -> Option<&'a Message> {
    history
        .iter()
        .find(|m| &m.author.id == self_id && !m.embeds.is_empty())
}

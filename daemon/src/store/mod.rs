//! The chat platform's message surface, seen as a fallible external store.
//!
//! The reconciler never talks to Discord directly: everything goes through
//! [`MessageStore`], which keeps the core testable against an in-memory store.

pub mod discord;
#[cfg(test)]
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use discord::DiscordStore;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

snowflake!(
    /// Discord channel snowflake.
    ChannelId
);
snowflake!(
    /// Discord message snowflake. The notice handle is one of these.
    MessageId
);
snowflake!(
    /// Discord user snowflake.
    UserId
);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("missing permission")]
    Forbidden,
    #[error("rate limited")]
    RateLimited,
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

// ── Message model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub name: Option<String>,
}

/// A message as read back from the store.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: User,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Body of a send or edit call.
///
/// `mention_roles` is the complete allow-list of roles that may be pinged by
/// this message; an empty list means the message pings nobody even if its
/// content contains a mention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub mention_roles: Vec<String>,
}

impl OutgoingMessage {
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
            mention_roles: Vec::new(),
        }
    }

    /// Adds a role mention to the content and allows it to ping.
    pub fn with_role_mention(mut self, role_id: &str) -> Self {
        self.content = Some(match self.content.take() {
            Some(text) => format!("<@&{role_id}> {text}"),
            None => format!("<@&{role_id}>"),
        });
        self.mention_roles.push(role_id.to_string());
        self
    }

    pub fn pings(&self) -> bool {
        !self.mention_roles.is_empty()
    }
}

// ── Contract ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The identity this process posts as.
    async fn current_user(&self) -> Result<User, StoreError>;

    async fn fetch_channel(&self, channel: &ChannelId) -> Result<Channel, StoreError>;

    async fn fetch_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<Message, StoreError>;

    async fn send(
        &self,
        channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, StoreError>;

    async fn edit(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        update: &OutgoingMessage,
    ) -> Result<(), StoreError>;

    async fn delete(&self, channel: &ChannelId, message: &MessageId) -> Result<(), StoreError>;

    /// Up to `limit` most recent messages, newest first.
    async fn recent_history(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> Result<Vec<Message>, StoreError>;
}

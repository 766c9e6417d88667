/// In-memory [`MessageStore`] for tests: records every call and can be told
/// to fail specific operations.
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    Channel, ChannelId, Embed, Message, MessageId, MessageStore, OutgoingMessage, StoreError,
    User, UserId,
};

pub const BOT_USER_ID: &str = "1000";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CurrentUser,
    FetchChannel,
    FetchMessage(MessageId),
    Send { id: MessageId, pings: bool },
    Edit(MessageId),
    Delete(MessageId),
    History(u8),
}

impl Call {
    pub fn is_send(&self) -> bool {
        matches!(self, Call::Send { .. })
    }
}

#[derive(Default)]
struct Inner {
    /// Oldest first.
    messages: Vec<Message>,
    next_id: u64,
    calls: Vec<Call>,
    fail_sends: bool,
    fail_text_sends: bool,
    fail_edits: bool,
    fail_deletes: bool,
    fail_history: bool,
    missing_channel: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bot_id() -> UserId {
        UserId::from(BOT_USER_ID)
    }

    pub fn channel() -> ChannelId {
        ChannelId::from("10")
    }

    /// Appends a message as if it had been posted by `author` before the test started.
    pub fn seed(&self, author: &str, content: &str, embeds: Vec<Embed>) -> MessageId {
        let mut inner = self.inner.lock().unwrap();
        let id = next_id(&mut inner);
        inner.messages.push(Message {
            id: id.clone(),
            author: User {
                id: UserId::from(author),
                username: String::new(),
            },
            content: content.to_string(),
            embeds,
        });
        id
    }

    /// Deletes a message behind the daemon's back.
    pub fn remove_externally(&self, id: &MessageId) {
        self.inner.lock().unwrap().messages.retain(|m| &m.id != id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn sends(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_send).collect()
    }

    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| &m.id == id)
            .cloned()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_sends = fail;
    }

    /// Fails only sends without an embed, i.e. alert messages.
    pub fn fail_text_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_text_sends = fail;
    }

    pub fn fail_edits(&self, fail: bool) {
        self.inner.lock().unwrap().fail_edits = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_deletes = fail;
    }

    pub fn fail_history(&self, fail: bool) {
        self.inner.lock().unwrap().fail_history = fail;
    }

    pub fn hide_channel(&self) {
        self.inner.lock().unwrap().missing_channel = true;
    }
}

fn next_id(inner: &mut Inner) -> MessageId {
    inner.next_id += 1;
    MessageId(format!("{}", 500 + inner.next_id))
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn current_user(&self) -> Result<User, StoreError> {
        self.inner.lock().unwrap().calls.push(Call::CurrentUser);
        Ok(User {
            id: Self::bot_id(),
            username: "beacon".to_string(),
        })
    }

    async fn fetch_channel(&self, channel: &ChannelId) -> Result<Channel, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::FetchChannel);
        if inner.missing_channel {
            return Err(StoreError::NotFound);
        }
        Ok(Channel {
            id: channel.clone(),
            name: Some("status".to_string()),
        })
    }

    async fn fetch_message(
        &self,
        _channel: &ChannelId,
        message: &MessageId,
    ) -> Result<Message, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::FetchMessage(message.clone()));
        inner
            .messages
            .iter()
            .find(|m| &m.id == message)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn send(
        &self,
        _channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_sends || (inner.fail_text_sends && message.embeds.is_empty()) {
            return Err(StoreError::Transport("send refused".to_string()));
        }
        let id = next_id(&mut inner);
        inner.calls.push(Call::Send {
            id: id.clone(),
            pings: message.pings(),
        });
        inner.messages.push(Message {
            id: id.clone(),
            author: User {
                id: Self::bot_id(),
                username: "beacon".to_string(),
            },
            content: message.content.clone().unwrap_or_default(),
            embeds: message.embeds.clone(),
        });
        Ok(id)
    }

    async fn edit(
        &self,
        _channel: &ChannelId,
        message: &MessageId,
        update: &OutgoingMessage,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Edit(message.clone()));
        if inner.fail_edits {
            return Err(StoreError::Forbidden);
        }
        let existing = inner
            .messages
            .iter_mut()
            .find(|m| &m.id == message)
            .ok_or(StoreError::NotFound)?;
        if let Some(content) = &update.content {
            existing.content = content.clone();
        }
        existing.embeds = update.embeds.clone();
        Ok(())
    }

    async fn delete(&self, _channel: &ChannelId, message: &MessageId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Delete(message.clone()));
        if inner.fail_deletes {
            return Err(StoreError::Transport("delete refused".to_string()));
        }
        let before = inner.messages.len();
        inner.messages.retain(|m| &m.id != message);
        if inner.messages.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn recent_history(
        &self,
        _channel: &ChannelId,
        limit: u8,
    ) -> Result<Vec<Message>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::History(limit));
        if inner.fail_history {
            return Err(StoreError::Timeout);
        }
        Ok(inner
            .messages
            .iter()
            .rev()
            .take(usize::from(limit))
            .cloned()
            .collect())
    }
}

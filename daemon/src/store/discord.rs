/// [`MessageStore`] backed by the Discord REST API (v10).
///
/// Only the handful of endpoints the daemon needs are wrapped. Every request
/// carries the bot token and is bounded by the client-wide timeout; HTTP
/// status codes are mapped onto [`StoreError`] so callers can tell a vanished
/// message (`NotFound`) apart from everything else.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    Channel, ChannelId, Embed, Message, MessageId, MessageStore, OutgoingMessage, StoreError,
    User,
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const USER_AGENT: &str = concat!("DiscordBot (beacon-daemon, ", env!("CARGO_PKG_VERSION"), ")");

pub struct DiscordStore {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: &'a [Embed],
    allowed_mentions: AllowedMentions<'a>,
}

/// Never let Discord parse mentions out of the content; only the roles
/// listed explicitly may be pinged.
#[derive(Serialize)]
struct AllowedMentions<'a> {
    parse: &'a [&'a str],
    roles: &'a [String],
}

#[derive(Deserialize)]
struct Created {
    id: MessageId,
}

impl<'a> From<&'a OutgoingMessage> for MessageBody<'a> {
    fn from(message: &'a OutgoingMessage) -> Self {
        Self {
            content: message.content.as_deref(),
            embeds: &message.embeds,
            allowed_mentions: AllowedMentions {
                parse: &[],
                roles: &message.mention_roles,
            },
        }
    }
}

impl DiscordStore {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status {
            StatusCode::NOT_FOUND => StoreError::NotFound,
            StatusCode::FORBIDDEN => StoreError::Forbidden,
            StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
            _ => StoreError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            },
        })
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = self.execute(request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout
            } else {
                StoreError::Decode(e.to_string())
            }
        })
    }
}

fn request_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(e.to_string())
    }
}

#[async_trait]
impl MessageStore for DiscordStore {
    async fn current_user(&self) -> Result<User, StoreError> {
        self.execute_json(self.request(Method::GET, "/users/@me")).await
    }

    async fn fetch_channel(&self, channel: &ChannelId) -> Result<Channel, StoreError> {
        self.execute_json(self.request(Method::GET, &format!("/channels/{channel}")))
            .await
    }

    async fn fetch_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<Message, StoreError> {
        let path = format!("/channels/{channel}/messages/{message}");
        self.execute_json(self.request(Method::GET, &path)).await
    }

    async fn send(
        &self,
        channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, StoreError> {
        let path = format!("/channels/{channel}/messages");
        let request = self
            .request(Method::POST, &path)
            .json(&MessageBody::from(message));
        let created: Created = self.execute_json(request).await?;
        Ok(created.id)
    }

    async fn edit(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        update: &OutgoingMessage,
    ) -> Result<(), StoreError> {
        let path = format!("/channels/{channel}/messages/{message}");
        let request = self
            .request(Method::PATCH, &path)
            .json(&MessageBody::from(update));
        self.execute(request).await.map(|_| ())
    }

    async fn delete(&self, channel: &ChannelId, message: &MessageId) -> Result<(), StoreError> {
        let path = format!("/channels/{channel}/messages/{message}");
        self.execute(self.request(Method::DELETE, &path))
            .await
            .map(|_| ())
    }

    async fn recent_history(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> Result<Vec<Message>, StoreError> {
        let path = format!("/channels/{channel}/messages?limit={limit}");
        self.execute_json(self.request(Method::GET, &path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> DiscordStore {
        DiscordStore::new(&server.uri(), "secret", Duration::from_secs(2)).unwrap()
    }

    fn message_json(id: &str, author: &str) -> serde_json::Value {
        json!({
            "id": id,
            "channel_id": "10",
            "author": { "id": author, "username": "bot" },
            "content": "",
            "embeds": [{ "title": "🔴 Server Offline" }]
        })
    }

    #[tokio::test]
    async fn send_posts_embed_with_restricted_mentions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/10/messages"))
            .and(header("authorization", "Bot secret"))
            .and(body_partial_json(json!({
                "content": "<@&99>",
                "embeds": [{ "title": "hello" }],
                "allowed_mentions": { "parse": [], "roles": ["99"] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json("555", "1")))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let message = OutgoingMessage::embed(Embed {
            title: Some("hello".to_string()),
            ..Embed::default()
        })
        .with_role_mention("99");

        let id = store.send(&ChannelId::from("10"), &message).await.unwrap();
        assert_eq!(id, MessageId::from("555"));
    }

    #[tokio::test]
    async fn edit_without_mentions_omits_content() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/channels/10/messages/555"))
            .and(body_partial_json(json!({
                "allowed_mentions": { "parse": [], "roles": [] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json("555", "1")))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let update = OutgoingMessage::embed(Embed::default());
        store
            .edit(&ChannelId::from("10"), &MessageId::from("555"), &update)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("content").is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_message_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/channels/10/messages/555"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Unknown Message", "code": 10008
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let err = store
            .delete(&ChannelId::from("10"), &MessageId::from("555"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn status_codes_map_to_store_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/channels/10/messages/1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/channels/10/messages/2"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/channels/10/messages/3"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let channel = ChannelId::from("10");
        let update = OutgoingMessage::default();

        let forbidden = store.edit(&channel, &MessageId::from("1"), &update).await;
        assert!(matches!(forbidden, Err(StoreError::Forbidden)));

        let limited = store.edit(&channel, &MessageId::from("2"), &update).await;
        assert!(matches!(limited, Err(StoreError::RateLimited)));

        match store.edit(&channel, &MessageId::from("3"), &update).await {
            Err(StoreError::Api { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recent_history_requests_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/10/messages"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                message_json("3", "1"),
                message_json("2", "8"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let history = store.recent_history(&ChannelId::from("10"), 25).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, MessageId::from("3"));
        assert_eq!(history[1].author.id.0, "8");
    }

    #[tokio::test]
    async fn current_user_and_channel_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "1", "username": "bot" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "10", "name": "status" })),
            )
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert_eq!(store.current_user().await.unwrap().username, "bot");
        let channel = store.fetch_channel(&ChannelId::from("10")).await.unwrap();
        assert_eq!(channel.name.as_deref(), Some("status"));
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/10/messages/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(message_json("1", "1"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let store = DiscordStore::new(&server.uri(), "secret", Duration::from_millis(100)).unwrap();
        let result = store
            .fetch_message(&ChannelId::from("10"), &MessageId::from("1"))
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }
}

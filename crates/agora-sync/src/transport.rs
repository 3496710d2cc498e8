use std::sync::Arc;

use agora_core::{Hub, NewMessage, Window};
use agora_types::api::{
    ChannelResponse, CreateChannelRequest, ErrorBody, MessageResponse, ReactionResponse,
    SendMessageRequest, UploadResponse,
};
use agora_types::models::Author;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncError;

/// The server operations a sync session needs.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn list_channels(&self, query: Option<&str>) -> Result<Vec<ChannelResponse>, SyncError>;

    /// Most recent `limit` messages, oldest first, optionally filtered by content.
    async fn list_messages(
        &self,
        channel_id: Uuid,
        limit: usize,
        query: Option<&str>,
    ) -> Result<Vec<MessageResponse>, SyncError>;

    async fn get_message(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
    ) -> Result<MessageResponse, SyncError>;

    async fn post_message(
        &self,
        channel_id: Uuid,
        request: &SendMessageRequest,
    ) -> Result<MessageResponse, SyncError>;

    async fn toggle_reaction(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionResponse, SyncError>;
}

// -- HTTP --

/// Talks to the REST API with a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.bytes().await?;
        debug!("Request failed with {}: {}", status, String::from_utf8_lossy(&body));
        Err(match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(body) => SyncError::from_body(body),
            Err(_) if status == StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
            Err(_) if status.is_server_error() => SyncError::Transient(status.to_string()),
            Err(_) => SyncError::Rejected(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )),
        })
    }

    /// Admin only.
    pub async fn create_channel(
        &self,
        request: &CreateChannelRequest,
    ) -> Result<ChannelResponse, SyncError> {
        self.send(self.client.post(self.url("/channels")).json(request))
            .await
    }

    /// Upload a file to the blob store. The returned url and kind go into
    /// [`SendMessageRequest::attachment_url`] and `attachment_type`.
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadResponse, SyncError> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send(self.client.post(self.url("/channels/upload")).multipart(form))
            .await
    }
}

#[async_trait]
impl ChannelTransport for HttpTransport {
    async fn list_channels(&self, query: Option<&str>) -> Result<Vec<ChannelResponse>, SyncError> {
        let mut req = self.client.get(self.url("/channels"));
        if let Some(q) = query {
            req = req.query(&[("query", q)]);
        }
        self.send(req).await
    }

    async fn list_messages(
        &self,
        channel_id: Uuid,
        limit: usize,
        query: Option<&str>,
    ) -> Result<Vec<MessageResponse>, SyncError> {
        let mut req = self
            .client
            .get(self.url(&format!("/channels/{channel_id}/messages")))
            .query(&[("limit", limit.to_string())]);
        if let Some(q) = query {
            req = req.query(&[("query", q)]);
        }
        self.send(req).await
    }

    async fn get_message(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
    ) -> Result<MessageResponse, SyncError> {
        self.send(
            self.client
                .get(self.url(&format!("/channels/{channel_id}/messages/{message_id}"))),
        )
        .await
    }

    async fn post_message(
        &self,
        channel_id: Uuid,
        request: &SendMessageRequest,
    ) -> Result<MessageResponse, SyncError> {
        self.send(
            self.client
                .post(self.url(&format!("/channels/{channel_id}/messages")))
                .json(request),
        )
        .await
    }

    async fn toggle_reaction(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionResponse, SyncError> {
        self.send(
            self.client
                .post(self.url(&format!(
                    "/channels/{channel_id}/messages/{message_id}/reactions"
                )))
                .query(&[("emoji", emoji)]),
        )
        .await
    }
}

// -- In-process --

/// Drives a [`Hub`] directly as a fixed identity. Used when the coordinator
/// is embedded next to the store, and in tests.
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<Hub>,
    author: Author,
}

impl LocalTransport {
    pub fn new(hub: Arc<Hub>, author: Author) -> Self {
        Self { hub, author }
    }

    pub fn author(&self) -> &Author {
        &self.author
    }
}

#[async_trait]
impl ChannelTransport for LocalTransport {
    async fn list_channels(&self, query: Option<&str>) -> Result<Vec<ChannelResponse>, SyncError> {
        Ok(self
            .hub
            .list_channels(query)
            .into_iter()
            .map(|s| ChannelResponse::new(&s.channel, s.thread_count, s.message_count))
            .collect())
    }

    async fn list_messages(
        &self,
        channel_id: Uuid,
        limit: usize,
        query: Option<&str>,
    ) -> Result<Vec<MessageResponse>, SyncError> {
        let window = match query {
            Some(q) => Window::search(limit, q),
            None => Window::latest(limit),
        };
        Ok(self
            .hub
            .messages(channel_id, &window)?
            .into_iter()
            .map(|(message, reactions)| MessageResponse::new(message, reactions))
            .collect())
    }

    async fn get_message(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
    ) -> Result<MessageResponse, SyncError> {
        let (message, reactions) = self.hub.message(channel_id, message_id)?;
        Ok(MessageResponse::new(message, reactions))
    }

    async fn post_message(
        &self,
        channel_id: Uuid,
        request: &SendMessageRequest,
    ) -> Result<MessageResponse, SyncError> {
        let new = NewMessage {
            content: request.content.clone(),
            attachment: request.attachment(),
            parent_id: request.parent_id,
            nonce: request.nonce.clone(),
        };
        let message = self.hub.post_message(channel_id, &self.author, new)?;
        Ok(MessageResponse::new(message, Default::default()))
    }

    async fn toggle_reaction(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<ReactionResponse, SyncError> {
        let users = self
            .hub
            .toggle_reaction(channel_id, message_id, self.author.user_id, emoji)?;
        Ok(ReactionResponse {
            emoji: emoji.to_string(),
            count: users.len(),
            user_ids: users.into_iter().collect(),
        })
    }
}

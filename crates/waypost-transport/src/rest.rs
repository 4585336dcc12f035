//! REST collaborator.
//!
//! [`ChatApi`] is the seam the store's runtime is generic over, so tests
//! can substitute an in-memory fake. [`HttpChatApi`] is the production
//! implementation over the waypost HTTP API.

use std::future::Future;

use serde::{Deserialize, Serialize};
use waypost_core::{ChatError, Conversation, ConversationId, Message, MessageId, UserId};

use crate::wire::{ConversationDto, MessageDto};

/// Asynchronous REST operations the store depends on.
///
/// Every method maps to one server endpoint. Implementations convert
/// transport-level failures into [`ChatError::Api`]; they never panic.
pub trait ChatApi: Send + Sync + 'static {
    /// Fetch the full conversation list.
    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, ChatError>> + Send;

    /// Create a conversation with `counterpart`, or fetch the existing
    /// one. The server is authoritative on duplicate prevention.
    fn create_or_get_conversation(
        &self,
        counterpart: &UserId,
    ) -> impl Future<Output = Result<Conversation, ChatError>> + Send;

    /// Fetch one page of a conversation's message history.
    fn fetch_messages(
        &self,
        conversation: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<Vec<Message>, ChatError>> + Send;

    /// Send a message over REST. Used as the fallback when the real-time
    /// channel is unavailable; the returned message carries the canonical
    /// id the server assigned.
    fn send_message(
        &self,
        receiver: &UserId,
        content: &str,
    ) -> impl Future<Output = Result<Message, ChatError>> + Send;

    /// Mark the given messages as read. Best-effort from the store's
    /// perspective.
    fn mark_read(
        &self,
        message_ids: &[MessageId],
    ) -> impl Future<Output = Result<(), ChatError>> + Send;

    /// Delete a conversation.
    fn delete_conversation(
        &self,
        conversation: &ConversationId,
    ) -> impl Future<Output = Result<(), ChatError>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationBody<'a> {
    counterpart_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    receiver_id: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadBody {
    message_ids: Vec<String>,
}

#[derive(Deserialize)]
struct SuccessBody {
    #[serde(default)]
    success: bool,
}

/// HTTP implementation of [`ChatApi`].
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl HttpChatApi {
    /// Create an API client for `base_url`, authenticating every request
    /// with `auth_token` as a bearer token.
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client: reqwest::Client::new(), base_url, auth_token: auth_token.into() }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.auth_token)
    }

    /// Check the response status, draining error bodies into the error
    /// message where the server provides one.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, "chat api request failed");
        Err(ChatError::Api(if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        }))
    }
}

fn api_err(e: reqwest::Error) -> ChatError {
    ChatError::Api(e.to_string())
}

impl ChatApi for HttpChatApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let response =
            self.request(reqwest::Method::GET, "/conversations").send().await.map_err(api_err)?;
        let dtos: Vec<ConversationDto> =
            Self::checked(response).await?.json().await.map_err(api_err)?;
        Ok(dtos.into_iter().map(Conversation::from).collect())
    }

    async fn create_or_get_conversation(
        &self,
        counterpart: &UserId,
    ) -> Result<Conversation, ChatError> {
        let response = self
            .request(reqwest::Method::POST, "/conversations")
            .json(&CreateConversationBody { counterpart_id: &counterpart.0 })
            .send()
            .await
            .map_err(api_err)?;
        let dto: ConversationDto = Self::checked(response).await?.json().await.map_err(api_err)?;
        Ok(dto.into())
    }

    async fn fetch_messages(
        &self,
        conversation: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let path = format!("/conversations/{}/messages", conversation.0);
        let response = self
            .request(reqwest::Method::GET, &path)
            .query(&[("page", page), ("limit", page_size)])
            .send()
            .await
            .map_err(api_err)?;
        let dtos: Vec<MessageDto> = Self::checked(response).await?.json().await.map_err(api_err)?;
        Ok(dtos.into_iter().map(Message::from).collect())
    }

    async fn send_message(&self, receiver: &UserId, content: &str) -> Result<Message, ChatError> {
        let response = self
            .request(reqwest::Method::POST, "/messages")
            .json(&SendMessageBody { receiver_id: &receiver.0, content })
            .send()
            .await
            .map_err(api_err)?;
        let dto: MessageDto = Self::checked(response).await?.json().await.map_err(api_err)?;
        Ok(dto.into())
    }

    async fn mark_read(&self, message_ids: &[MessageId]) -> Result<(), ChatError> {
        let body =
            MarkReadBody { message_ids: message_ids.iter().map(|id| id.0.clone()).collect() };
        let response = self
            .request(reqwest::Method::POST, "/messages/read")
            .json(&body)
            .send()
            .await
            .map_err(api_err)?;
        let body: SuccessBody = Self::checked(response).await?.json().await.map_err(api_err)?;
        if body.success {
            Ok(())
        } else {
            Err(ChatError::Api("mark-read reported failure".into()))
        }
    }

    async fn delete_conversation(&self, conversation: &ConversationId) -> Result<(), ChatError> {
        let path = format!("/conversations/{}", conversation.0);
        let response =
            self.request(reqwest::Method::DELETE, &path).send().await.map_err(api_err)?;
        Self::checked(response).await?;
        Ok(())
    }
}

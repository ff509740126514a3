//! HTTP transport for the chat server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parlance_protocol::{
    Acknowledgement, BranchActivated, BranchCreated, BranchList, ChatRequest, ChatResponse,
    CreateBranchRequest, ErrorBody, HistoryResponse, ReactionKind, ReactionRequest,
    ReactionUpdate, SessionQuery, SessionSummary, SessionUpdate, SessionsResponse,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use urlencoding::encode;

use crate::api::{ByteStream, ChatApi};
use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::ClientError;

pub struct HttpApi {
    http: reqwest::Client,
    base: String,
    request_timeout: Duration,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpApi {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ClientError> {
        // No overall timeout on the client: streaming bodies can run long.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base: config.chat_base(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.tokens.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = self
            .authorize(builder)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

/// Map a non-success response to an error carrying the server's message.
pub(crate) fn error_from_body(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.display_message())
        .unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => format!("HTTP {}", status.as_u16()),
        });
    ClientError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError> {
        let url = self.url("/stream");
        debug!(
            component = "http",
            event = "http.stream.open",
            url = %url,
            has_session = request.session_id.is_some(),
        );

        let response = self
            .authorize(self.http.post(&url))
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Transport(e.to_string())))
            .boxed())
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        self.call(self.http.post(self.url("/")).json(request)).await
    }

    async fn history(&self, session_id: &str, limit: u32) -> Result<HistoryResponse, ClientError> {
        let url = self.url(&format!("/history/{}", encode(session_id)));
        self.call(self.http.get(url).query(&[("limit", limit)])).await
    }

    async fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<SessionSummary>, ClientError> {
        let response: SessionsResponse = self
            .call(self.http.get(self.url("/sessions")).query(query))
            .await?;
        Ok(response.sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<Acknowledgement, ClientError> {
        let url = self.url(&format!("/sessions/{}", encode(session_id)));
        self.call(self.http.delete(url)).await
    }

    async fn update_session(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<Acknowledgement, ClientError> {
        let url = self.url(&format!("/sessions/{}", encode(session_id)));
        self.call(self.http.put(url).json(update)).await
    }

    async fn create_branch(
        &self,
        message_id: &str,
        request: &CreateBranchRequest,
    ) -> Result<BranchCreated, ClientError> {
        let url = self.url(&format!("/messages/{}/branch", encode(message_id)));
        self.call(self.http.post(url).json(request)).await
    }

    async fn list_branches(&self, session_id: &str) -> Result<BranchList, ClientError> {
        let url = self.url(&format!("/sessions/{}/branches", encode(session_id)));
        self.call(self.http.get(url)).await
    }

    async fn activate_branch(
        &self,
        session_id: &str,
        branch_id: &str,
    ) -> Result<BranchActivated, ClientError> {
        let url = self.url(&format!(
            "/sessions/{}/branch/{}/activate",
            encode(session_id),
            encode(branch_id)
        ));
        self.call(self.http.put(url)).await
    }

    async fn react(
        &self,
        message_id: &str,
        reaction: ReactionKind,
    ) -> Result<ReactionUpdate, ClientError> {
        let url = self.url(&format!("/messages/{}/reaction", encode(message_id)));
        let body = ReactionRequest {
            reaction_type: reaction,
        };
        self.call(self.http.post(url).json(&body)).await
    }
}

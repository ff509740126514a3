//! Chat server transport seam.
//!
//! Every server endpoint the runtime touches goes through `ChatApi`, so the
//! controller and managers can be driven by a scripted fake in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use parlance_protocol::{
    Acknowledgement, BranchActivated, BranchCreated, BranchList, ChatRequest, ChatResponse,
    CreateBranchRequest, HistoryResponse, ReactionKind, ReactionUpdate, SessionQuery,
    SessionSummary, SessionUpdate,
};

use crate::error::ClientError;

/// Raw body of a streaming response.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Open the incremental response channel. Resolves once the response
    /// headers arrive; the body is consumed by the caller.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError>;

    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;

    async fn history(&self, session_id: &str, limit: u32) -> Result<HistoryResponse, ClientError>;

    async fn list_sessions(&self, query: &SessionQuery)
        -> Result<Vec<SessionSummary>, ClientError>;

    async fn delete_session(&self, session_id: &str) -> Result<Acknowledgement, ClientError>;

    async fn update_session(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<Acknowledgement, ClientError>;

    async fn create_branch(
        &self,
        message_id: &str,
        request: &CreateBranchRequest,
    ) -> Result<BranchCreated, ClientError>;

    async fn list_branches(&self, session_id: &str) -> Result<BranchList, ClientError>;

    async fn activate_branch(
        &self,
        session_id: &str,
        branch_id: &str,
    ) -> Result<BranchActivated, ClientError>;

    async fn react(
        &self,
        message_id: &str,
        reaction: ReactionKind,
    ) -> Result<ReactionUpdate, ClientError>;
}

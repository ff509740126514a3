//! In-memory chat server for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parlance_protocol::{
    Acknowledgement, Branch, BranchActivated, BranchCreated, BranchList, ChatRequest,
    ChatResponse, CreateBranchRequest, HistoryResponse, Message, MessageRole, ReactionKind,
    ReactionUpdate, Reactions, SessionQuery, SessionStatus, SessionSummary, SessionUpdate,
};

use crate::api::{ByteStream, ChatApi};
use crate::error::ClientError;
use crate::sync::SessionNotifier;

pub(crate) fn message(id: &str, role: MessageRole, content: &str) -> Message {
    Message {
        id: id.to_string(),
        role,
        content: content.to_string(),
        created_at: "2025-01-01T00:00:00".to_string(),
        attachments: vec![],
        reactions: None,
        parent_message_id: None,
        branch_id: None,
        is_edited: false,
        metadata: None,
    }
}

/// SSE `data:` block for one payload.
pub(crate) fn sse(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

fn switch_active(branches: &mut [Branch], branch_id: &str) -> bool {
    if !branches.iter().any(|b| b.id == branch_id) {
        return false;
    }
    for branch in branches.iter_mut() {
        branch.is_active = branch.id == branch_id;
    }
    true
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    streams: VecDeque<(Vec<Result<Bytes, ClientError>>, bool)>,
    sends: VecDeque<ChatResponse>,
    histories: HashMap<String, Vec<Message>>,
    sessions: Vec<SessionSummary>,
    branches: HashMap<String, Vec<Branch>>,
    reactions: HashMap<String, Reactions>,
    failures: HashMap<&'static str, VecDeque<ClientError>>,
    branch_seq: usize,
}

/// Scripted `ChatApi`. Every call is recorded as `op` or `op:arg`.
#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a streaming body delivered as the given chunks.
    pub fn script_stream<S: AsRef<str>>(&self, chunks: &[S]) {
        let chunks = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_ref().as_bytes())))
            .collect();
        self.state.lock().unwrap().streams.push_back((chunks, false));
    }

    /// Queue a body that delivers the chunks and then never ends.
    pub fn script_stalled_stream<S: AsRef<str>>(&self, chunks: &[S]) {
        let chunks = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_ref().as_bytes())))
            .collect();
        self.state.lock().unwrap().streams.push_back((chunks, true));
    }

    /// Queue a body that delivers the chunks and then fails.
    pub fn script_stream_then_drop<S: AsRef<str>>(&self, chunks: &[S]) {
        let mut items: Vec<Result<Bytes, ClientError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_ref().as_bytes())))
            .collect();
        items.push(Err(ClientError::Transport("connection reset".to_string())));
        self.state.lock().unwrap().streams.push_back((items, false));
    }

    pub fn script_send(&self, response: ChatResponse) {
        self.state.lock().unwrap().sends.push_back(response);
    }

    pub fn set_history(&self, session_id: &str, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(session_id.to_string(), messages);
    }

    pub fn add_session(&self, id: &str, title: &str) {
        self.state.lock().unwrap().sessions.push(SessionSummary {
            id: id.to_string(),
            title: Some(title.to_string()),
            description: None,
            category: "general".to_string(),
            tags: vec![],
            status: SessionStatus::Active,
            is_pinned: false,
            is_favorite: false,
            message_count: 0,
            last_activity: None,
            created_at: None,
            active_branch_id: None,
            branches: vec![],
        });
    }

    pub fn session(&self, id: &str) -> Option<SessionSummary> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn add_branch(&self, session_id: &str, branch_id: &str, active: bool) {
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(session_id.to_string())
            .or_default()
            .push(Branch {
                id: branch_id.to_string(),
                name: Some(format!("Branch {branch_id}")),
                parent_message_id: "m0".to_string(),
                created_at: None,
                message_count: 2,
                is_active: active,
            });
    }

    /// Switch the active branch as another client would, unrecorded.
    pub fn switch_branch_elsewhere(&self, session_id: &str, branch_id: &str) {
        let mut state = self.state.lock().unwrap();
        let branches = state.branches.entry(session_id.to_string()).or_default();
        assert!(switch_active(branches, branch_id), "unknown branch {branch_id}");
    }

    pub fn active_branches(&self, session_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(session_id)
            .map(|bs| {
                bs.iter()
                    .filter(|b| b.is_active)
                    .map(|b| b.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fail_next(&self, op: &'static str, error: ClientError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls to `op`, with any argument.
    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&format!("{op}:")))
            .count()
    }

    fn record(&self, op: &'static str, arg: Option<&str>) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(match arg {
            Some(arg) => format!("{op}:{arg}"),
            None => op.to_string(),
        });
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError> {
        self.record("open_stream", request.session_id.as_deref())?;
        let (chunks, stall) = self
            .state
            .lock()
            .unwrap()
            .streams
            .pop_front()
            .ok_or_else(|| ClientError::Transport("no scripted stream".to_string()))?;
        let body = futures::stream::iter(chunks);
        if stall {
            Ok(body.chain(futures::stream::pending()).boxed())
        } else {
            Ok(body.boxed())
        }
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        self.record("send_message", request.session_id.as_deref())?;
        self.state
            .lock()
            .unwrap()
            .sends
            .pop_front()
            .ok_or_else(|| ClientError::Transport("no scripted reply".to_string()))
    }

    async fn history(&self, session_id: &str, _limit: u32) -> Result<HistoryResponse, ClientError> {
        self.record("history", Some(session_id))?;
        let messages = self
            .state
            .lock()
            .unwrap()
            .histories
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        Ok(HistoryResponse {
            session_id: session_id.to_string(),
            messages,
        })
    }

    async fn list_sessions(
        &self,
        _query: &SessionQuery,
    ) -> Result<Vec<SessionSummary>, ClientError> {
        self.record("list_sessions", None)?;
        Ok(self.state.lock().unwrap().sessions.clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<Acknowledgement, ClientError> {
        self.record("delete_session", Some(session_id))?;
        let mut state = self.state.lock().unwrap();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != session_id);
        if state.sessions.len() == before {
            return Err(ClientError::Http {
                status: 404,
                message: "Session not found".to_string(),
            });
        }
        Ok(Acknowledgement {
            message: Some("Session deleted successfully".to_string()),
            session_id: None,
        })
    }

    async fn update_session(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<Acknowledgement, ClientError> {
        self.record("update_session", Some(session_id))?;
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) else {
            return Err(ClientError::Http {
                status: 404,
                message: "Session not found".to_string(),
            });
        };
        if let Some(title) = &update.title {
            session.title = Some(title.clone());
        }
        if let Some(fav) = update.is_favorite {
            session.is_favorite = fav;
        }
        if let Some(pinned) = update.is_pinned {
            session.is_pinned = pinned;
        }
        if let Some(status) = update.status {
            session.status = status;
        }
        Ok(Acknowledgement {
            message: Some("Session updated successfully".to_string()),
            session_id: Some(session_id.to_string()),
        })
    }

    async fn create_branch(
        &self,
        message_id: &str,
        request: &CreateBranchRequest,
    ) -> Result<BranchCreated, ClientError> {
        self.record("create_branch", Some(message_id))?;
        let mut state = self.state.lock().unwrap();
        state.branch_seq += 1;
        let branch_id = format!("b-new-{}", state.branch_seq);
        Ok(BranchCreated {
            branch_id,
            branch_name: Some(
                request
                    .branch_name
                    .clone()
                    .unwrap_or_else(|| format!("Branch {}", state.branch_seq)),
            ),
            parent_message_id: Some("m0".to_string()),
            edited_message_id: Some(format!("edited-{message_id}")),
            ai_response_id: None,
            ai_response: None,
        })
    }

    async fn list_branches(&self, session_id: &str) -> Result<BranchList, ClientError> {
        self.record("list_branches", Some(session_id))?;
        let branches = self
            .state
            .lock()
            .unwrap()
            .branches
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        Ok(BranchList {
            session_id: session_id.to_string(),
            active_branch_id: branches.iter().find(|b| b.is_active).map(|b| b.id.clone()),
            total_branches: branches.len() as u64,
            branches,
        })
    }

    async fn activate_branch(
        &self,
        session_id: &str,
        branch_id: &str,
    ) -> Result<BranchActivated, ClientError> {
        self.record("activate_branch", Some(&format!("{session_id}/{branch_id}")))?;
        let mut state = self.state.lock().unwrap();
        let branches = state.branches.entry(session_id.to_string()).or_default();
        // Re-activating the active branch succeeds; unknown ids are 404.
        if !switch_active(branches, branch_id) {
            return Err(ClientError::Http {
                status: 404,
                message: "Branch not found".to_string(),
            });
        }
        Ok(BranchActivated {
            session_id: session_id.to_string(),
            active_branch_id: branch_id.to_string(),
            message: Some("Branch activated successfully".to_string()),
        })
    }

    async fn react(
        &self,
        message_id: &str,
        reaction: ReactionKind,
    ) -> Result<ReactionUpdate, ClientError> {
        self.record("react", Some(message_id))?;
        let mut state = self.state.lock().unwrap();
        let counts = state.reactions.entry(message_id.to_string()).or_default();
        *counts.entry(reaction.as_str().to_string()).or_insert(0) += 1;
        Ok(ReactionUpdate {
            message_id: message_id.to_string(),
            reactions: counts.clone(),
            user_reaction: Some(reaction),
        })
    }
}

/// Notifier that only counts.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    count: AtomicUsize,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl SessionNotifier for RecordingNotifier {
    fn sessions_changed(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

//! Streaming session controller
//!
//! Drives one assistant reply at a time: Idle → Streaming → Completed | Failed.
//! Frames are handled strictly in arrival order. Text deltas go to the Store
//! as partial text; side-channel frames go only to the observer. A completed
//! reply is followed by exactly one history reload, which replaces the
//! preview with the server's record.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use parlance_protocol::{
    new_id, Attachment, ChatRequest, CompletePayload, ConversationType, MemoryNotice, Message,
    MessageRole, RoutingDecision, TokenUsage, ToolInvocation, ToolResult,
};
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::auth::TokenProvider;
use crate::error::ClientError;
use crate::frame::{decode_payload, Decoded, StreamEvent};
use crate::history;
use crate::sse::SseParser;
use crate::store::{Action, Store};
use crate::sync::SessionNotifier;
use crate::tools::{ToolCallAssembler, ToolTracker};

/// Prefix of ids given to messages shown before the server confirms them.
pub const LOCAL_MESSAGE_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamPhase {
    Idle = 0,
    Streaming = 1,
    Completed = 2,
    Failed = 3,
}

impl StreamPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamPhase::Streaming,
            2 => StreamPhase::Completed,
            3 => StreamPhase::Failed,
            _ => StreamPhase::Idle,
        }
    }
}

/// Lifecycle callbacks. All methods default to no-ops.
#[allow(unused_variables)]
pub trait StreamObserver: Send {
    fn on_chunk(&mut self, delta: &str, accumulated: &str) {}
    fn on_complete(&mut self, payload: &CompletePayload) {}
    fn on_error(&mut self, error: &ClientError) {}
    /// The server minted a session for this conversation; navigate to it.
    fn on_session_created(&mut self, session_id: &str) {}
    /// Early session announcement, before the reply finishes.
    fn on_session_announced(&mut self, session_id: &str) {}
    fn on_memories(&mut self, memories: &[MemoryNotice]) {}
    fn on_routing(&mut self, routing: &RoutingDecision) {}
    fn on_tools_enabled(&mut self, count: u32) {}
    /// Fires for every fragment with the call as merged so far.
    fn on_tool_call(&mut self, call: &ToolInvocation) {}
    fn on_tool_result(&mut self, result: &ToolResult) {}
    fn on_notice(&mut self, message: &str, model: Option<&str>) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl StreamObserver for Silent {}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub model: Option<String>,
    pub conversation_type: Option<ConversationType>,
    pub attachments: Vec<Attachment>,
    /// Show the user's message in the Store before the server confirms it.
    pub optimistic: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            model: None,
            conversation_type: None,
            attachments: Vec::new(),
            optimistic: true,
        }
    }
}

/// Result of a finished reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub payload: CompletePayload,
    /// Text accumulated from deltas (empty for non-streaming sends).
    pub accumulated: String,
    pub session_created: bool,
}

/// Legacy end-of-reply data held until the sentinel or end of body.
struct ReplyFinished {
    reply: Option<String>,
    usage: Option<TokenUsage>,
    provider: Option<String>,
}

/// Per-call mutable state. Lives on the stack of `stream()`.
struct Run<'a> {
    observer: &'a mut dyn StreamObserver,
    accumulated: String,
    announced_session: Option<String>,
    reply_finished: Option<ReplyFinished>,
    tool_calls: ToolCallAssembler,
}

/// Releases the controller if the reply future is dropped mid-stream.
struct Claim<'c> {
    controller: &'c StreamController,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let c = self.controller;
        if c.phase
            .compare_exchange(
                StreamPhase::Streaming as u8,
                StreamPhase::Idle as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            debug!(
                component = "stream",
                event = "stream.abandoned",
                "Reply dropped before a terminal frame"
            );
            c.tools.clear();
            c.store.dispatch(Action::SetTyping(false));
            c.store.dispatch(Action::SetLoading(false));
        }
    }
}

enum Step {
    Continue,
    Complete(CompletePayload),
    Fail(ClientError),
    End,
}

pub struct StreamController {
    api: Arc<dyn ChatApi>,
    store: Store,
    tokens: Arc<dyn TokenProvider>,
    notifier: Arc<dyn SessionNotifier>,
    tools: ToolTracker,
    phase: AtomicU8,
    history_limit: u32,
    unsent: ArcSwapOption<String>,
}

impl StreamController {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Store,
        tokens: Arc<dyn TokenProvider>,
        notifier: Arc<dyn SessionNotifier>,
        history_limit: u32,
    ) -> Self {
        Self {
            api,
            store,
            tokens,
            notifier,
            tools: ToolTracker::new(),
            phase: AtomicU8::new(StreamPhase::Idle as u8),
            history_limit,
            unsent: ArcSwapOption::empty(),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        StreamPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_streaming(&self) -> bool {
        self.phase() == StreamPhase::Streaming
    }

    pub fn tool_call_active(&self) -> bool {
        self.tools.is_active()
    }

    /// Shared view of the tool activity flag.
    pub fn tools(&self) -> ToolTracker {
        self.tools.clone()
    }

    /// Text of the last message whose reply failed, kept for resubmission.
    pub fn unsent_message(&self) -> Option<String> {
        self.unsent.load_full().map(|text| text.as_ref().clone())
    }

    /// Send `text` and stream the reply.
    ///
    /// `session_id = None` lets the server mint a session; the minted id is
    /// adopted on completion. A given session id becomes the Store's current
    /// conversation before the request goes out.
    pub async fn stream(
        &self,
        text: &str,
        session_id: Option<&str>,
        observer: &mut dyn StreamObserver,
        options: StreamOptions,
    ) -> Result<Completion, ClientError> {
        let request = self.begin(text, session_id, &options)?;
        let _claim = Claim { controller: self };

        info!(
            component = "stream",
            event = "stream.started",
            session_id = ?session_id,
            chars = text.chars().count(),
            "Streaming reply"
        );

        let mut run = Run {
            observer,
            accumulated: String::new(),
            announced_session: None,
            reply_finished: None,
            tool_calls: ToolCallAssembler::new(),
        };

        let body = match self.api.open_stream(&request).await {
            Ok(body) => body,
            Err(err) => return Err(self.fail(err, text, run.observer)),
        };

        let payload = match self.consume(body, session_id, &mut run).await {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err, text, run.observer)),
        };

        Ok(self
            .finish(payload, session_id, run.accumulated, run.observer)
            .await)
    }

    /// Send `text` through the non-streaming endpoint. Same completion
    /// contract as `stream`.
    pub async fn send(
        &self,
        text: &str,
        session_id: Option<&str>,
        observer: &mut dyn StreamObserver,
        options: StreamOptions,
    ) -> Result<Completion, ClientError> {
        let request = self.begin(text, session_id, &options)?;
        let _claim = Claim { controller: self };

        match self.api.send_message(&request).await {
            Ok(response) => Ok(self
                .finish(response.into(), session_id, String::new(), observer)
                .await),
            Err(err) => Err(self.fail(err, text, observer)),
        }
    }

    /// Validate, claim the controller and prime the Store.
    fn begin(
        &self,
        text: &str,
        session_id: Option<&str>,
        options: &StreamOptions,
    ) -> Result<ChatRequest, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::validation("Message cannot be empty"));
        }
        if session_id.is_some_and(|id| id.trim().is_empty()) {
            return Err(ClientError::validation("Session id cannot be blank"));
        }
        if !self.tokens.is_authenticated() {
            return Err(ClientError::Unauthenticated);
        }

        let current = self.phase.load(Ordering::SeqCst);
        if current == StreamPhase::Streaming as u8
            || self
                .phase
                .compare_exchange(
                    current,
                    StreamPhase::Streaming as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
        {
            return Err(ClientError::validation("A reply is already streaming"));
        }

        self.tools.clear();
        self.unsent.store(None);

        self.store.dispatch(Action::SetError(None));
        if let Some(id) = session_id {
            self.switch_to(id);
        }
        if options.optimistic {
            self.store
                .dispatch(Action::AppendMessage(optimistic_message(text, options)));
        }
        self.store.dispatch(Action::SetPartialText(String::new()));
        self.store.dispatch(Action::SetTyping(true));
        self.store.dispatch(Action::SetLoading(true));

        Ok(ChatRequest {
            message: text.to_string(),
            session_id: session_id.map(str::to_string),
            attachments: (!options.attachments.is_empty()).then(|| options.attachments.clone()),
            model: options.model.clone(),
            conversation_type: options.conversation_type,
            max_tokens: None,
            temperature: None,
        })
    }

    /// Make `session_id` the Store's conversation so the reply and its
    /// reload land there. Messages of another conversation are dropped.
    fn switch_to(&self, session_id: &str) {
        if self.store.current_session_id().as_deref() == Some(session_id) {
            return;
        }
        debug!(
            component = "stream",
            event = "stream.session.switched",
            session_id = %session_id,
        );
        self.store
            .dispatch(Action::SetCurrentSession(Some(session_id.to_string())));
        self.store.dispatch(Action::SetMessages(Vec::new()));
    }

    /// Read the body to its terminal frame.
    async fn consume(
        &self,
        mut body: crate::api::ByteStream,
        session_id: Option<&str>,
        run: &mut Run<'_>,
    ) -> Result<CompletePayload, ClientError> {
        let mut parser = SseParser::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for payload in parser.feed(&chunk) {
                match self.handle_payload(&payload, run)? {
                    Step::Continue => {}
                    Step::Complete(done) => return Ok(done),
                    Step::Fail(err) => return Err(err),
                    Step::End => return self.legacy_completion(session_id, run),
                }
            }
        }

        if let Some(payload) = parser.flush() {
            match self.handle_payload(&payload, run)? {
                Step::Complete(done) => return Ok(done),
                Step::Fail(err) => return Err(err),
                Step::Continue | Step::End => {}
            }
        }

        self.legacy_completion(session_id, run)
    }

    fn handle_payload(&self, payload: &str, run: &mut Run<'_>) -> Result<Step, ClientError> {
        let events = match decode_payload(payload)? {
            Decoded::Events(events) => events,
            Decoded::Skipped => return Ok(Step::Continue),
            Decoded::End => return Ok(Step::End),
        };

        for event in events {
            match event {
                StreamEvent::TextDelta(delta) => {
                    if delta.is_empty() {
                        continue;
                    }
                    run.accumulated.push_str(&delta);
                    self.store
                        .dispatch(Action::SetPartialText(run.accumulated.clone()));
                    run.observer.on_chunk(&delta, &run.accumulated);
                }
                StreamEvent::SessionAssigned(id) => {
                    run.observer.on_session_announced(&id);
                    run.announced_session = Some(id);
                }
                StreamEvent::MemoriesExtracted(memories) => run.observer.on_memories(&memories),
                StreamEvent::RoutingSelected(routing) => {
                    debug!(
                        component = "stream",
                        event = "stream.routing",
                        model = %routing.model,
                    );
                    run.observer.on_routing(&routing);
                }
                StreamEvent::ToolsEnabled(count) => run.observer.on_tools_enabled(count),
                StreamEvent::ToolCall(delta) => {
                    if let Some(call) = run.tool_calls.apply(delta, &self.tools) {
                        run.observer.on_tool_call(&call);
                    }
                }
                StreamEvent::ToolResult(result) => {
                    run.tool_calls.resolve(&result.name, &self.tools);
                    run.observer.on_tool_result(&result);
                }
                StreamEvent::Notice { message, model } => {
                    run.observer.on_notice(&message, model.as_deref())
                }
                StreamEvent::ReplyFinished {
                    reply,
                    usage,
                    provider,
                } => {
                    run.reply_finished = Some(ReplyFinished {
                        reply,
                        usage,
                        provider,
                    });
                }
                StreamEvent::Complete(payload) => return Ok(Step::Complete(payload)),
                StreamEvent::Error(message) => {
                    return Ok(Step::Fail(ClientError::Server(message)))
                }
            }
        }

        Ok(Step::Continue)
    }

    /// Body ended without `complete`. A preceding `done` frame plus a known
    /// session id still counts as a finished reply.
    fn legacy_completion(
        &self,
        session_id: Option<&str>,
        run: &mut Run<'_>,
    ) -> Result<CompletePayload, ClientError> {
        let Some(finished) = run.reply_finished.take() else {
            return Err(ClientError::StreamInterrupted);
        };
        let Some(session_id) = run
            .announced_session
            .clone()
            .or_else(|| session_id.map(str::to_string))
        else {
            return Err(ClientError::StreamInterrupted);
        };

        debug!(
            component = "stream",
            event = "stream.legacy_completion",
            session_id = %session_id,
        );

        Ok(CompletePayload {
            session_id,
            message_id: None,
            reply: finished.reply.or_else(|| Some(run.accumulated.clone())),
            model: None,
            provider: finished.provider,
            usage: finished.usage,
            routing: None,
            tool_calls: 0,
        })
    }

    async fn finish(
        &self,
        payload: CompletePayload,
        session_id: Option<&str>,
        accumulated: String,
        observer: &mut dyn StreamObserver,
    ) -> Completion {
        let session_created = session_id.is_none();
        if session_created {
            self.store
                .dispatch(Action::SetCurrentSession(Some(payload.session_id.clone())));
            observer.on_session_created(&payload.session_id);
        }

        self.tools.clear();
        self.store.dispatch(Action::SetTyping(false));
        self.store.dispatch(Action::SetLoading(false));
        self.phase
            .store(StreamPhase::Completed as u8, Ordering::SeqCst);

        info!(
            component = "stream",
            event = "stream.completed",
            session_id = %payload.session_id,
            message_id = ?payload.message_id,
            session_created = session_created,
            "Reply complete"
        );
        observer.on_complete(&payload);

        self.reload(&payload.session_id).await;
        self.notifier.sessions_changed();

        Completion {
            payload,
            accumulated,
            session_created,
        }
    }

    /// The one mandatory history reload after a completed reply.
    async fn reload(&self, session_id: &str) {
        let result = history::reload(
            self.api.as_ref(),
            &self.store,
            session_id,
            self.history_limit,
        )
        .await;

        if let Err(err) = result {
            warn!(
                component = "stream",
                event = "stream.reload.failed",
                session_id = %session_id,
                error = %err,
                "History reload after reply failed"
            );
            self.store.dispatch(Action::SetError(Some(format!(
                "Failed to refresh conversation: {}",
                err.user_message()
            ))));
        }
    }

    fn fail(&self, err: ClientError, text: &str, observer: &mut dyn StreamObserver) -> ClientError {
        warn!(
            component = "stream",
            event = "stream.failed",
            error = %err,
            "Reply failed"
        );
        self.tools.clear();
        self.phase.store(StreamPhase::Failed as u8, Ordering::SeqCst);
        self.unsent.store(Some(Arc::new(text.to_string())));
        self.store
            .dispatch(Action::SetError(Some(err.user_message())));
        observer.on_error(&err);
        err
    }
}

fn optimistic_message(text: &str, options: &StreamOptions) -> Message {
    Message {
        id: format!("{LOCAL_MESSAGE_PREFIX}{}", new_id()),
        role: MessageRole::User,
        content: text.to_string(),
        created_at: now_stamp(),
        attachments: options.attachments.clone(),
        reactions: None,
        parent_message_id: None,
        branch_id: None,
        is_edited: false,
        metadata: None,
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

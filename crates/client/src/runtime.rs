//! Runtime wiring
//!
//! One Store, one synchronizer, one transport, shared by the controller, the
//! branch manager and the session directory.

use std::sync::Arc;

use parlance_protocol::{SessionQuery, SessionSummary};
use tracing::info;

use crate::api::ChatApi;
use crate::auth::TokenProvider;
use crate::branches::BranchManager;
use crate::config::ClientConfig;
use crate::controller::{Completion, StreamController, StreamObserver, StreamOptions};
use crate::error::ClientError;
use crate::history;
use crate::http::HttpApi;
use crate::sessions::SessionDirectory;
use crate::store::{Action, Store};
use crate::sync::{SessionListWatch, SessionSync};

pub struct Runtime {
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    store: Store,
    sync: SessionSync,
    controller: StreamController,
    branches: BranchManager,
    sessions: SessionDirectory,
}

impl Runtime {
    /// Build a runtime talking HTTP to `config.api_url`.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ClientError> {
        let api: Arc<dyn ChatApi> = Arc::new(HttpApi::new(&config, tokens.clone())?);
        Ok(Self::with_api(config, api, tokens))
    }

    pub fn with_api(
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let store = Store::new();
        let sync = SessionSync::new();
        let notifier = Arc::new(sync.clone());
        let limit = config.history_limit();

        let controller =
            StreamController::new(api.clone(), store.clone(), tokens, notifier.clone(), limit);
        let branches = BranchManager::new(api.clone(), store.clone(), notifier.clone(), limit);
        let sessions = SessionDirectory::new(api.clone(), store.clone(), notifier);

        Self {
            config,
            api,
            store,
            sync,
            controller,
            branches,
            sessions,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn branches(&self) -> &BranchManager {
        &self.branches
    }

    pub fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    pub fn sync(&self) -> &SessionSync {
        &self.sync
    }

    /// Load `session_id` as the current conversation, replacing any
    /// messages already in the Store.
    pub async fn open_session(&self, session_id: &str) -> Result<(), ClientError> {
        if session_id.trim().is_empty() {
            return Err(ClientError::validation("Session id is required"));
        }

        info!(
            component = "runtime",
            event = "session.open",
            session_id = %session_id,
            "Opening session"
        );
        self.store.dispatch(Action::SetError(None));
        self.store
            .dispatch(Action::SetCurrentSession(Some(session_id.to_string())));
        self.store.dispatch(Action::SetMessages(Vec::new()));

        let result = history::reload(
            self.api.as_ref(),
            &self.store,
            session_id,
            self.config.history_limit(),
        )
        .await;
        if let Err(err) = &result {
            self.store
                .dispatch(Action::SetError(Some(err.user_message())));
        }
        result
    }

    /// Start an empty conversation; the server mints its session on first send.
    pub fn new_chat(&self) {
        self.store.dispatch(Action::Reset);
    }

    /// Stream a reply in the current conversation (or a new one).
    pub async fn send(
        &self,
        text: &str,
        observer: &mut dyn StreamObserver,
        options: StreamOptions,
    ) -> Result<Completion, ClientError> {
        let session_id = self.store.current_session_id();
        self.controller
            .stream(text, session_id.as_deref(), observer, options)
            .await
    }

    /// Keep a session list fresh for as long as the returned watch lives.
    pub fn watch_sessions<F>(&self, query: SessionQuery, sink: F) -> SessionListWatch
    where
        F: FnMut(Result<Vec<SessionSummary>, ClientError>) + Send + 'static,
    {
        SessionListWatch::start(self.api.clone(), &self.sync, query, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::controller::Silent;
    use crate::store::StoreState;
    use crate::testing::{message, sse, FakeApi};
    use parlance_protocol::MessageRole;
    use tokio::sync::broadcast::error::TryRecvError;

    fn runtime() -> (Arc<FakeApi>, Runtime) {
        let api = Arc::new(FakeApi::new());
        let runtime = Runtime::with_api(
            ClientConfig::default(),
            api.clone(),
            Arc::new(StaticToken::new(Some("token".into()))),
        );
        (api, runtime)
    }

    #[tokio::test]
    async fn first_message_mints_session_reloads_once_and_publishes_once() {
        let (api, rt) = runtime();
        let mut changes = rt.sync().subscribe();
        api.set_history(
            "s1",
            vec![
                message("u1", MessageRole::User, "Hi"),
                message("m1", MessageRole::Assistant, "Hello!"),
            ],
        );
        api.script_stream(&[sse(
            r#"{"type":"complete","session_id":"s1","message_id":"m1","reply":"Hello!"}"#,
        )]);

        let done = rt
            .send("Hi", &mut Silent, StreamOptions::default())
            .await
            .expect("send");

        assert!(done.session_created);
        assert_eq!(rt.store().current_session_id().as_deref(), Some("s1"));
        assert_eq!(api.calls(), vec!["open_stream", "history:s1"]);
        assert!(changes.try_recv().is_ok());
        assert_eq!(changes.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn follow_up_uses_current_session() {
        let (api, rt) = runtime();
        api.script_stream(&[sse(r#"{"type":"complete","session_id":"s1"}"#)]);
        api.script_stream(&[sse(r#"{"type":"complete","session_id":"s1"}"#)]);

        rt.send("one", &mut Silent, StreamOptions::default())
            .await
            .expect("first");
        let second = rt
            .send("two", &mut Silent, StreamOptions::default())
            .await
            .expect("second");

        assert!(!second.session_created);
        assert_eq!(
            api.calls(),
            vec!["open_stream", "history:s1", "open_stream:s1", "history:s1"]
        );
    }

    #[tokio::test]
    async fn open_session_replaces_messages() {
        let (api, rt) = runtime();
        api.set_history("s2", vec![message("m1", MessageRole::User, "old")]);
        rt.store()
            .dispatch(Action::AppendMessage(message("x", MessageRole::User, "stale")));

        rt.open_session("s2").await.expect("open");

        let state = rt.store().snapshot();
        assert_eq!(state.current_session_id.as_deref(), Some("s2"));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].id, "m1");
    }

    #[tokio::test]
    async fn open_session_failure_is_recorded() {
        let (api, rt) = runtime();
        api.fail_next(
            "history",
            ClientError::Http {
                status: 404,
                message: "Session not found".into(),
            },
        );

        assert!(rt.open_session("gone").await.is_err());
        assert_eq!(
            rt.store().snapshot().error.as_deref(),
            Some("Session not found")
        );
    }

    #[tokio::test]
    async fn new_chat_resets_store() {
        let (_api, rt) = runtime();
        rt.store()
            .dispatch(Action::SetCurrentSession(Some("s1".into())));
        rt.new_chat();
        assert_eq!(*rt.store().snapshot(), StoreState::default());
    }
}

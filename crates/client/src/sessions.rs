//! Session management intents and message reactions.

use std::sync::Arc;

use parlance_protocol::{
    MessageChanges, ReactionKind, ReactionUpdate, SessionQuery, SessionStatus, SessionSummary,
    SessionUpdate,
};
use tracing::info;

use crate::api::ChatApi;
use crate::error::ClientError;
use crate::store::{Action, Store};
use crate::sync::SessionNotifier;

const MAX_LIST_LIMIT: u32 = 100;

pub struct SessionDirectory {
    api: Arc<dyn ChatApi>,
    store: Store,
    notifier: Arc<dyn SessionNotifier>,
}

impl SessionDirectory {
    pub fn new(api: Arc<dyn ChatApi>, store: Store, notifier: Arc<dyn SessionNotifier>) -> Self {
        Self {
            api,
            store,
            notifier,
        }
    }

    pub async fn list(&self, query: &SessionQuery) -> Result<Vec<SessionSummary>, ClientError> {
        let mut query = query.clone();
        query.limit = query.limit.clamp(1, MAX_LIST_LIMIT);
        query.query = query
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        self.api.list_sessions(&query).await
    }

    /// Delete a session. Deleting the loaded session also clears the Store.
    pub async fn delete(&self, session_id: &str) -> Result<(), ClientError> {
        require_id(session_id)?;
        self.api.delete_session(session_id).await?;

        if self.store.current_session_id().as_deref() == Some(session_id) {
            self.store.dispatch(Action::Reset);
        }
        info!(
            component = "sessions",
            event = "session.deleted",
            session_id = %session_id,
            "Session deleted"
        );
        self.notifier.sessions_changed();
        Ok(())
    }

    pub async fn rename(&self, session_id: &str, title: &str) -> Result<(), ClientError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::validation("Title cannot be empty"));
        }
        self.update(
            session_id,
            SessionUpdate {
                title: Some(title.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_favorite(&self, session_id: &str, favorite: bool) -> Result<(), ClientError> {
        self.update(
            session_id,
            SessionUpdate {
                is_favorite: Some(favorite),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_pinned(&self, session_id: &str, pinned: bool) -> Result<(), ClientError> {
        self.update(
            session_id,
            SessionUpdate {
                is_pinned: Some(pinned),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn archive(&self, session_id: &str) -> Result<(), ClientError> {
        self.update(
            session_id,
            SessionUpdate {
                status: Some(SessionStatus::Archived),
                ..Default::default()
            },
        )
        .await
    }

    /// Apply a partial update; unset fields keep their server values.
    pub async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<(), ClientError> {
        require_id(session_id)?;
        if update.is_empty() {
            return Err(ClientError::validation("Nothing to update"));
        }
        self.api.update_session(session_id, &update).await?;
        info!(
            component = "sessions",
            event = "session.updated",
            session_id = %session_id,
            "Session updated"
        );
        self.notifier.sessions_changed();
        Ok(())
    }

    /// React to a message and patch the Store's copy with the new counts.
    pub async fn react(
        &self,
        message_id: &str,
        reaction: ReactionKind,
    ) -> Result<ReactionUpdate, ClientError> {
        if message_id.trim().is_empty() {
            return Err(ClientError::validation("Message id is required"));
        }
        let update = self.api.react(message_id, reaction).await?;
        self.store.dispatch(Action::PatchMessage {
            message_id: update.message_id.clone(),
            changes: MessageChanges {
                reactions: Some(update.reactions.clone()),
                ..Default::default()
            },
        });
        Ok(update)
    }
}

fn require_id(session_id: &str) -> Result<(), ClientError> {
    if session_id.trim().is_empty() {
        Err(ClientError::validation("Session id is required"))
    } else {
        Ok(())
    }
}

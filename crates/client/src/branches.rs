//! Conversation branches
//!
//! A branch is an alternate continuation rooted at an edited message. The
//! server owns branch state; this manager validates intents, remembers the
//! last known active branch per session, and keeps the Store in step when the
//! branch belongs to the loaded conversation.

use std::sync::Arc;

use dashmap::DashMap;
use parlance_protocol::{Branch, BranchCreated, CreateBranchRequest};
use tracing::{info, warn};

use crate::api::ChatApi;
use crate::error::ClientError;
use crate::history;
use crate::store::Store;
use crate::sync::SessionNotifier;

/// Outcome of an activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchActivation {
    pub session_id: String,
    pub active_branch_id: String,
    /// False when the branch was already known to be active.
    pub changed: bool,
}

pub struct BranchManager {
    api: Arc<dyn ChatApi>,
    store: Store,
    notifier: Arc<dyn SessionNotifier>,
    history_limit: u32,
    /// session id → last known active branch id
    active: DashMap<String, String>,
}

impl BranchManager {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Store,
        notifier: Arc<dyn SessionNotifier>,
        history_limit: u32,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            history_limit,
            active: DashMap::new(),
        }
    }

    /// Fork the conversation at `message_id` with `content` as the edited
    /// message. The source message is left untouched.
    pub async fn create_branch(
        &self,
        message_id: &str,
        content: &str,
        name: Option<&str>,
    ) -> Result<BranchCreated, ClientError> {
        if message_id.trim().is_empty() {
            return Err(ClientError::validation("Message id is required"));
        }
        if content.trim().is_empty() {
            return Err(ClientError::validation("Edited message cannot be empty"));
        }

        let request = CreateBranchRequest {
            new_content: content.to_string(),
            branch_name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        };

        let created = self
            .api
            .create_branch(message_id, &request)
            .await
            .inspect_err(|err| {
                warn!(
                    component = "branches",
                    event = "branch.create.failed",
                    message_id = %message_id,
                    error = %err,
                    "Branch creation failed"
                );
            })?;

        info!(
            component = "branches",
            event = "branch.created",
            message_id = %message_id,
            branch_id = %created.branch_id,
            "Branch created"
        );

        // The server makes a new branch active for its session.
        match self.session_of_loaded_message(message_id) {
            Some(session_id) => {
                self.active
                    .insert(session_id.clone(), created.branch_id.clone());
                self.reload_current(&session_id).await;
            }
            None => self.active.clear(),
        }

        self.notifier.sessions_changed();
        Ok(created)
    }

    /// Branches of `session_id` in server order.
    pub async fn list_branches(&self, session_id: &str) -> Result<Vec<Branch>, ClientError> {
        if session_id.trim().is_empty() {
            return Err(ClientError::validation("Session id is required"));
        }

        let list = self.api.list_branches(session_id).await?;

        let active: Vec<&str> = list
            .branches
            .iter()
            .filter(|b| b.is_active)
            .map(|b| b.id.as_str())
            .collect();
        if active.len() > 1 {
            warn!(
                component = "branches",
                event = "branch.list.multiple_active",
                session_id = %session_id,
                active = ?active,
                "Server reported more than one active branch"
            );
        }

        match list.active_id() {
            Some(id) => {
                self.active.insert(session_id.to_string(), id.to_string());
            }
            None => {
                self.active.remove(session_id);
            }
        }

        Ok(list.branches)
    }

    /// Make `branch_id` the active continuation of `session_id`.
    ///
    /// The server is always asked, since another client may have switched
    /// branches since this manager last looked. Activating the branch that is
    /// already active succeeds without error.
    pub async fn activate_branch(
        &self,
        session_id: &str,
        branch_id: &str,
    ) -> Result<BranchActivation, ClientError> {
        if session_id.trim().is_empty() {
            return Err(ClientError::validation("Session id is required"));
        }
        if branch_id.trim().is_empty() {
            return Err(ClientError::validation("Branch id is required"));
        }

        let previous = self.known_active(session_id);

        match self.api.activate_branch(session_id, branch_id).await {
            Ok(activated) => {
                self.active
                    .insert(session_id.to_string(), activated.active_branch_id.clone());
                info!(
                    component = "branches",
                    event = "branch.activated",
                    session_id = %session_id,
                    branch_id = %activated.active_branch_id,
                    previous = ?previous,
                    "Branch activated"
                );
                self.reload_current(session_id).await;
                Ok(BranchActivation {
                    session_id: session_id.to_string(),
                    changed: previous.as_deref() != Some(activated.active_branch_id.as_str()),
                    active_branch_id: activated.active_branch_id,
                })
            }
            // Some servers answer "not found" for an already-active branch.
            Err(err) if err.is_not_found() => {
                self.list_branches(session_id).await?;
                if self.known_active(session_id).as_deref() == Some(branch_id) {
                    Ok(unchanged(session_id, branch_id))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Last known active branch of `session_id`.
    pub fn known_active(&self, session_id: &str) -> Option<String> {
        self.active.get(session_id).map(|entry| entry.value().clone())
    }

    fn session_of_loaded_message(&self, message_id: &str) -> Option<String> {
        let state = self.store.snapshot();
        state.message(message_id)?;
        state.current_session_id.clone()
    }

    async fn reload_current(&self, session_id: &str) {
        if self.store.current_session_id().as_deref() != Some(session_id) {
            return;
        }
        if let Err(err) =
            history::reload(self.api.as_ref(), &self.store, session_id, self.history_limit).await
        {
            warn!(
                component = "branches",
                event = "branch.reload.failed",
                session_id = %session_id,
                error = %err,
                "History reload after branch change failed"
            );
            self.store
                .dispatch(crate::store::Action::SetError(Some(format!(
                    "Failed to refresh conversation: {}",
                    err.user_message()
                ))));
        }
    }
}

fn unchanged(session_id: &str, branch_id: &str) -> BranchActivation {
    BranchActivation {
        session_id: session_id.to_string(),
        active_branch_id: branch_id.to_string(),
        changed: false,
    }
}

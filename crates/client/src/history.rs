//! Conversation history reload.

use tracing::debug;

use crate::api::ChatApi;
use crate::error::ClientError;
use crate::store::{Action, Store};

/// Fetch `session_id`'s history and replace the Store's messages with it.
///
/// The fetched list is dropped if the current session changed while the
/// request was in flight.
pub(crate) async fn reload(
    api: &dyn ChatApi,
    store: &Store,
    session_id: &str,
    limit: u32,
) -> Result<(), ClientError> {
    store.dispatch(Action::SetLoadingHistory(true));
    let result = api.history(session_id, limit).await;
    store.dispatch(Action::SetLoadingHistory(false));

    let history = result?;
    if store.current_session_id().as_deref() == Some(session_id) {
        store.dispatch(Action::SetMessages(history.messages));
    } else {
        debug!(
            component = "history",
            event = "history.reload.stale",
            session_id = %session_id,
            "Current session changed during reload, history not applied"
        );
    }
    Ok(())
}

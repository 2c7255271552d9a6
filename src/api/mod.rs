use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::model::user::{User, UserSummary};
use crate::state::AppState;

pub mod attendance;
pub mod drivers;
pub mod tasks;

/// The driver with `id`; admins and deleted accounts are `NotFound`.
pub(crate) async fn find_driver(state: &AppState, id: u64) -> AppResult<User> {
    match state.users.find_by_id(id).await? {
        Some(user) if user.is_driver() => Ok(user),
        _ => Err(AppError::NotFound("Driver")),
    }
}

/// Name cards for `ids`, served from the user cache. Unknown ids are left out.
pub(crate) async fn user_summaries(
    state: &AppState,
    ids: impl IntoIterator<Item = u64>,
) -> AppResult<HashMap<u64, UserSummary>> {
    let mut summaries = HashMap::new();
    for id in ids {
        if summaries.contains_key(&id) {
            continue;
        }
        if let Some(summary) = state
            .user_cache
            .get_or_load(id, state.users.as_ref())
            .await?
        {
            summaries.insert(id, summary);
        }
    }
    Ok(summaries)
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::{Database, messages, new_id, now_millis, reactions};
use parley_types::api::{Claims, IdResponse, ToggleReactionRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::Reaction;

use crate::access::require_member;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

/// Outcome of [`toggle`].
#[derive(Debug)]
pub struct Toggled {
    /// Id of the reaction that was added or removed.
    pub id: String,
    pub workspace_id: String,
    pub added: bool,
}

/// Remove the caller's reaction with `value` on a message, or add it when
/// there is none.
pub fn toggle(db: &Database, user_id: &str, message_id: &str, value: &str) -> ApiResult<Toggled> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("Reaction value cannot be empty".into()));
    }

    db.with_tx(|tx| {
        let message =
            messages::get(tx, message_id)?.ok_or(ApiError::NotFound("Message not found"))?;
        let member = require_member(tx, &message.workspace_id, user_id)?;

        if let Some(existing) = reactions::find(tx, message_id, &member.id, value)? {
            reactions::delete(tx, &existing.id)?;
            return Ok(Toggled {
                id: existing.id,
                workspace_id: message.workspace_id,
                added: false,
            });
        }

        let reaction = Reaction {
            id: new_id(),
            workspace_id: message.workspace_id.clone(),
            message_id: message.id,
            member_id: member.id,
            value: value.to_string(),
            creation_time: now_millis(),
        };
        reactions::insert(tx, &reaction)?;
        Ok(Toggled {
            id: reaction.id,
            workspace_id: message.workspace_id,
            added: true,
        })
    })
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let mid = message_id.to_string();
    let value = req.value.trim().to_string();
    let v = value.clone();
    let toggled = run_blocking(&state, move |db| toggle(db, &uid, &mid, &v)).await?;

    state.dispatcher.broadcast(GatewayEvent::ReactionToggled {
        workspace_id: toggled.workspace_id,
        message_id: message_id.to_string(),
        value,
        added: toggled.added,
    });
    Ok(Json(IdResponse { id: toggled.id }))
}

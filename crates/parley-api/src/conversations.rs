use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::{Database, conversations, members, new_id, now_millis};
use parley_types::api::{Claims, CreateConversationRequest, IdResponse};
use parley_types::events::GatewayEvent;
use parley_types::models::Conversation;

use crate::access::require_member;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

/// Outcome of [`create_or_get`].
pub struct Opened {
    pub id: String,
    pub created: bool,
}

// -- Operations --

/// Find the caller's conversation with `member_id`, opening one if needed.
pub fn create_or_get(
    db: &Database,
    user_id: &str,
    workspace_id: &str,
    member_id: &str,
) -> ApiResult<Opened> {
    db.with_tx(|tx| {
        let current = members::get_for_user(tx, workspace_id, user_id)?
            .ok_or(ApiError::NotFound("Member not found"))?;
        let other = members::get(tx, member_id)?
            .filter(|m| m.workspace_id == workspace_id)
            .ok_or(ApiError::NotFound("Member not found"))?;

        let existing = conversations::find_between(tx, workspace_id, &current.id, &other.id)?;
        if let Some(existing) = existing {
            return Ok(Opened {
                id: existing.id,
                created: false,
            });
        }

        let conversation = Conversation {
            id: new_id(),
            workspace_id: workspace_id.to_string(),
            member_one_id: current.id,
            member_two_id: other.id,
            creation_time: now_millis(),
        };
        conversations::insert(tx, &conversation)?;
        Ok(Opened {
            id: conversation.id,
            created: true,
        })
    })
}

/// A conversation the caller takes part in.
pub fn get(db: &Database, user_id: &str, id: &str) -> ApiResult<Option<Conversation>> {
    db.with_conn(|conn| {
        let Some(conversation) = conversations::get(conn, id)? else {
            return Ok(None);
        };
        let member = require_member(conn, &conversation.workspace_id, user_id)?;
        if !conversation.involves(&member.id) {
            return Err(ApiError::Unauthorized);
        }
        Ok(Some(conversation))
    })
}

// -- Handlers --

pub async fn create_or_get_conversation(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let opened =
        run_blocking(&state, move |db| create_or_get(db, &uid, &wid, &req.member_id)).await?;

    if opened.created {
        state.dispatcher.broadcast(GatewayEvent::ConversationCreated {
            workspace_id: workspace_id.to_string(),
            conversation_id: opened.id.clone(),
        });
    }
    Ok(Json(IdResponse { id: opened.id }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let cid = conversation_id.to_string();
    let conversation = run_blocking(&state, move |db| get(db, &uid, &cid)).await?;
    Ok(Json(conversation))
}

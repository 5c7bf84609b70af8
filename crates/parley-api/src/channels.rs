use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::{Database, channels, members, new_id, now_millis};
use parley_types::api::{ChannelNameRequest, Claims, IdResponse};
use parley_types::events::GatewayEvent;
use parley_types::models::Channel;

use crate::access::{require_admin, validate_name};
use crate::error::{ApiError, ApiResult};
use crate::shaping::normalize_channel_name;
use crate::state::{AppState, run_blocking};

fn channel_name(raw: &str) -> ApiResult<String> {
    validate_name(&normalize_channel_name(raw), "Channel")
}

// -- Operations --

/// Channels of a workspace; empty when the caller is not a member.
pub fn list(db: &Database, user_id: &str, workspace_id: &str) -> ApiResult<Vec<Channel>> {
    db.with_conn(|conn| {
        if members::get_for_user(conn, workspace_id, user_id)?.is_none() {
            return Ok(Vec::new());
        }
        Ok(channels::list_for_workspace(conn, workspace_id)?)
    })
}

pub fn get_by_id(db: &Database, user_id: &str, id: &str) -> ApiResult<Option<Channel>> {
    db.with_conn(|conn| {
        let Some(channel) = channels::get(conn, id)? else {
            return Ok(None);
        };
        if members::get_for_user(conn, &channel.workspace_id, user_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(channel))
    })
}

pub fn create(db: &Database, user_id: &str, workspace_id: &str, name: &str) -> ApiResult<String> {
    let name = channel_name(name)?;
    db.with_tx(|tx| {
        require_admin(tx, workspace_id, user_id)?;
        let channel = Channel {
            id: new_id(),
            name,
            workspace_id: workspace_id.to_string(),
            creation_time: now_millis(),
        };
        channels::insert(tx, &channel)?;
        Ok(channel.id)
    })
}

/// Rename a channel. Returns its workspace id.
pub fn rename(db: &Database, user_id: &str, id: &str, name: &str) -> ApiResult<String> {
    let name = channel_name(name)?;
    db.with_tx(|tx| {
        let channel = channels::get(tx, id)?.ok_or(ApiError::NotFound("Channel not found"))?;
        require_admin(tx, &channel.workspace_id, user_id)?;
        channels::update_name(tx, id, &name)?;
        Ok(channel.workspace_id)
    })
}

/// Delete a channel with its messages. Returns its workspace id.
pub fn remove(db: &Database, user_id: &str, id: &str) -> ApiResult<String> {
    db.with_tx(|tx| {
        let channel = channels::get(tx, id)?.ok_or(ApiError::NotFound("Channel not found"))?;
        require_admin(tx, &channel.workspace_id, user_id)?;
        channels::delete_cascade(tx, id)?;
        Ok(channel.workspace_id)
    })
}

// -- Handlers --

pub async fn list_channels(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let channels = run_blocking(&state, move |db| list(db, &uid, &wid)).await?;
    Ok(Json(channels))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let cid = channel_id.to_string();
    let channel = run_blocking(&state, move |db| get_by_id(db, &uid, &cid)).await?;
    Ok(Json(channel))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChannelNameRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let id = run_blocking(&state, move |db| create(db, &uid, &wid, &req.name)).await?;

    state.dispatcher.broadcast(GatewayEvent::ChannelCreated {
        workspace_id: workspace_id.to_string(),
        channel_id: id.clone(),
    });
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

pub async fn update_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChannelNameRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let id = channel_id.to_string();
    let cid = id.clone();
    let workspace_id = run_blocking(&state, move |db| rename(db, &uid, &cid, &req.name)).await?;

    state.dispatcher.broadcast(GatewayEvent::ChannelUpdated {
        workspace_id,
        channel_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

pub async fn remove_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let id = channel_id.to_string();
    let cid = id.clone();
    let workspace_id = run_blocking(&state, move |db| remove(db, &uid, &cid)).await?;

    state.dispatcher.broadcast(GatewayEvent::ChannelDeleted {
        workspace_id,
        channel_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use parley_db::messages::MessageFilter;
use parley_db::{
    Connection, Database, channels, conversations, files, members, messages, new_id, now_millis,
    reactions, users,
};
use parley_types::api::{
    Claims, CreateMessageRequest, IdResponse, MessageQuery, MessageView, Page, UpdateMessageRequest,
};
use parley_types::events::GatewayEvent;
use parley_types::models::{Member, Message};

use crate::access::require_member;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{decode_cursor, page_size, split_page};
use crate::shaping::{aggregate_reactions, thread_preview};
use crate::state::{AppState, run_blocking};
use crate::storage::storage_url;

/// The stream a message belongs to.
#[derive(Debug, Default)]
struct Target {
    channel_id: Option<String>,
    conversation_id: Option<String>,
    parent_message_id: Option<String>,
}

impl Target {
    fn filter(&self) -> MessageFilter<'_> {
        MessageFilter {
            channel_id: self.channel_id.as_deref(),
            conversation_id: self.conversation_id.as_deref(),
            parent_message_id: self.parent_message_id.as_deref(),
        }
    }
}

/// Resolve `target` and check the caller may read and post in it.
///
/// With neither a channel nor a conversation, the conversation is taken from
/// the parent message. Returns the target's workspace and the caller's
/// membership there.
fn authorize_target(
    conn: &Connection,
    user_id: &str,
    target: &mut Target,
) -> ApiResult<(String, Member)> {
    let parent = match target.parent_message_id.as_deref() {
        Some(id) => Some(
            messages::get(conn, id)?.ok_or(ApiError::NotFound("Parent message not found"))?,
        ),
        None => None,
    };

    if target.channel_id.is_none() && target.conversation_id.is_none() {
        let Some(parent) = &parent else {
            return Err(ApiError::BadRequest(
                "A channel, conversation or parent message is required".into(),
            ));
        };
        target.conversation_id = parent.conversation_id.clone();
    }

    let mut scopes = Vec::new();
    if let Some(id) = target.channel_id.as_deref() {
        let channel = channels::get(conn, id)?.ok_or(ApiError::NotFound("Channel not found"))?;
        scopes.push(channel.workspace_id);
    }
    let conversation = match target.conversation_id.as_deref() {
        Some(id) => {
            let conversation =
                conversations::get(conn, id)?.ok_or(ApiError::NotFound("Conversation not found"))?;
            scopes.push(conversation.workspace_id.clone());
            Some(conversation)
        }
        None => None,
    };
    if let Some(parent) = &parent {
        scopes.push(parent.workspace_id.clone());
    }

    // Non-empty: a channel, conversation or parent is present by now.
    let workspace_id = scopes[0].clone();
    if scopes.iter().any(|w| *w != workspace_id) {
        return Err(ApiError::BadRequest("Message target spans workspaces".into()));
    }

    let member = require_member(conn, &workspace_id, user_id)?;
    if let Some(conversation) = conversation {
        if !conversation.involves(&member.id) {
            return Err(ApiError::Unauthorized);
        }
    }

    Ok((workspace_id, member))
}

fn avatar_of(conn: &Connection, member_id: &str) -> anyhow::Result<Option<String>> {
    let Some(member) = members::get(conn, member_id)? else {
        return Ok(None);
    };
    Ok(users::get(conn, &member.user_id)?.and_then(|user| user.image))
}

fn image_url(
    conn: &Connection,
    public_url: &str,
    image: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let Some(id) = image else {
        return Ok(None);
    };
    Ok(files::get_file(conn, id)?.map(|file| storage_url(public_url, &file.id)))
}

/// Attach author, image URL and reaction totals, plus reply statistics when
/// `with_thread`. `None` when the author's member or user row is gone.
fn enrich(
    conn: &Connection,
    public_url: &str,
    message: Message,
    with_thread: bool,
) -> anyhow::Result<Option<MessageView>> {
    let Some(member) = members::get(conn, &message.member_id)? else {
        debug!("Dropping message {} with missing member", message.id);
        return Ok(None);
    };
    let Some(user) = users::get(conn, &member.user_id)? else {
        debug!("Dropping message {} with missing user", message.id);
        return Ok(None);
    };

    let reactions = aggregate_reactions(&reactions::list_for_message(conn, &message.id)?);
    let image = image_url(conn, public_url, message.image.as_deref())?;

    let thread = if with_thread {
        let replies = messages::list_replies(conn, &message.id)?;
        let latest_image = match replies.last() {
            Some(latest) => avatar_of(conn, &latest.member_id)?,
            None => None,
        };
        Some(thread_preview(&replies, latest_image))
    } else {
        None
    };

    Ok(Some(MessageView {
        id: message.id,
        body: message.body,
        image,
        member_id: message.member_id,
        workspace_id: message.workspace_id,
        channel_id: message.channel_id,
        conversation_id: message.conversation_id,
        parent_message_id: message.parent_message_id,
        creation_time: message.creation_time,
        updated_at: message.updated_at,
        member,
        user,
        reactions,
        thread,
    }))
}

fn non_empty_body(body: &str) -> ApiResult<()> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("Message body cannot be empty".into()));
    }
    Ok(())
}

/// Load a message the caller wrote, or fail.
fn own_message(conn: &Connection, user_id: &str, id: &str) -> ApiResult<Message> {
    let message = messages::get(conn, id)?.ok_or(ApiError::NotFound("Message not found"))?;
    let member = members::get_for_user(conn, &message.workspace_id, user_id)?;
    if member.map(|m| m.id).as_deref() != Some(message.member_id.as_str()) {
        return Err(ApiError::Unauthorized);
    }
    Ok(message)
}

// -- Operations --

/// One page of a channel, conversation or thread, newest first.
pub fn list(
    db: &Database,
    public_url: &str,
    user_id: &str,
    query: MessageQuery,
) -> ApiResult<Page<MessageView>> {
    let size = page_size(query.num_items);
    let after = query.cursor.as_deref().map(decode_cursor).transpose()?;
    let mut target = Target {
        channel_id: query.channel_id,
        conversation_id: query.conversation_id,
        parent_message_id: query.parent_message_id,
    };

    db.with_conn(|conn| {
        authorize_target(conn, user_id, &mut target)?;

        let rows = messages::list_page(conn, target.filter(), after.as_ref(), size + 1)?;
        let (rows, is_done, continue_cursor) = split_page(rows, size);

        let mut page = Vec::with_capacity(rows.len());
        for message in rows {
            if let Some(view) = enrich(conn, public_url, message, true)? {
                page.push(view);
            }
        }

        Ok(Page {
            page,
            is_done,
            continue_cursor,
        })
    })
}

pub fn get_by_id(
    db: &Database,
    public_url: &str,
    user_id: &str,
    id: &str,
) -> ApiResult<Option<MessageView>> {
    db.with_conn(|conn| {
        let Some(message) = messages::get(conn, id)? else {
            return Ok(None);
        };
        require_member(conn, &message.workspace_id, user_id)?;
        Ok(enrich(conn, public_url, message, false)?)
    })
}

pub fn create(
    db: &Database,
    user_id: &str,
    workspace_id: &str,
    req: CreateMessageRequest,
) -> ApiResult<Message> {
    non_empty_body(&req.body)?;

    db.with_tx(|tx| {
        let mut target = Target {
            channel_id: req.channel_id,
            conversation_id: req.conversation_id,
            parent_message_id: req.parent_message_id,
        };
        let (target_workspace, member) = authorize_target(tx, user_id, &mut target)?;
        if target_workspace != workspace_id {
            return Err(ApiError::BadRequest("Message target is not in this workspace".into()));
        }

        if let Some(image) = req.image.as_deref() {
            if files::get_file(tx, image)?.is_none() {
                return Err(ApiError::BadRequest("Invalid image".into()));
            }
        }

        let message = Message {
            id: new_id(),
            body: req.body,
            image: req.image,
            member_id: member.id,
            workspace_id: target_workspace,
            channel_id: target.channel_id,
            conversation_id: target.conversation_id,
            parent_message_id: target.parent_message_id,
            creation_time: now_millis(),
            updated_at: None,
        };
        messages::insert(tx, &message)?;
        Ok(message)
    })
}

/// Edit the body of the caller's own message. Returns its workspace id.
pub fn update(db: &Database, user_id: &str, id: &str, body: &str) -> ApiResult<String> {
    non_empty_body(body)?;
    db.with_tx(|tx| {
        let message = own_message(tx, user_id, id)?;
        messages::update_body(tx, id, body, now_millis())?;
        Ok(message.workspace_id)
    })
}

/// Delete the caller's own message and its reactions. Returns its workspace id.
pub fn remove(db: &Database, user_id: &str, id: &str) -> ApiResult<String> {
    db.with_tx(|tx| {
        let message = own_message(tx, user_id, id)?;
        messages::delete_cascade(tx, id)?;
        Ok(message.workspace_id)
    })
}

// -- Handlers --

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let public_url = state.public_url.clone();
    let page = run_blocking(&state, move |db| list(db, &public_url, &uid, query)).await?;
    Ok(Json(page))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let mid = message_id.to_string();
    let public_url = state.public_url.clone();
    let message = run_blocking(&state, move |db| get_by_id(db, &public_url, &uid, &mid)).await?;
    Ok(Json(message))
}

pub async fn create_message(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let message = run_blocking(&state, move |db| create(db, &uid, &wid, req)).await?;

    state.dispatcher.broadcast(GatewayEvent::MessageCreated {
        workspace_id: message.workspace_id,
        message_id: message.id.clone(),
        channel_id: message.channel_id,
        conversation_id: message.conversation_id,
        parent_message_id: message.parent_message_id,
    });
    Ok((StatusCode::CREATED, Json(IdResponse { id: message.id })))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let id = message_id.to_string();
    let mid = id.clone();
    let workspace_id = run_blocking(&state, move |db| update(db, &uid, &mid, &req.body)).await?;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdated {
        workspace_id,
        message_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

pub async fn remove_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let id = message_id.to_string();
    let mid = id.clone();
    let workspace_id = run_blocking(&state, move |db| remove(db, &uid, &mid)).await?;

    state.dispatcher.broadcast(GatewayEvent::MessageDeleted {
        workspace_id,
        message_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

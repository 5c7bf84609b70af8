use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Member, Role, User};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Users --

/// Profile update. `image` is a storage id from an upload, or `null` to
/// clear the avatar.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub image: Option<String>,
}

/// Returned by every mutation that creates, changes or deletes a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

// -- Workspaces --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceNameRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinWorkspaceRequest {
    pub join_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: String,
    pub is_member: bool,
}

// -- Members --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemberRequest {
    pub role: Role,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelNameRequest {
    pub name: String,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub member_id: String,
}

// -- Messages --

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub body: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub parent_message_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub body: String,
}

/// Query string for the message listing.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MessageQuery {
    pub channel_id: Option<String>,
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub num_items: Option<u32>,
    pub cursor: Option<String>,
}

/// One page of a cursor-paginated listing, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: Vec<T>,
    pub is_done: bool,
    pub continue_cursor: Option<String>,
}

/// Per-emoji reaction totals for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub id: String,
    pub workspace_id: String,
    pub message_id: String,
    pub value: String,
    pub count: usize,
    pub member_ids: Vec<String>,
    pub creation_time: i64,
}

/// Reply statistics shown under a thread root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPreview {
    #[serde(rename = "thread_count")]
    pub count: usize,
    #[serde(rename = "thread_image")]
    pub image: Option<String>,
    #[serde(rename = "thread_timestamp")]
    pub timestamp: i64,
}

/// A message with its author, resolved image URL and aggregated reactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub body: String,
    pub image: Option<String>,
    pub member_id: String,
    pub workspace_id: String,
    pub channel_id: Option<String>,
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub creation_time: i64,
    pub updated_at: Option<i64>,
    pub member: Member,
    pub user: User,
    pub reactions: Vec<ReactionSummary>,
    #[serde(flatten)]
    pub thread: Option<ThreadPreview>,
}

// -- Reactions --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub value: String,
}

// -- Storage --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub upload_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub storage_id: String,
}

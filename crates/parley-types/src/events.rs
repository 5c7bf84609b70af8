use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Change notifications sent over the WebSocket gateway.
///
/// Events carry ids only. Clients re-fetch the affected listing through the
/// HTTP API, so a missed event never leaves a client with stale content it
/// cannot repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, name: String, online: bool },

    WorkspaceUpdated { workspace_id: String },

    WorkspaceDeleted { workspace_id: String },

    MemberJoined { workspace_id: String, member_id: String },

    MemberUpdated { workspace_id: String, member_id: String },

    /// `user_id` is the removed member's user, whose connections stop
    /// receiving this workspace's events.
    MemberRemoved {
        workspace_id: String,
        member_id: String,
        user_id: String,
    },

    ChannelCreated { workspace_id: String, channel_id: String },

    ChannelUpdated { workspace_id: String, channel_id: String },

    ChannelDeleted { workspace_id: String, channel_id: String },

    ConversationCreated { workspace_id: String, conversation_id: String },

    MessageCreated {
        workspace_id: String,
        message_id: String,
        channel_id: Option<String>,
        conversation_id: Option<String>,
        parent_message_id: Option<String>,
    },

    MessageUpdated { workspace_id: String, message_id: String },

    MessageDeleted { workspace_id: String, message_id: String },

    ReactionToggled {
        workspace_id: String,
        message_id: String,
        value: String,
        added: bool,
    },
}

impl GatewayEvent {
    /// Returns the workspace this event is scoped to.
    /// Events that return `None` are global and go to every connection.
    pub fn workspace_id(&self) -> Option<&str> {
        match self {
            Self::Ready { .. } | Self::PresenceUpdate { .. } => None,
            Self::WorkspaceUpdated { workspace_id }
            | Self::WorkspaceDeleted { workspace_id }
            | Self::MemberJoined { workspace_id, .. }
            | Self::MemberUpdated { workspace_id, .. }
            | Self::MemberRemoved { workspace_id, .. }
            | Self::ChannelCreated { workspace_id, .. }
            | Self::ChannelUpdated { workspace_id, .. }
            | Self::ChannelDeleted { workspace_id, .. }
            | Self::ConversationCreated { workspace_id, .. }
            | Self::MessageCreated { workspace_id, .. }
            | Self::MessageUpdated { workspace_id, .. }
            | Self::MessageDeleted { workspace_id, .. }
            | Self::ReactionToggled { workspace_id, .. } => Some(workspace_id),
        }
    }

    /// The workspace `user_id` loses access to with this event, if any.
    pub fn revoked_workspace(&self, user_id: &str) -> Option<&str> {
        match self {
            Self::WorkspaceDeleted { workspace_id } => Some(workspace_id),
            Self::MemberRemoved {
                workspace_id,
                user_id: removed,
                ..
            } if removed == user_id => Some(workspace_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of workspaces this connection receives events for.
    Subscribe { workspace_ids: Vec<String> },
}

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_gateway::connection;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{
    auth, channels, conversations, members, messages, reactions, upload, users, workspaces,
};

/// Build the full HTTP surface: public auth and storage routes, the
/// WebSocket gateway, and everything else behind the bearer-token check.
pub fn router(state: AppState) -> Router {
    let public_routes: Router<AppState> = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/storage/upload/{ticket}",
            post(upload::upload).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/storage/{id}", get(upload::download))
        .route("/gateway", get(ws_upgrade));

    let protected_routes: Router<AppState> = Router::new()
        .route("/users/me", get(users::current_user).patch(users::update_user))
        .route(
            "/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/workspaces/{workspace_id}",
            get(workspaces::get_workspace)
                .patch(workspaces::update_workspace)
                .delete(workspaces::remove_workspace),
        )
        .route("/workspaces/{workspace_id}/info", get(workspaces::get_workspace_info))
        .route("/workspaces/{workspace_id}/join", post(workspaces::join_workspace))
        .route("/workspaces/{workspace_id}/join-code", post(workspaces::update_join_code))
        .route("/workspaces/{workspace_id}/members", get(members::list_members))
        .route("/workspaces/{workspace_id}/members/me", get(members::current_member))
        .route(
            "/workspaces/{workspace_id}/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route(
            "/workspaces/{workspace_id}/conversations",
            post(conversations::create_or_get_conversation),
        )
        .route("/workspaces/{workspace_id}/messages", post(messages::create_message))
        .route(
            "/members/{member_id}",
            get(members::get_member)
                .patch(members::update_member)
                .delete(members::remove_member),
        )
        .route(
            "/channels/{channel_id}",
            get(channels::get_channel)
                .patch(channels::update_channel)
                .delete(channels::remove_channel),
        )
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/messages", get(messages::list_messages))
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::update_message)
                .delete(messages::remove_message),
        )
        .route("/messages/{message_id}/reactions", post(reactions::toggle_reaction))
        .route("/storage/upload-url", post(upload::generate_upload_url))
        .route("/storage/{id}/url", get(upload::get_url))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, jwt_secret))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use parley_db::{Database, channels, members, new_id, now_millis, workspaces};
use parley_types::api::{
    Claims, IdResponse, JoinWorkspaceRequest, WorkspaceInfo, WorkspaceNameRequest,
};
use parley_types::events::GatewayEvent;
use parley_types::models::{Channel, Member, Role, Workspace};

use crate::access::{require_admin, validate_name};
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

const JOIN_CODE_ALPHABET: &[u8] = b"1234567890abcdefghijklmnopqrstuvwxyz";
const JOIN_CODE_LEN: usize = 6;

/// Name of the channel every new workspace starts with.
pub const DEFAULT_CHANNEL: &str = "general";

pub fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

// -- Operations --

pub fn list(db: &Database, user_id: &str) -> ApiResult<Vec<Workspace>> {
    Ok(db.with_conn(|conn| workspaces::list_for_user(conn, user_id))?)
}

/// The workspace, or `None` when it is missing or the caller is not a member.
pub fn get_by_id(db: &Database, user_id: &str, id: &str) -> ApiResult<Option<Workspace>> {
    db.with_conn(|conn| {
        if members::get_for_user(conn, id, user_id)?.is_none() {
            return Ok(None);
        }
        Ok(workspaces::get(conn, id)?)
    })
}

/// Public preview used by the join page.
pub fn get_info(db: &Database, user_id: &str, id: &str) -> ApiResult<WorkspaceInfo> {
    db.with_conn(|conn| {
        let is_member = members::get_for_user(conn, id, user_id)?.is_some();
        let workspace =
            workspaces::get(conn, id)?.ok_or(ApiError::NotFound("Workspace not found"))?;
        Ok(WorkspaceInfo {
            name: workspace.name,
            is_member,
        })
    })
}

/// Create a workspace with the caller as its admin and a default channel.
/// Returns (workspace_id, member_id).
pub fn create(db: &Database, user_id: &str, name: &str) -> ApiResult<(String, String)> {
    let name = validate_name(name, "Workspace")?;
    let now = now_millis();

    let workspace = Workspace {
        id: new_id(),
        name,
        user_id: user_id.to_string(),
        join_code: generate_join_code(),
        creation_time: now,
    };
    let member = Member {
        id: new_id(),
        user_id: user_id.to_string(),
        workspace_id: workspace.id.clone(),
        role: Role::Admin,
        creation_time: now,
    };
    let channel = Channel {
        id: new_id(),
        name: DEFAULT_CHANNEL.to_string(),
        workspace_id: workspace.id.clone(),
        creation_time: now,
    };

    db.with_tx(|tx| {
        workspaces::insert(tx, &workspace)?;
        members::insert(tx, &member)?;
        channels::insert(tx, &channel)?;
        Ok::<_, ApiError>(())
    })?;

    info!("Created workspace {} ({})", workspace.name, workspace.id);
    Ok((workspace.id, member.id))
}

pub fn rename(db: &Database, user_id: &str, id: &str, name: &str) -> ApiResult<()> {
    let name = validate_name(name, "Workspace")?;
    db.with_tx(|tx| {
        require_admin(tx, id, user_id)?;
        workspaces::update_name(tx, id, &name)?;
        Ok(())
    })
}

pub fn remove(db: &Database, user_id: &str, id: &str) -> ApiResult<()> {
    db.with_tx(|tx| {
        require_admin(tx, id, user_id)?;
        workspaces::delete_cascade(tx, id)?;
        Ok(())
    })
}

/// Replace the join code. Returns the new code.
pub fn regenerate_join_code(db: &Database, user_id: &str, id: &str) -> ApiResult<String> {
    let code = generate_join_code();
    db.with_tx(|tx| {
        require_admin(tx, id, user_id)?;
        workspaces::update_join_code(tx, id, &code)?;
        Ok::<(), ApiError>(())
    })?;
    Ok(code)
}

/// Join with a code. Returns the new member id.
pub fn join(db: &Database, user_id: &str, id: &str, join_code: &str) -> ApiResult<String> {
    db.with_tx(|tx| {
        if members::get_for_user(tx, id, user_id)?.is_some() {
            return Err(ApiError::Conflict("Already a member of this workspace".into()));
        }

        let workspace = workspaces::get(tx, id)?.ok_or(ApiError::NotFound("Workspace not found"))?;

        if !workspace.join_code.eq_ignore_ascii_case(join_code.trim()) {
            return Err(ApiError::BadRequest("Invalid join code".into()));
        }

        let member = Member {
            id: new_id(),
            user_id: user_id.to_string(),
            workspace_id: workspace.id,
            role: Role::Member,
            creation_time: now_millis(),
        };
        members::insert(tx, &member)?;
        Ok(member.id)
    })
}

// -- Handlers --

pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let workspaces = run_blocking(&state, move |db| list(db, &uid)).await?;
    Ok(Json(workspaces))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let workspace = run_blocking(&state, move |db| get_by_id(db, &uid, &wid)).await?;
    Ok(Json(workspace))
}

pub async fn get_workspace_info(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let info = run_blocking(&state, move |db| get_info(db, &uid, &wid)).await?;
    Ok(Json(info))
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WorkspaceNameRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let (id, _member_id) = run_blocking(&state, move |db| create(db, &uid, &req.name)).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

pub async fn update_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WorkspaceNameRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    run_blocking(&state, move |db| rename(db, &uid, &wid, &req.name)).await?;

    let id = workspace_id.to_string();
    state.dispatcher.broadcast(GatewayEvent::WorkspaceUpdated {
        workspace_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

pub async fn remove_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    run_blocking(&state, move |db| remove(db, &uid, &wid)).await?;

    let id = workspace_id.to_string();
    info!("Workspace {} removed by {}", id, claims.sub);
    state.dispatcher.broadcast(GatewayEvent::WorkspaceDeleted {
        workspace_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

pub async fn update_join_code(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    run_blocking(&state, move |db| regenerate_join_code(db, &uid, &wid)).await?;

    let id = workspace_id.to_string();
    state.dispatcher.broadcast(GatewayEvent::WorkspaceUpdated {
        workspace_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

pub async fn join_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let member_id = run_blocking(&state, move |db| join(db, &uid, &wid, &req.join_code)).await?;

    let id = workspace_id.to_string();
    state.dispatcher.broadcast(GatewayEvent::MemberJoined {
        workspace_id: id.clone(),
        member_id,
    });
    Ok(Json(IdResponse { id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{register, setup};

    #[test]
    fn test_join_code_shape() {
        let code = generate_join_code();
        assert_eq!(code.len(), JOIN_CODE_LEN);
        assert!(code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_create_makes_admin_and_general_channel() {
        let db = setup();
        let owner = register(&db, "owner");

        let (ws, member_id) = create(&db, &owner, "  Acme Corp ").unwrap();

        let workspace = get_by_id(&db, &owner, &ws).unwrap().unwrap();
        assert_eq!(workspace.name, "Acme Corp");
        assert_eq!(workspace.user_id, owner);

        db.with_conn(|conn| {
            let member = members::get(conn, &member_id)?.unwrap();
            assert_eq!(member.role, Role::Admin);
            let chans = channels::list_for_workspace(conn, &ws)?;
            assert_eq!(chans.len(), 1);
            assert_eq!(chans[0].name, DEFAULT_CHANNEL);
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }

    #[test]
    fn test_non_member_sees_nothing_but_info() {
        let db = setup();
        let owner = register(&db, "owner");
        let stranger = register(&db, "stranger");
        let (ws, _) = create(&db, &owner, "Acme").unwrap();

        assert!(get_by_id(&db, &stranger, &ws).unwrap().is_none());
        assert!(list(&db, &stranger).unwrap().is_empty());

        let info = get_info(&db, &stranger, &ws).unwrap();
        assert_eq!(info, WorkspaceInfo { name: "Acme".into(), is_member: false });

        assert!(matches!(
            get_info(&db, &stranger, "missing"),
            Err(ApiError::NotFound("Workspace not found"))
        ));
    }

    #[test]
    fn test_join_flow() {
        let db = setup();
        let owner = register(&db, "owner");
        let joiner = register(&db, "joiner");
        let (ws, _) = create(&db, &owner, "Acme").unwrap();
        let code = get_by_id(&db, &owner, &ws).unwrap().unwrap().join_code;

        assert!(matches!(
            join(&db, &joiner, &ws, "zzzzzz"),
            Err(ApiError::BadRequest(_))
        ));

        join(&db, &joiner, &ws, &code.to_uppercase()).unwrap();
        assert_eq!(list(&db, &joiner).unwrap().len(), 1);

        assert!(matches!(join(&db, &joiner, &ws, &code), Err(ApiError::Conflict(_))));
        assert!(matches!(
            join(&db, &owner, "missing", &code),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_only_admin_can_manage() {
        let db = setup();
        let owner = register(&db, "owner");
        let joiner = register(&db, "joiner");
        let (ws, _) = create(&db, &owner, "Acme").unwrap();
        let code = get_by_id(&db, &owner, &ws).unwrap().unwrap().join_code;
        join(&db, &joiner, &ws, &code).unwrap();

        assert!(matches!(rename(&db, &joiner, &ws, "Mine now"), Err(ApiError::Unauthorized)));
        assert!(matches!(regenerate_join_code(&db, &joiner, &ws), Err(ApiError::Unauthorized)));
        assert!(matches!(remove(&db, &joiner, &ws), Err(ApiError::Unauthorized)));

        rename(&db, &owner, &ws, "Acme Inc").unwrap();
        let new_code = regenerate_join_code(&db, &owner, &ws).unwrap();
        assert_eq!(get_by_id(&db, &owner, &ws).unwrap().unwrap().join_code, new_code);

        remove(&db, &owner, &ws).unwrap();
        assert!(list(&db, &owner).unwrap().is_empty());
        assert!(list(&db, &joiner).unwrap().is_empty());
    }

    #[test]
    fn test_remove_cascades_content() {
        use crate::testutil::Team;
        use parley_types::api::CreateMessageRequest;

        let db = setup();
        let team = Team::new(&db);
        let message = crate::messages::create(
            &db,
            &team.member_user,
            &team.workspace,
            CreateMessageRequest {
                body: "bye".into(),
                channel_id: Some(team.channel.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        crate::reactions::toggle(&db, &team.admin_user, &message.id, "👋").unwrap();
        crate::conversations::create_or_get(&db, &team.admin_user, &team.workspace, &team.member)
            .unwrap();

        remove(&db, &team.admin_user, &team.workspace).unwrap();

        db.with_conn(|conn| {
            assert!(parley_db::messages::get(conn, &message.id)?.is_none());
            assert!(parley_db::reactions::list_for_message(conn, &message.id)?.is_empty());
            assert!(channels::get(conn, &team.channel)?.is_none());
            assert!(members::get(conn, &team.member)?.is_none());
            assert!(workspaces::get(conn, &team.workspace)?.is_none());
            Ok::<_, anyhow::Error>(())
        })
        .unwrap();
    }
}

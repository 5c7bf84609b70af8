use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use parley_db::{Connection, Database, members, users};
use parley_types::api::{Claims, IdResponse, UpdateMemberRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::{Member, MemberWithUser, Role};

use crate::access::{require_admin, require_member};
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

fn with_user(conn: &Connection, member: Member) -> ApiResult<Option<MemberWithUser>> {
    Ok(users::get(conn, &member.user_id)?.map(|user| MemberWithUser { member, user }))
}

// -- Operations --

/// A member of one of the caller's workspaces, with their user.
pub fn get_by_id(db: &Database, user_id: &str, id: &str) -> ApiResult<Option<MemberWithUser>> {
    db.with_conn(|conn| {
        let Some(member) = members::get(conn, id)? else {
            return Ok(None);
        };
        if members::get_for_user(conn, &member.workspace_id, user_id)?.is_none() {
            return Ok(None);
        }
        with_user(conn, member)
    })
}

/// Every member of a workspace whose user still exists.
pub fn list(db: &Database, user_id: &str, workspace_id: &str) -> ApiResult<Vec<MemberWithUser>> {
    db.with_conn(|conn| {
        require_member(conn, workspace_id, user_id)?;

        let mut out = Vec::new();
        for member in members::list_for_workspace(conn, workspace_id)? {
            if let Some(m) = with_user(conn, member)? {
                out.push(m);
            }
        }
        Ok(out)
    })
}

pub fn current(db: &Database, user_id: &str, workspace_id: &str) -> ApiResult<Option<Member>> {
    Ok(db.with_conn(|conn| members::get_for_user(conn, workspace_id, user_id))?)
}

/// Change a member's role. Returns the member's workspace id.
pub fn update_role(db: &Database, user_id: &str, id: &str, role: Role) -> ApiResult<String> {
    db.with_tx(|tx| {
        let member = members::get(tx, id)?.ok_or(ApiError::NotFound("Member not found"))?;
        require_admin(tx, &member.workspace_id, user_id)?;
        members::update_role(tx, id, role)?;
        Ok(member.workspace_id)
    })
}

/// Remove a member (an admin removing someone, or a member leaving) with
/// everything they authored. Returns the removed member.
pub fn remove(db: &Database, user_id: &str, id: &str) -> ApiResult<Member> {
    db.with_tx(|tx| {
        let member = members::get(tx, id)?.ok_or(ApiError::NotFound("Member not found"))?;
        let current = require_member(tx, &member.workspace_id, user_id)?;

        if current.id == member.id && current.is_admin() {
            return Err(ApiError::Forbidden("You cannot remove yourself as an admin".into()));
        }
        if member.is_admin() {
            return Err(ApiError::Forbidden("You cannot remove an admin".into()));
        }
        if current.id != member.id && !current.is_admin() {
            return Err(ApiError::Unauthorized);
        }

        members::delete_cascade(tx, id)?;
        Ok(member)
    })
}

// -- Handlers --

pub async fn get_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let mid = member_id.to_string();
    let member = run_blocking(&state, move |db| get_by_id(db, &uid, &mid)).await?;
    Ok(Json(member))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let members = run_blocking(&state, move |db| list(db, &uid, &wid)).await?;
    Ok(Json(members))
}

pub async fn current_member(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let wid = workspace_id.to_string();
    let member = run_blocking(&state, move |db| current(db, &uid, &wid)).await?;
    Ok(Json(member))
}

pub async fn update_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let id = member_id.to_string();
    let mid = id.clone();
    let workspace_id = run_blocking(&state, move |db| update_role(db, &uid, &mid, req.role)).await?;

    state.dispatcher.broadcast(GatewayEvent::MemberUpdated {
        workspace_id,
        member_id: id.clone(),
    });
    Ok(Json(IdResponse { id }))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let id = member_id.to_string();
    let mid = id.clone();
    let removed = run_blocking(&state, move |db| remove(db, &uid, &mid)).await?;

    info!(
        "Member {} removed from workspace {} by {}",
        id, removed.workspace_id, claims.sub
    );
    state.dispatcher.broadcast(GatewayEvent::MemberRemoved {
        workspace_id: removed.workspace_id,
        member_id: id.clone(),
        user_id: removed.user_id,
    });
    Ok(Json(IdResponse { id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Team, setup};

    #[test]
    fn test_list_and_get_populate_users() {
        let db = setup();
        let team = Team::new(&db);

        let all = list(&db, &team.member_user, &team.workspace).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].member.id, team.admin);
        assert_eq!(all[0].user.id, team.admin_user);

        let one = get_by_id(&db, &team.member_user, &team.admin).unwrap().unwrap();
        assert_eq!(one.user.name, "admin");

        assert!(get_by_id(&db, &team.outsider_user, &team.admin).unwrap().is_none());
        assert!(matches!(
            list(&db, &team.outsider_user, &team.workspace),
            Err(ApiError::Unauthorized)
        ));
        assert!(current(&db, &team.outsider_user, &team.workspace).unwrap().is_none());
    }

    #[test]
    fn test_only_admin_changes_roles() {
        let db = setup();
        let team = Team::new(&db);

        assert!(matches!(
            update_role(&db, &team.member_user, &team.member, Role::Admin),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            update_role(&db, &team.admin_user, "missing", Role::Admin),
            Err(ApiError::NotFound("Member not found"))
        ));

        update_role(&db, &team.admin_user, &team.member, Role::Admin).unwrap();
        let promoted = current(&db, &team.member_user, &team.workspace).unwrap().unwrap();
        assert_eq!(promoted.role, Role::Admin);
    }

    #[test]
    fn test_remove_rules() {
        let db = setup();
        let team = Team::new(&db);

        assert!(matches!(
            remove(&db, &team.admin_user, &team.admin),
            Err(ApiError::Forbidden(msg)) if msg == "You cannot remove yourself as an admin"
        ));
        assert!(matches!(
            remove(&db, &team.member_user, &team.admin),
            Err(ApiError::Forbidden(msg)) if msg == "You cannot remove an admin"
        ));
        assert!(matches!(
            remove(&db, &team.outsider_user, &team.member),
            Err(ApiError::Unauthorized)
        ));

        let removed = remove(&db, &team.admin_user, &team.member).unwrap();
        assert_eq!(removed.user_id, team.member_user);
        assert!(current(&db, &team.member_user, &team.workspace).unwrap().is_none());
    }

    #[test]
    fn test_member_can_leave() {
        let db = setup();
        let team = Team::new(&db);
        let second = team.add_member(&db, "second");

        assert!(matches!(
            remove(&db, &team.member_user, &second.1),
            Err(ApiError::Unauthorized)
        ));
        remove(&db, &team.member_user, &team.member).unwrap();
        assert!(current(&db, &team.member_user, &team.workspace).unwrap().is_none());
    }
}

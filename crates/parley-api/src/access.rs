use parley_db::{Connection, members};
use parley_types::models::Member;

use crate::error::{ApiError, ApiResult};

/// The caller's membership in `workspace_id`, or `Unauthorized`.
pub fn require_member(conn: &Connection, workspace_id: &str, user_id: &str) -> ApiResult<Member> {
    members::get_for_user(conn, workspace_id, user_id)?.ok_or(ApiError::Unauthorized)
}

/// Like [`require_member`], but the member must also be an admin.
pub fn require_admin(conn: &Connection, workspace_id: &str, user_id: &str) -> ApiResult<Member> {
    let member = require_member(conn, workspace_id, user_id)?;
    if !member.is_admin() {
        return Err(ApiError::Unauthorized);
    }
    Ok(member)
}

/// Trimmed display name within `3..=80` characters.
pub fn validate_name(name: &str, what: &str) -> ApiResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(3..=80).contains(&len) {
        return Err(ApiError::BadRequest(format!("{what} name must be 3-80 characters")));
    }
    Ok(name.to_string())
}

use axum::{Extension, Json, extract::State, response::IntoResponse};

use parley_db::{Database, files, users};
use parley_types::api::{Claims, UpdateUserRequest};
use parley_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};
use crate::storage::storage_url;

pub fn current(db: &Database, user_id: &str) -> ApiResult<Option<User>> {
    Ok(db.with_conn(|conn| users::get(conn, user_id))?)
}

/// Point the caller's avatar at an uploaded file, or clear it.
pub fn update_image(
    db: &Database,
    public_url: &str,
    user_id: &str,
    image: Option<&str>,
) -> ApiResult<Option<User>> {
    db.with_tx(|tx| {
        let url = match image {
            Some(id) => {
                let file = files::get_file(tx, id)?
                    .ok_or_else(|| ApiError::BadRequest("Invalid image".into()))?;
                Some(storage_url(public_url, &file.id))
            }
            None => None,
        };
        users::set_image(tx, user_id, url.as_deref())?;
        Ok(users::get(tx, user_id)?)
    })
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let user = run_blocking(&state, move |db| current(db, &uid)).await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = claims.sub.to_string();
    let public_url = state.public_url.clone();
    let user = run_blocking(&state, move |db| {
        update_image(db, &public_url, &uid, req.image.as_deref())
    })
    .await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{register, setup};
    use parley_db::models::FileRow;

    #[test]
    fn test_avatar_set_and_clear() {
        let db = setup();
        let uid = register(&db, "ada");
        db.with_conn(|conn| {
            files::insert_file(
                conn,
                &FileRow {
                    id: "avatar".into(),
                    content_type: "image/png".into(),
                    size: 1,
                    sha256: "00".into(),
                    creation_time: 1,
                },
            )
        })
        .unwrap();

        let user = update_image(&db, "http://chat.test", &uid, Some("avatar")).unwrap().unwrap();
        assert_eq!(user.image.as_deref(), Some("http://chat.test/storage/avatar"));

        assert!(matches!(
            update_image(&db, "http://chat.test", &uid, Some("missing")),
            Err(ApiError::BadRequest(_))
        ));

        update_image(&db, "http://chat.test", &uid, None).unwrap();
        assert!(current(&db, &uid).unwrap().unwrap().image.is_none());
        assert!(current(&db, "nobody").unwrap().is_none());
    }
}

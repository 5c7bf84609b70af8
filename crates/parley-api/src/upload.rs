use axum::{
    Extension, Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use parley_db::models::FileRow;
use parley_db::{files, new_id, now_millis};
use parley_types::api::{Claims, UploadResponse, UploadUrlResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};
use crate::storage::storage_url;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// POST /storage/upload-url: issue a one-shot upload URL for the caller.
pub async fn generate_upload_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let ticket = new_id();
    let now = now_millis();
    let expires_at = now + (state.upload_url_ttl_secs as i64) * 1000;

    let uid = claims.sub.to_string();
    let tid = ticket.clone();
    run_blocking(&state, move |db| {
        db.with_tx(|tx| {
            let purged = files::purge_expired_tickets(tx, now)?;
            if purged > 0 {
                info!("Purged {} expired upload tickets", purged);
            }
            files::insert_ticket(tx, &tid, &uid, expires_at)?;
            Ok(())
        })
    })
    .await?;

    let upload_url = format!(
        "{}/storage/upload/{}",
        state.public_url.trim_end_matches('/'),
        ticket
    );
    Ok(Json(UploadUrlResponse { upload_url }))
}

/// POST /storage/upload/{ticket}: store the raw request body. The ticket in
/// the path is the credential. It is consumed together with the file row, so
/// a failed store leaves it usable and leaves no blob behind.
pub async fn upload(
    State(state): State<AppState>,
    Path(ticket): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Upload body is empty".into()));
    }
    if body.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge {
            size: body.len(),
            max: state.max_upload_bytes,
        });
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let storage_id = Uuid::new_v4();
    let sha256 = state.storage.write(&storage_id, &body).await?;

    let now = now_millis();
    let file = FileRow {
        id: storage_id.to_string(),
        content_type,
        size: body.len() as i64,
        sha256,
        creation_time: now,
    };
    let recorded = run_blocking(&state, move |db| {
        db.with_tx(|tx| {
            let Some(uploader) = files::take_ticket(tx, &ticket, now)? else {
                warn!("Upload rejected: unknown or expired ticket");
                return Err(ApiError::Unauthorized);
            };
            files::insert_file(tx, &file)?;
            info!(
                "Stored {} ({} bytes, {}) for {}",
                file.id, file.size, file.content_type, uploader
            );
            Ok(())
        })
    })
    .await;

    if let Err(e) = recorded {
        if let Err(cleanup) = state.storage.remove(&storage_id).await {
            warn!("Failed to remove unrecorded blob {}: {}", storage_id, cleanup);
        }
        return Err(e);
    }

    Ok(Json(UploadResponse {
        storage_id: storage_id.to_string(),
    }))
}

/// GET /storage/{id}: stream a stored blob. Public, like the URLs handed out
/// by message enrichment.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let storage_id: Uuid = id.parse().map_err(|_| ApiError::NotFound("File not found"))?;

    let sid = storage_id.to_string();
    let file = run_blocking(&state, move |db| {
        Ok(db.with_conn(|conn| files::get_file(conn, &sid))?)
    })
    .await?
    .ok_or(ApiError::NotFound("File not found"))?;

    let Some(handle) = state.storage.open(&storage_id).await? else {
        warn!("File {} has metadata but no blob on disk", file.id);
        return Err(ApiError::NotFound("File not found"));
    };

    let body = Body::from_stream(ReaderStream::new(handle));
    let headers = [
        (header::CONTENT_TYPE, file.content_type),
        (header::CONTENT_LENGTH, file.size.to_string()),
        (header::ETAG, format!("\"{}\"", file.sha256)),
    ];
    Ok((headers, body))
}

/// GET /storage/{id}/url: public URL of a stored file, or `null` when no
/// such file exists.
pub async fn get_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let file = run_blocking(&state, move |db| {
        Ok(db.with_conn(|conn| files::get_file(conn, &id))?)
    })
    .await?;
    Ok(Json(file.map(|f| storage_url(&state.public_url, &f.id))))
}

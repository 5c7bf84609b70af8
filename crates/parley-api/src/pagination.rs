use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;

use parley_db::messages::PageKey;
use parley_types::models::Message;

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub fn page_size(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Opaque continuation token for the position after `key`.
pub fn encode_cursor(key: &PageKey) -> String {
    B64.encode(format!("{}:{}", key.creation_time, key.id))
}

pub fn decode_cursor(cursor: &str) -> ApiResult<PageKey> {
    let invalid = || ApiError::BadRequest("Invalid cursor".into());

    let raw = B64.decode(cursor).map_err(|_| invalid())?;
    let raw = String::from_utf8(raw).map_err(|_| invalid())?;
    let (time, id) = raw.split_once(':').ok_or_else(invalid)?;
    if id.is_empty() {
        return Err(invalid());
    }

    Ok(PageKey {
        creation_time: time.parse().map_err(|_| invalid())?,
        id: id.to_string(),
    })
}

/// Split an over-fetched result (`size + 1` rows requested) into the page,
/// whether the listing is exhausted, and the cursor for the next page.
pub fn split_page(mut rows: Vec<Message>, size: u32) -> (Vec<Message>, bool, Option<String>) {
    let size = size as usize;
    let is_done = rows.len() <= size;
    rows.truncate(size);

    let cursor = if is_done {
        None
    } else {
        rows.last().map(|last| encode_cursor(&PageKey::of(last)))
    };

    (rows, is_done, cursor)
}

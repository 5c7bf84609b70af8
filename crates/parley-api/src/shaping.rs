//! Read-side shaping of message listings: reaction totals and thread previews.
//!
//! These are pure functions over rows already loaded from the database, so
//! the listing handlers stay a straight load-then-shape pipeline.

use parley_types::api::{ReactionSummary, ThreadPreview};
use parley_types::models::{Message, Reaction};

/// Collapse a message's reaction rows into one entry per emoji.
///
/// Entries keep the order in which each emoji first appeared. `count` is the
/// number of rows carrying that emoji; `member_ids` lists each reacting
/// member once, in first-seen order. The id and timestamps of an entry are
/// those of the first row for that emoji.
pub fn aggregate_reactions(rows: &[Reaction]) -> Vec<ReactionSummary> {
    let mut out: Vec<ReactionSummary> = Vec::new();

    for row in rows {
        match out.iter_mut().find(|s| s.value == row.value) {
            Some(summary) => {
                summary.count += 1;
                if !summary.member_ids.contains(&row.member_id) {
                    summary.member_ids.push(row.member_id.clone());
                }
            }
            None => out.push(ReactionSummary {
                id: row.id.clone(),
                workspace_id: row.workspace_id.clone(),
                message_id: row.message_id.clone(),
                value: row.value.clone(),
                count: 1,
                member_ids: vec![row.member_id.clone()],
                creation_time: row.creation_time,
            }),
        }
    }

    out
}

/// Summarise the replies to a thread root. `replies` must be oldest first;
/// `latest_replier_image` is the avatar of whoever wrote the last one.
pub fn thread_preview(replies: &[Message], latest_replier_image: Option<String>) -> ThreadPreview {
    match replies.last() {
        None => ThreadPreview {
            count: 0,
            image: None,
            timestamp: 0,
        },
        Some(latest) => ThreadPreview {
            count: replies.len(),
            image: latest_replier_image,
            timestamp: latest.creation_time,
        },
    }
}

/// Turn a channel name into its canonical form: whitespace runs become `-`,
/// everything is lowercased.
pub fn normalize_channel_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

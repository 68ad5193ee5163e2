//! Change detection: classifies freshly extracted candidates against the
//! store and decides which posts are genuinely new.
//!
//! Novelty is decided purely by existence in the store, never by comparing
//! id magnitudes, so reused, non-monotonic or non-contiguous ids are handled
//! correctly. The head cursor only distinguishes the first run ever from
//! steady state.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info};

use crate::storage::Storage;
use crate::types::{Post, PostId};

/// Classify `candidates` (source order, newest first) against the store.
///
/// Returns the posts to notify about in ascending id order, persisting them
/// and advancing the head cursor as a side effect. An empty candidate list
/// mutates nothing. Store failures propagate so the caller never notifies
/// about posts the store does not durably know.
pub async fn detect(candidates: &[Post], storage: &dyn Storage) -> Result<Vec<Post>> {
    let Some(head) = candidates.first() else {
        debug!("No candidates extracted, leaving store untouched");
        return Ok(Vec::new());
    };

    // First run ever: remember everything currently visible but surface only
    // the newest post, so a fresh deployment does not flood the sinks with
    // the whole backlog.
    if storage.last_head_id().await?.is_none() {
        storage.insert_posts(candidates).await?;
        storage.set_last_head_id(&head.id).await?;
        info!(head = %head.id, "First run, baseline established");
        return Ok(vec![head.clone()]);
    }

    let mut seen_in_batch: HashSet<PostId> = HashSet::new();
    let mut new_posts = Vec::new();
    for candidate in candidates {
        if !seen_in_batch.insert(candidate.id.clone()) {
            continue;
        }
        if storage.get_post(&candidate.id).await?.is_none() {
            new_posts.push(candidate.clone());
        }
    }

    sort_ascending(&mut new_posts);

    if !new_posts.is_empty() {
        storage.insert_posts(&new_posts).await?;
        info!(count = new_posts.len(), "New posts detected");
    }

    // The cursor tracks the last observed head even when nothing is new, so
    // it stays meaningful across no-op cycles.
    storage.set_last_head_id(&head.id).await?;

    Ok(new_posts)
}

/// On-demand variant: persist and return the newest `count` candidates
/// without classifying novelty. Inserts are idempotent, so a repeated check
/// cannot double-store a post.
pub async fn latest(candidates: &[Post], count: usize, storage: &dyn Storage) -> Result<Vec<Post>> {
    let Some(head) = candidates.first() else {
        return Ok(Vec::new());
    };

    let selected: Vec<Post> = candidates.iter().take(count).cloned().collect();
    storage.insert_posts(&selected).await?;
    storage.set_last_head_id(&head.id).await?;

    debug!(count = selected.len(), head = %head.id, "Loaded latest posts");
    Ok(selected)
}

/// Ascending by numeric id so downstream notification reads oldest-new
/// first. Ids that do not parse keep their source order, after the numeric
/// ones (stable sort).
fn sort_ascending(posts: &mut [Post]) {
    posts.sort_by_key(|post| match post.id.as_numeric() {
        Some(n) => (false, n),
        None => (true, 0),
    });
}

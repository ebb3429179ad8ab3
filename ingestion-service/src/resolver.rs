//! Comment tree resolution.
//!
//! Comment pages arrive in arbitrary order: replies can land before the
//! comment they answer, parents can live on pages never fetched. The
//! resolver keeps a per-invocation map of `platform_comment_id → storage id`
//! and links children in two passes: immediately when the parent is already
//! known, and deferred (link-only update) once the parent shows up later in
//! the same run. State is owned by a single invocation's worker; nothing
//! here is shared across tasks.

use database::StoredComment;
use std::collections::HashMap;
use tracing::warn;
use trendlens_core::{Comment, Platform};

/// A deferred parent link that became resolvable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub platform: Platform,
    pub platform_comment_id: String,
    pub parent_platform_comment_id: String,
    pub parent_id: i64,
    pub post_id: i64,
}

#[derive(Debug, Clone)]
struct PendingLink {
    platform: Platform,
    platform_comment_id: String,
    parent_platform_comment_id: String,
    post_id: i64,
}

#[derive(Debug, Default)]
pub struct CommentTreeResolver {
    /// platform_comment_id → storage id, populated as rows are persisted.
    ids: HashMap<String, i64>,
    /// Children whose parent has not been persisted yet.
    pending: Vec<PendingLink>,
}

impl CommentTreeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `parent_id` for every comment whose parent is already known;
    /// queue the rest as pending links. Comments pass through otherwise
    /// untouched, so a child with an unknown parent is still persisted,
    /// with its platform-native parent id intact and `parent_id` null.
    pub fn prepare(&mut self, comments: Vec<Comment>) -> Vec<Comment> {
        comments
            .into_iter()
            .map(|mut comment| {
                if let Some(parent_native) = comment.parent_platform_comment_id.clone() {
                    match self.ids.get(parent_native.as_str()) {
                        Some(storage_id) => comment.parent_id = Some(*storage_id),
                        None => self.pending.push(PendingLink {
                            platform: comment.platform,
                            platform_comment_id: comment.platform_comment_id.clone(),
                            parent_platform_comment_id: parent_native,
                            post_id: comment.post_id,
                        }),
                    }
                }
                comment
            })
            .collect()
    }

    /// Record persisted rows so later children (and pending links) can
    /// resolve against them.
    pub fn record(&mut self, stored: &[StoredComment]) {
        for row in stored {
            self.ids.insert(row.platform_comment_id.clone(), row.id);
        }
    }

    /// Take every pending link whose parent has been persisted since it was
    /// queued. Links that still have no parent stay queued.
    pub fn drain_resolvable(&mut self) -> Vec<ParentLink> {
        let pending = std::mem::take(&mut self.pending);
        let (ready, waiting): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|link| self.ids.contains_key(link.parent_platform_comment_id.as_str()));
        self.pending = waiting;

        ready
            .into_iter()
            .map(|link| ParentLink {
                parent_id: self.ids[link.parent_platform_comment_id.as_str()],
                platform: link.platform,
                platform_comment_id: link.platform_comment_id,
                parent_platform_comment_id: link.parent_platform_comment_id,
                post_id: link.post_id,
            })
            .collect()
    }

    /// Children whose parent never appeared in this run.
    pub fn unresolved_count(&self) -> usize {
        self.pending.len()
    }

    /// Comments this invocation has seen persisted.
    pub fn known_count(&self) -> usize {
        self.ids.len()
    }

    /// Log leftovers. Parents on never-fetched pages are a reportable,
    /// non-fatal condition; the rows keep their platform-native parent id
    /// and a later run can finish the job.
    pub fn report_unresolved(&self) {
        for link in &self.pending {
            warn!(
                "Comment {} on {} still waiting for parent {} (not observed this run)",
                link.platform_comment_id, link.platform, link.parent_platform_comment_id
            );
        }
    }
}

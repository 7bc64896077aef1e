use anyhow::Result;
use async_trait::async_trait;
use domain::{AuthorId, Identity, NewComment, StoredComment};
use std::collections::{BTreeSet, HashMap};

use crate::subscription::Subscription;

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Every comment, newest first.
    async fn list_comments(&self) -> Result<Vec<StoredComment>>;

    async fn lookup_display_names(
        &self,
        ids: &BTreeSet<AuthorId>,
    ) -> Result<HashMap<AuthorId, String>>;

    async fn insert_comment(&self, comment: NewComment) -> Result<StoredComment>;

    /// Change notifications for the comment collection, delivered at least
    /// once. Dropping the returned handle unsubscribes.
    async fn subscribe(&self) -> Result<Subscription>;
}

pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

use anyhow::Result;
use async_trait::async_trait;
use domain::{AuthorId, ChangeEvent, NewComment, Profile, StoredComment};
use std::collections::{BTreeSet, HashMap};
use storage::Db;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::subscription::Subscription;
use crate::traits::CommentStore;

/// Comment store backed by the local database. Every successful insert is
/// published to in-process subscribers.
#[derive(Clone)]
pub struct SqliteStore {
    db: Db,
    tx_changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    pub fn new(db: Db, channel_capacity: usize) -> Self {
        let (tx_changes, _rx) = broadcast::channel(channel_capacity.max(1));
        Self { db, tx_changes }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Raw change stream, for fan-out to remote clients.
    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx_changes.subscribe()
    }

    pub async fn upsert_profile(&self, author_id: &AuthorId, display_name: &str) -> Result<Profile> {
        self.db.upsert_profile(author_id, display_name).await
    }

    fn publish(&self, event: ChangeEvent) {
        let receivers = self.tx_changes.send(event).unwrap_or(0);
        debug!("Change published to {} subscriber(s)", receivers);
    }
}

#[async_trait]
impl CommentStore for SqliteStore {
    async fn list_comments(&self) -> Result<Vec<StoredComment>> {
        self.db.list_comments().await
    }

    async fn lookup_display_names(
        &self,
        ids: &BTreeSet<AuthorId>,
    ) -> Result<HashMap<AuthorId, String>> {
        self.db.lookup_display_names(ids).await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<StoredComment> {
        let stored = self.db.insert_comment(&comment).await?;
        info!("Comment stored: {} by {}", stored.id, stored.author_id);
        self.publish(ChangeEvent::CommentInserted { id: stored.id });
        Ok(stored)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        Ok(Subscription::from_broadcast(self.tx_changes.subscribe()))
    }
}

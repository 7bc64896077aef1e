use crate::models::CommentId;
use serde::{Deserialize, Serialize};

/// Change notification for the comment collection. Subscribers must not
/// rely on the payload: any event only means "something changed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    CommentInserted { id: CommentId },
    /// Events were dropped somewhere upstream; state is unknown.
    Resync,
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FeedError;

/// Store-assigned comment identifier. Monotonic within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(i64);

impl CommentId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("Author ID cannot be empty.".to_string());
        }
        if trimmed.len() > 128 {
            return Err("Author ID is too long (max 128 chars).".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comment body that has already been trimmed and checked for emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommentText(String);

impl CommentText {
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FeedError::Validation("Comment cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for CommentText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        CommentText::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Who is signed in right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: AuthorId,
    /// Username from the profile, falls back to the account email.
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// A comment as the store persists it, before the profile join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredComment {
    pub id: CommentId,
    pub text: String,
    pub created_at: NaiveDateTime,
    pub author_id: AuthorId,
}

/// Insert request. `created_at` and `id` are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub text: CommentText,
    pub author_id: AuthorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub created_at: NaiveDateTime,
    pub author_id: AuthorId,
    pub author_display_name: Option<String>,
}

impl Comment {
    pub fn from_stored(stored: StoredComment, author_display_name: Option<String>) -> Self {
        Comment {
            id: stored.id,
            text: stored.text,
            created_at: stored.created_at,
            author_id: stored.author_id,
            author_display_name,
        }
    }
}

/// Newest first. The sort is stable, so equal timestamps keep the order
/// the store returned them in.
pub fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub author_id: AuthorId,
    pub display_name: String,
    pub updated_at: NaiveDateTime,
}

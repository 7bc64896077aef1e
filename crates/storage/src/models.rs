use chrono::NaiveDateTime;
use domain::{AuthorId, CommentId, Profile, StoredComment};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct SqlComment {
    pub id: i64,
    pub author_id: String,
    pub text: String,
    pub created_at: NaiveDateTime,
}

impl From<SqlComment> for StoredComment {
    fn from(sql: SqlComment) -> Self {
        StoredComment {
            id: CommentId::new(sql.id),
            text: sql.text,
            created_at: sql.created_at,
            author_id: AuthorId::new_unchecked(sql.author_id),
        }
    }
}

#[derive(FromRow)]
pub struct SqlProfile {
    pub author_id: String,
    pub display_name: String,
    pub updated_at: NaiveDateTime,
}

impl From<SqlProfile> for Profile {
    fn from(sql: SqlProfile) -> Self {
        Profile {
            author_id: AuthorId::new_unchecked(sql.author_id),
            display_name: sql.display_name,
            updated_at: sql.updated_at,
        }
    }
}

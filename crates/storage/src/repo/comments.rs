use crate::{models::SqlComment, Db};
use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use domain::{CommentId, NewComment, StoredComment};

impl Db {
    // 写入评论，created_at 由存储层决定
    pub async fn insert_comment(&self, c: &NewComment) -> anyhow::Result<StoredComment> {
        self.insert_comment_at(c, Utc::now().naive_utc()).await
    }

    pub async fn insert_comment_at(
        &self,
        c: &NewComment,
        created_at: NaiveDateTime,
    ) -> anyhow::Result<StoredComment> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (author_id, text, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(c.author_id.as_str())
        .bind(c.text.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert comment")?;

        let id = CommentId::new(result.last_insert_rowid());
        self.get_comment(id)
            .await?
            .with_context(|| format!("Comment {} missing after insert", id))
    }

    pub async fn get_comment(&self, id: CommentId) -> anyhow::Result<Option<StoredComment>> {
        let row = sqlx::query_as::<_, SqlComment>(
            r#"
            SELECT id, author_id, text, created_at
            FROM comments
            WHERE id = ?
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Newest first. Equal timestamps fall back to insertion order, newest first.
    pub async fn list_comments(&self) -> anyhow::Result<Vec<StoredComment>> {
        let rows = sqlx::query_as::<_, SqlComment>(
            r#"
            SELECT id, author_id, text, created_at
            FROM comments
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list comments")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_comments(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

use crate::{models::SqlProfile, Db};
use anyhow::Context;
use chrono::Utc;
use domain::{AuthorId, Profile};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::{BTreeSet, HashMap};

impl Db {
    pub async fn get_profile(&self, author_id: &AuthorId) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, SqlProfile>(
            r#"
            SELECT author_id, display_name, updated_at
            FROM profiles
            WHERE author_id = ?
            "#,
        )
        .bind(author_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile.map(Into::into))
    }

    // 注册时写入用户名，之后允许改名
    pub async fn upsert_profile(
        &self,
        author_id: &AuthorId,
        display_name: &str,
    ) -> anyhow::Result<Profile> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO profiles (author_id, display_name, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(author_id) DO UPDATE SET
                display_name = excluded.display_name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(author_id.as_str())
        .bind(display_name)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to upsert profile")?;

        self.get_profile(author_id)
            .await?
            .context("Profile missing after upsert")
    }

    /// One query for the whole id set. Ids without a profile are simply
    /// absent from the result.
    pub async fn lookup_display_names(
        &self,
        ids: &BTreeSet<AuthorId>,
    ) -> anyhow::Result<HashMap<AuthorId, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT author_id, display_name, updated_at FROM profiles WHERE author_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = qb
            .build_query_as::<SqlProfile>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to look up display names")?;

        Ok(rows
            .into_iter()
            .map(|p| (AuthorId::new_unchecked(p.author_id), p.display_name))
            .collect())
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::protocol::{LookupDisplayNamesRequest, UpsertProfileRequest};
use domain::{AuthorId, Profile};
use feed::{CommentStore, SqliteStore};
use std::collections::{BTreeSet, HashMap};

pub async fn lookup_display_names(
    State(store): State<SqliteStore>,
    Json(payload): Json<LookupDisplayNamesRequest>,
) -> Result<Json<HashMap<AuthorId, String>>, (StatusCode, String)> {
    let ids: BTreeSet<AuthorId> = payload.ids.into_iter().collect();

    let names = store.lookup_display_names(&ids).await.map_err(|e| {
        tracing::error!("Failed to look up display names: {:#}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(names))
}

pub async fn upsert_profile(
    State(store): State<SqliteStore>,
    Path(author_id): Path<String>,
    Json(payload): Json<UpsertProfileRequest>,
) -> Result<Json<Profile>, (StatusCode, String)> {
    let author_id = AuthorId::new(author_id).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Display name cannot be empty".to_string(),
        ));
    }

    let profile = store
        .upsert_profile(&author_id, display_name)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!("Profile updated: {} -> {}", author_id, display_name);
    Ok(Json(profile))
}

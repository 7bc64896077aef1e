use axum::{extract::State, http::StatusCode, Json};
use domain::protocol::CreateCommentRequest;
use domain::{AuthorId, CommentText, NewComment, StoredComment};
use feed::{CommentStore, SqliteStore};

pub async fn list_comments(
    State(store): State<SqliteStore>,
) -> Result<Json<Vec<StoredComment>>, (StatusCode, String)> {
    let comments = store.list_comments().await.map_err(|e| {
        tracing::error!("Failed to list comments: {:#}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(comments))
}

pub async fn post_comment(
    State(store): State<SqliteStore>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<StoredComment>), (StatusCode, String)> {
    let text =
        CommentText::parse(&payload.text).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let author_id = AuthorId::new(payload.author_id).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let stored = store
        .insert_comment(NewComment { text, author_id })
        .await
        .map_err(|e| {
            tracing::error!("Failed to store comment: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok((StatusCode::CREATED, Json(stored)))
}

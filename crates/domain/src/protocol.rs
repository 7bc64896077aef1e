use crate::models::AuthorId;
use serde::{Deserialize, Serialize};

// 评论服务 HTTP 接口的请求体，客户端和服务端共用

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
    pub author_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupDisplayNamesRequest {
    pub ids: Vec<AuthorId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertProfileRequest {
    pub display_name: String,
}

/// SSE event name used for change notifications.
pub const CHANGE_EVENT: &str = "change";

mod commands;
mod error;
mod events;
pub mod identity;
mod models;
pub mod protocol;

pub use commands::{AuthMode, AuthRequest};
pub use error::FeedError;
pub use events::ChangeEvent;
pub use identity::AuthorLabel;
pub use models::{
    sort_newest_first, AuthorId, Comment, CommentId, CommentText, Identity, NewComment, Profile,
    StoredComment,
};

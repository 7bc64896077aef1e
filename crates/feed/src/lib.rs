mod controller;
mod session;
mod signals;
pub mod stores;
mod subscription;
mod traits;

pub use controller::{FeedController, FeedState, FeedStatus, FeedView};
pub use session::Session;
pub use signals::{AuthPrompts, Notice, NoticeKind, Notices};
pub use stores::{HttpStore, SqliteStore};
pub use subscription::Subscription;
pub use traits::{CommentStore, IdentityProvider};

mod http;
mod sqlite;

pub use http::{HttpStore, SseDecoder, SseEvent};
pub use sqlite::SqliteStore;

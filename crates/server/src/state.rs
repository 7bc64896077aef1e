use axum::extract::FromRef;
use feed::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
}

impl FromRef<AppState> for SqliteStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use domain::{protocol::CHANGE_EVENT, ChangeEvent};
use feed::SqliteStore;
use futures::stream::Stream;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

pub async fn sse_handler(
    State(store): State<SqliteStore>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = store.changes();
    tracing::info!("SSE connected");

    let stream = BroadcastStream::new(rx).map(|result| {
        // 慢客户端丢了事件，只能让它整体刷新
        let event = result.unwrap_or_else(|lagged| {
            tracing::warn!("SSE client lagged: {}", lagged);
            ChangeEvent::Resync
        });
        Event::default()
            .event(CHANGE_EVENT)
            .json_data(event)
            .map_err(|e| {
                tracing::error!("SSE serialization error: {}", e);
                axum::Error::new(e)
            })
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}

use actix_web::{http::header, web, web::Bytes, HttpResponse};
use futures::{stream, Stream};
use log::{info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    errors::ApiError,
    handlers::auth::Requester,
    services::{ChannelPublisher, PoolEvent},
};

/// Encode one event as a Server-Sent Events frame
pub fn sse_frame(event: &PoolEvent) -> Bytes {
    let payload = serde_json::to_value(event).unwrap_or_default();
    let kind = payload
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("message")
        .to_string();
    Bytes::from(format!("event: {}\ndata: {}\n\n", kind, payload))
}

/// Frames for every event received on `rx`. Ends when the channel closes;
/// events lost to a slow reader are skipped.
pub fn event_stream(
    rx: broadcast::Receiver<PoolEvent>,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Ok(sse_frame(&event)), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// GET /notifications - Streams the requester's pool events as Server-Sent Events
///
/// Only events published while the stream is open are delivered.
pub async fn pool_events_handler(
    requester: Requester,
    publisher: web::Data<ChannelPublisher>,
) -> Result<HttpResponse, ApiError> {
    info!("Handling GET /notifications request from {}", requester.id());
    let rx = publisher.subscribe(requester.id());

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(event_stream(rx)))
}

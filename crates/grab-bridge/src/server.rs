use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{AgentRequestBody, BridgeError, TransportBridge};

pub fn router(bridge: Arc<TransportBridge>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent", post(agent))
        .route("/screenshot/{id}/{index}", get(screenshot))
        .with_state(bridge)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves until `shutdown` resolves. Server failures are logged here; the
/// caller has nothing left to clean up.
pub async fn serve(
    listener: TcpListener,
    bridge: Arc<TransportBridge>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "bridge listening"),
        Err(error) => error!(error = %error, "bridge listener has no local address"),
    }
    if let Err(error) = axum::serve(listener, router(bridge))
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %error, "bridge server stopped with an error");
        return;
    }
    info!("bridge stopped");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn agent(
    State(bridge): State<Arc<TransportBridge>>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, BridgeError> {
    let body: AgentRequestBody = serde_json::from_slice(&body).map_err(BridgeError::InvalidJson)?;
    let events = bridge.submit(body)?;
    let stream = UnboundedReceiverStream::new(events).map(|event| Ok(event.to_sse()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn screenshot(
    State(bridge): State<Arc<TransportBridge>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Response, BridgeError> {
    let image = bridge
        .screenshot(&id, index)
        .ok_or(BridgeError::ScreenshotNotFound)?;
    let bytes = image.decode().map_err(BridgeError::InvalidScreenshot)?;
    Ok(([(header::CONTENT_TYPE, image.normalized_mime_type())], bytes).into_response())
}

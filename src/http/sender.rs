//! The sender-side handler (spec.md §4.2, §6): `POST`/`PUT` to a rendezvous
//! path. The response headers go out immediately — this crate never knows
//! in advance how long quorum will take to reach, so the body is a stream
//! of progress lines that the rendezvous engine feeds as things happen.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::rendezvous::{self, SenderRegistration};
use crate::state::AppState;

pub async fn handle(
    state: AppState,
    path: String,
    n: Option<&str>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let registration = rendezvous::register_sender(
        &state.registry,
        &path,
        n,
        body,
        content_type,
        content_length,
    );

    match registration {
        Ok(SenderRegistration { progress_rx }) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from_stream(UnboundedReceiverStream::new(progress_rx)))
            .expect("a fixed set of well-formed headers never fails to build"),
        Err(e) => e.into_response(),
    }
}

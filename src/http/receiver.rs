//! The receiver-side handler (spec.md §4.2, §6): `GET` on a rendezvous path.
//!
//! Response headers can't be sent until the transfer is established (they
//! depend on the sender's content-type/length, which isn't known until the
//! sender itself registers), so the handler blocks on [`rendezvous::register_receiver`]'s
//! `established_rx` before building any part of the response. If the client
//! disconnects first, axum drops this future outright and the registration's
//! [`crate::participant::DropGuard`] performs the cleanup instead.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::rendezvous::{self, ReceiverRegistration};
use crate::state::AppState;

pub async fn handle(state: AppState, path: String, n: Option<&str>) -> Response {
    let registration = rendezvous::register_receiver(&state.registry, &path, n);

    let ReceiverRegistration {
        established_rx,
        guard,
    } = match registration {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match established_rx.await {
        Ok(established) => {
            guard.disarm();
            let mut headers = HeaderMap::new();
            if let Some(ct) = established.content_type {
                headers.insert(axum::http::header::CONTENT_TYPE, ct);
            }
            if let Some(len) = established.content_length {
                headers.insert(axum::http::header::CONTENT_LENGTH, len.into());
            }
            (StatusCode::OK, headers, established.body).into_response()
        }
        // The pipe reached quorum but the transfer engine tore it down
        // before this receiver ever got a body (e.g. a malformed multipart
        // sender). No bytes were promised yet, so a plain error response is
        // still possible.
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}

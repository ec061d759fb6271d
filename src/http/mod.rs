pub mod pages;
pub mod receiver;
pub mod sender;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::messages;
use crate::path;
use crate::state::AppState;

/// Pull a single query parameter's raw value out of a request URI's query
/// string. Parameter values in this protocol are always small integers, so
/// no percent-decoding is needed.
fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// The single catch-all dispatcher (spec.md §4.5 — component C5). Every
/// rendezvous path is arbitrary and user-chosen, so routing happens here by
/// (method, canonicalized path) rather than through a fixed route table.
pub async fn fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let method = parts.method;
    let uri: Uri = parts.uri;
    let path = path::canonicalize(uri.path());
    let n = query_param(uri.query(), "n");

    if method == Method::GET {
        match path.as_str() {
            "/" => pages::landing(parts.headers).await.into_response(),
            "/version" => pages::version().await.into_response(),
            "/help" => pages::help(parts.headers).await.into_response(),
            _ => receiver::handle(state, path, n).await,
        }
    } else if method == Method::POST || method == Method::PUT {
        sender::handle(state, path, n, parts.headers, body).await
    } else {
        (
            StatusCode::BAD_REQUEST,
            messages::unsupported_method(method.as_str()),
        )
            .into_response()
    }
}

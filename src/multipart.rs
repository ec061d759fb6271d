//! Multipart adapter (spec.md §4.6 — component C6).
//!
//! `multipart/form-data` senders (e.g. an HTML `<form>`) wrap the real
//! payload inside the first part. Rather than buffering the part the way
//! [`axum::extract::Multipart`] does, this goes straight to the `multer`
//! crate it wraps internally, so the first part's bytes are forwarded to
//! receivers as they arrive off the wire (spec.md §1, no in-memory
//! buffering of transfer bodies). Only the first part is ever read; any
//! further parts are left unparsed.

use axum::body::Body;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::TransferError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send>>;

pub struct PartHeaders {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// Open `body` as `multipart/form-data` and return the first part's headers
/// and byte stream. This is async because locating the first part requires
/// reading past its preceding boundary line; callers run it from the
/// transfer engine's task, never from inside [`crate::registry::Registry::with_lock`].
pub async fn first_part(
    body: Body,
    content_type: &str,
) -> Result<(PartHeaders, ByteStream), TransferError> {
    let boundary =
        multer::parse_boundary(content_type).map_err(|e| TransferError::Multipart(e.to_string()))?;
    let stream = body.into_data_stream();
    let mut multipart = multer::Multipart::new(stream, boundary);

    let field = multipart
        .next_field()
        .await
        .map_err(|e| TransferError::Multipart(e.to_string()))?
        .ok_or_else(|| TransferError::Multipart("multipart body had no parts".to_owned()))?;

    let headers = PartHeaders {
        content_type: field.content_type().map(std::string::ToString::to_string),
        content_length: field
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok()),
    };

    let chunks = field.map(|r| r.map_err(|e| TransferError::Multipart(e.to_string())));
    Ok((headers, Box::pin(chunks)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn first_part_exposes_the_leading_parts_headers_and_bytes() {
        let raw = concat!(
            "--X-BOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hello multipart\r\n",
            "--X-BOUNDARY--\r\n",
        );
        let body = Body::from(Bytes::from_static(raw.as_bytes()));

        let (headers, stream) = first_part(body, "multipart/form-data; boundary=X-BOUNDARY")
            .await
            .unwrap();

        assert_eq!(headers.content_type.as_deref(), Some("text/plain"));
        assert_eq!(collect(stream).await, b"hello multipart");
    }

    #[tokio::test]
    async fn first_part_rejects_a_body_with_no_parts() {
        let body = Body::from(Bytes::from_static(b"--X-BOUNDARY--\r\n"));

        let err = first_part(body, "multipart/form-data; boundary=X-BOUNDARY")
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Multipart(_)));
    }

    #[tokio::test]
    async fn first_part_rejects_a_malformed_content_type() {
        let body = Body::from(Bytes::from_static(b""));

        let err = first_part(body, "multipart/form-data").await.unwrap_err();

        assert!(matches!(err, TransferError::Multipart(_)));
    }
}

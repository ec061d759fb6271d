//! The transfer engine (spec.md §4.4 — component C4).
//!
//! Runs once per established pipe, as its own detached task: reads the
//! sender's body and fans each chunk out to every still-live receiver,
//! pausing on the slowest one (spec.md §5, real backpressure — no
//! unbounded buffering and no dropped chunks for a live receiver). A
//! receiver is "still live" until its bounded channel send fails, at which
//! point it's removed from the fan-out and everyone else keeps flowing
//! (spec.md §4.4 Testable Property: one dead receiver cannot starve another).

use std::io;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::HeaderValue;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::TransferError;
use crate::messages;
use crate::registry::{BodyTx, EstablishedPipe, Registry};

/// What a receiver's handler needs to build its final `Response` once the
/// transfer is established: the chosen content-type/length (mirroring the
/// sender's, or the first multipart part's) and a body stream fed by the
/// fan-out loop.
pub struct EstablishedReceiver {
    pub content_type: Option<HeaderValue>,
    pub content_length: Option<u64>,
    pub body: Body,
}

const RECEIVER_CHANNEL_CAPACITY: usize = 4;

fn io_err(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Drive one established pipe to completion. Consumes the pipe: every
/// participant's connection is either handed a response body and released
/// to the fan-out loop, or torn down here.
pub async fn run_transfer(path: String, pipe: EstablishedPipe, registry: Arc<Registry>) {
    let EstablishedPipe { sender, receivers } = pipe;
    let total = receivers.len();

    let is_multipart = sender
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"));

    let source: Result<(Option<HeaderValue>, Option<u64>, _), TransferError> =
        match sender.content_type.as_deref() {
            Some(ct) if is_multipart => {
                match crate::multipart::first_part(sender.request_body, ct).await {
                    Ok((headers, stream)) => {
                        let content_type = headers
                            .content_type
                            .and_then(|s| HeaderValue::from_str(&s).ok());
                        let boxed: Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send>> =
                            stream;
                        Ok((content_type, headers.content_length, boxed))
                    }
                    Err(e) => Err(e),
                }
            }
            _ => {
                let content_type = sender
                    .content_type
                    .as_deref()
                    .and_then(|s| HeaderValue::from_str(s).ok());
                let stream = sender
                    .request_body
                    .into_data_stream()
                    .map(|r| r.map_err(|e| TransferError::Source(e.to_string())));
                let boxed: Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send>> =
                    Box::pin(stream);
                Ok((content_type, sender.content_length, boxed))
            }
        };

    let (content_type, content_length, mut source) = match source {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%path, error = %e, "transfer failed before any bytes were sent");
            fail_everyone(&sender.progress_tx, receivers);
            registry.with_lock(|inner| inner.clear_established(&path));
            return;
        }
    };

    // Hand every receiver its response body and collect the still-open data
    // channels. A receiver whose handler has already given up (oneshot
    // reply rejected) counts as closed from the start.
    let mut active: Vec<BodyTx> = Vec::with_capacity(total);
    for receiver in receivers {
        let (tx, rx) = mpsc::channel(RECEIVER_CHANNEL_CAPACITY);
        let body = Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx));
        let established = EstablishedReceiver {
            content_type: content_type.clone(),
            content_length,
            body,
        };
        if receiver.reply.send(established).is_ok() {
            active.push(tx);
        }
    }

    if active.is_empty() {
        // Every receiver vanished before the transfer could start.
        let _ = sender
            .progress_tx
            .send(Ok(Bytes::from(messages::all_receivers_closed())));
        registry.with_lock(|inner| inner.clear_established(&path));
        return;
    }

    let outcome = fan_out(&mut source, &mut active).await;

    match outcome {
        Outcome::Completed => {
            let _ = sender
                .progress_tx
                .send(Ok(Bytes::from(messages::sending_successful())));
        }
        Outcome::SourceFailed(e) => {
            tracing::warn!(%path, error = %e, "source body errored mid-transfer");
            let _ = sender
                .progress_tx
                .send(Ok(Bytes::from(messages::sending_failed())));
            for tx in active {
                let _ = tx.send(Err(io_err("source connection closed"))).await;
            }
        }
        Outcome::AllReceiversClosed => {
            let _ = sender
                .progress_tx
                .send(Ok(Bytes::from(messages::all_receivers_closed())));
        }
    }

    registry.with_lock(|inner| inner.clear_established(&path));
}

enum Outcome {
    Completed,
    SourceFailed(TransferError),
    AllReceiversClosed,
}

/// Pull chunks from `source` and push each to every still-live receiver in
/// `active`, removing any whose channel has closed. The loop is paced by
/// the slowest live receiver: each chunk is only considered delivered once
/// every live `send` has resolved.
async fn fan_out(
    source: &mut (impl Stream<Item = Result<Bytes, TransferError>> + Unpin),
    active: &mut Vec<BodyTx>,
) -> Outcome {
    loop {
        if active.is_empty() {
            return Outcome::AllReceiversClosed;
        }
        let Some(next) = source.next().await else {
            return Outcome::Completed;
        };
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => return Outcome::SourceFailed(e),
        };

        let sends = active
            .iter()
            .map(|tx| tx.send(Ok(chunk.clone())))
            .collect::<Vec<_>>();
        let results = futures_util::future::join_all(sends).await;
        let mut still_live = Vec::with_capacity(active.len());
        for (tx, result) in active.drain(..).zip(results) {
            if result.is_ok() {
                still_live.push(tx);
            }
        }
        *active = still_live;
    }
}

/// Tear down a pipe that failed before the fan-out could start: tell the
/// sender and drop every receiver's reply sender (which resolves their
/// still-pending `oneshot` as cancelled, ending their handlers).
fn fail_everyone(
    progress_tx: &crate::registry::ProgressTx,
    receivers: Vec<crate::registry::PendingReceiver>,
) {
    let _ = progress_tx.send(Ok(Bytes::from(messages::sending_failed())));
    drop(receivers);
}

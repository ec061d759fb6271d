//! The rendezvous state machine (spec.md §4.2 — component C2).
//!
//! Translates one sender or receiver arrival into a registry mutation, the
//! progress lines it produces, and — if quorum is reached — a spawned
//! [`crate::transfer::run_transfer`] task. Every check here runs inside a
//! single [`Registry::with_lock`] critical section per arrival, so two
//! concurrent arrivals on the same path are always serialized (spec.md §5).

use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::messages;
use crate::participant::{CloseWatcher, DropGuard, ParticipantId};
use crate::path;
use crate::registry::{EstablishedPipe, PendingReceiver, PendingSender, ProgressRx, ProgressTx, Registry};
use crate::transfer::{run_transfer, EstablishedReceiver};

/// A rejected arrival: a fixed status and body, written verbatim to the
/// client (spec.md §7).
pub struct ProtocolError {
    pub status: StatusCode,
    pub body: String,
}

impl ProtocolError {
    fn new(status: StatusCode, body: String) -> Self {
        Self { status, body }
    }

    fn bad_request(body: String) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

/// What a sender's HTTP handler gets back on success: the receiving half of
/// its own progress-line channel, from which it builds the response body it
/// returns immediately (spec.md §4.2, headers are sent before establishment).
pub struct SenderRegistration {
    pub progress_rx: ProgressRx,
}

/// What a receiver's HTTP handler gets back on success: a future that
/// resolves once the transfer is established (or the pipe is torn down
/// first) and an RAII guard it must `disarm` once that future resolves.
pub struct ReceiverRegistration {
    pub established_rx: oneshot::Receiver<EstablishedReceiver>,
    pub guard: DropGuard<Box<dyn FnOnce() + Send>>,
}

fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.parse::<i64>().ok()).unwrap_or(1)
}

/// Register a sender on `path` for a request with query string `query`.
#[allow(clippy::too_many_arguments)]
pub fn register_sender(
    registry: &Arc<Registry>,
    path: &str,
    raw_n: Option<&str>,
    request_body: Body,
    content_type: Option<String>,
    content_length: Option<u64>,
) -> Result<SenderRegistration, ProtocolError> {
    if path::is_reserved(path) {
        return Err(ProtocolError::bad_request(messages::reserved_path(path)));
    }
    let n = parse_count(raw_n);
    if n <= 0 {
        return Err(ProtocolError::bad_request(messages::bad_count(n)));
    }
    let expected = n as usize;

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let id = ParticipantId::next();

    let established = registry.with_lock(|inner| -> Result<Option<EstablishedPipe>, ProtocolError> {
        if inner.is_established(path) {
            return Err(ProtocolError::bad_request(
                messages::already_established_sender(path),
            ));
        }
        let pipe = inner.get_or_create_unestablished(path, expected);
        if pipe.sender.is_some() {
            return Err(ProtocolError::bad_request(messages::duplicate_sender(path)));
        }
        if pipe.expected != expected {
            return Err(ProtocolError::bad_request(messages::count_mismatch(
                pipe.expected,
                n,
            )));
        }

        let _ = progress_tx.send(Ok(Bytes::from(messages::waiting_for_receivers(expected))));
        let connected = pipe.receivers.len();
        if connected > 0 {
            let _ = progress_tx.send(Ok(Bytes::from(messages::receivers_connected(connected))));
        }
        let quorum_met = connected == expected;
        if quorum_met {
            let _ = progress_tx.send(Ok(Bytes::from(messages::start_sending())));
        }

        let watcher = spawn_sender_watcher(registry, path, id, progress_tx.clone());
        pipe.sender = Some(PendingSender {
            id,
            progress_tx,
            request_body,
            content_type,
            content_length,
            watcher,
        });
        Ok(inner.try_take_established(path))
    })?;

    if let Some(est) = established {
        est.sender.watcher.revoke();
        spawn_transfer(registry, path, est);
    }

    Ok(SenderRegistration { progress_rx })
}

/// Register a receiver on `path` for a request with query string `query`.
pub fn register_receiver(
    registry: &Arc<Registry>,
    path: &str,
    raw_n: Option<&str>,
) -> Result<ReceiverRegistration, ProtocolError> {
    let n = parse_count(raw_n);
    if n <= 0 {
        return Err(ProtocolError::bad_request(messages::bad_count(n)));
    }
    let expected = n as usize;

    let (reply_tx, established_rx) = oneshot::channel();
    let id = ParticipantId::next();

    let established = registry.with_lock(|inner| -> Result<Option<EstablishedPipe>, ProtocolError> {
        if inner.is_established(path) {
            return Err(ProtocolError::bad_request(
                messages::already_established_receiver(path),
            ));
        }
        let pipe = inner.get_or_create_unestablished(path, expected);
        if pipe.expected != expected {
            return Err(ProtocolError::bad_request(messages::count_mismatch(
                pipe.expected,
                n,
            )));
        }
        if pipe.receivers.len() >= pipe.expected {
            return Err(ProtocolError::bad_request(messages::receivers_full()));
        }

        pipe.receivers.push(PendingReceiver { id, reply: reply_tx });

        if let Some(sender) = &pipe.sender {
            let _ = sender
                .progress_tx
                .send(Ok(Bytes::from(messages::receiver_connected())));
            if pipe.receivers.len() == pipe.expected {
                let _ = sender
                    .progress_tx
                    .send(Ok(Bytes::from(messages::start_sending_with(pipe.expected))));
            }
        }

        Ok(inner.try_take_established(path))
    })?;

    let guard = spawn_receiver_guard(registry, path, id);

    if let Some(est) = established {
        est.sender.watcher.revoke();
        spawn_transfer(registry, path, est);
    }

    Ok(ReceiverRegistration {
        established_rx,
        guard,
    })
}

fn spawn_sender_watcher(
    registry: &Arc<Registry>,
    path: &str,
    id: ParticipantId,
    progress_tx: ProgressTx,
) -> CloseWatcher {
    let registry = Arc::clone(registry);
    let path = path.to_owned();
    CloseWatcher::spawn(
        async move { progress_tx.closed().await },
        move || {
            registry.with_lock(|inner| {
                if let Some(pipe) = inner.get_unestablished(&path) {
                    if pipe.sender.as_ref().is_some_and(|s| s.id == id) {
                        pipe.sender = None;
                    }
                }
                inner.remove_if_dead(&path);
            });
        },
    )
}

fn spawn_receiver_guard(
    registry: &Arc<Registry>,
    path: &str,
    id: ParticipantId,
) -> DropGuard<Box<dyn FnOnce() + Send>> {
    let registry = Arc::clone(registry);
    let path = path.to_owned();
    DropGuard::new(Box::new(move || {
        registry.with_lock(|inner| {
            if let Some(pipe) = inner.get_unestablished(&path) {
                pipe.receivers.retain(|r| r.id != id);
            }
            inner.remove_if_dead(&path);
        });
    }))
}

fn spawn_transfer(registry: &Arc<Registry>, path: &str, established: EstablishedPipe) {
    let task_registry = Arc::clone(registry);
    let path = path.to_owned();
    let handle = tokio::spawn(async move { run_transfer(path, established, task_registry).await });
    registry.register_transfer_task(handle.abort_handle());
}

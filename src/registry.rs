//! The path registry (spec.md §3, §4.1 — component C1).
//!
//! Holds the process-wide mapping from canonical path to rendezvous state.
//! All mutation happens inside [`Registry::with_lock`]'s critical section,
//! which never spans body I/O (spec.md §5): callers do whatever lookup,
//! insert, or establishment check they need in one lock acquisition, then
//! release the lock before touching any network I/O. A single mutex guards
//! the whole map, matching the "expected load is small" option spec.md §4.1
//! allows.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use crate::participant::{CloseWatcher, ParticipantId};

/// Receiver-side data channel, used only once a transfer is established and
/// bytes are actually flowing (spec.md §4.4). Bounded, so a slow receiver
/// applies real backpressure to the fan-out loop.
pub type BodyTx = mpsc::Sender<Result<Bytes, std::io::Error>>;

/// Sender-side progress channel. The sender's response body is nothing but
/// short status lines (never payload bytes), so it is unbounded: writing a
/// line from inside [`Registry::with_lock`]'s synchronous critical section
/// must never block or await.
pub type ProgressTx = mpsc::UnboundedSender<Result<Bytes, std::io::Error>>;
pub type ProgressRx = mpsc::UnboundedReceiver<Result<Bytes, std::io::Error>>;

/// A sender registered on a path, waiting for (or already forming part of)
/// an established transfer.
pub struct PendingSender {
    pub id: ParticipantId,
    /// The channel backing the sender's already-returned streaming response;
    /// progress lines are written here as the rendezvous proceeds.
    pub progress_tx: ProgressTx,
    pub request_body: Body,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub watcher: CloseWatcher,
}

/// A receiver registered on a path, still blocking its HTTP handler until
/// establishment (or disconnect) resolves it.
pub struct PendingReceiver {
    pub id: ParticipantId,
    /// Fulfilled exactly once, at establishment, by the transfer engine —
    /// never by the registry itself (headers aren't known until the
    /// transfer engine inspects the source body, spec.md §4.4).
    pub reply: oneshot::Sender<super::transfer::EstablishedReceiver>,
}

/// Per-path record before quorum is reached (spec.md §3 `UnestablishedPipe`).
pub struct Pipe {
    pub expected: usize,
    pub sender: Option<PendingSender>,
    pub receivers: Vec<PendingReceiver>,
}

impl Pipe {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            sender: None,
            receivers: Vec::new(),
        }
    }

    /// Is this pipe empty enough to delete (spec.md §3 lifecycle rule,
    /// Testable Property 5)?
    fn is_dead(&self) -> bool {
        self.sender.is_none() && self.receivers.is_empty()
    }
}

/// A pipe that has just reached quorum, handed to the transfer engine.
pub struct EstablishedPipe {
    pub sender: PendingSender,
    pub receivers: Vec<PendingReceiver>,
}

#[derive(Default)]
pub(crate) struct Inner {
    pipes: HashMap<String, Pipe>,
    established: HashSet<String>,
}

impl Inner {
    // ---- C1 operations (spec.md §4.1) ----------------------------------

    pub(crate) fn get_or_create_unestablished(&mut self, path: &str, expected: usize) -> &mut Pipe {
        self.pipes
            .entry(path.to_owned())
            .or_insert_with(|| Pipe::new(expected))
    }

    pub(crate) fn get_unestablished(&mut self, path: &str) -> Option<&mut Pipe> {
        self.pipes.get_mut(path)
    }

    /// Remove the pipe at `path` if it is dead (no sender, no receivers).
    pub(crate) fn remove_if_dead(&mut self, path: &str) {
        if self.pipes.get(path).is_some_and(Pipe::is_dead) {
            self.pipes.remove(path);
        }
    }

    pub(crate) fn is_established(&self, path: &str) -> bool {
        self.established.contains(path)
    }

    pub(crate) fn mark_established(&mut self, path: &str) {
        self.established.insert(path.to_owned());
    }

    pub(crate) fn clear_established(&mut self, path: &str) {
        self.established.remove(path);
    }

    /// The establishment predicate (spec.md §4.2): a sender and exactly
    /// `expected` receivers are present. If true, removes and returns the
    /// pipe, replacing the unestablished record with the established flag.
    pub(crate) fn try_take_established(&mut self, path: &str) -> Option<EstablishedPipe> {
        let ready = self
            .pipes
            .get(path)
            .is_some_and(|p| p.sender.is_some() && p.receivers.len() == p.expected);
        if !ready {
            return None;
        }
        let pipe = self.pipes.remove(path).expect("checked above");
        self.mark_established(path);
        Some(EstablishedPipe {
            sender: pipe.sender.expect("checked above"),
            receivers: pipe.receivers,
        })
    }
}

/// Process-wide registry (spec.md §3 `Registry`).
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
    /// Abort handles for every currently-spawned [`crate::transfer::run_transfer`]
    /// task, so process shutdown can forcibly destroy in-flight transfers
    /// rather than waiting for them to drain (spec.md §9, "teardown at
    /// shutdown must destroy any in-flight transfers by tearing down
    /// participant connections").
    transfers: Mutex<Vec<AbortHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` as one atomic critical section over the registry's state.
    /// Must never `.await` inside `f` — see the module docs.
    pub(crate) fn with_lock<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard)
    }

    /// Track a freshly-spawned transfer task so it can be aborted on
    /// shutdown. Opportunistically prunes handles for tasks that have
    /// already finished, so this list never grows unbounded.
    pub(crate) fn register_transfer_task(&self, handle: AbortHandle) {
        let mut transfers = self.transfers.lock().unwrap();
        transfers.retain(|h| !h.is_finished());
        transfers.push(handle);
    }

    /// Forcibly abort every in-flight transfer task. Aborting mid-`.await`
    /// drops each task's receiver channels and the sender's progress
    /// channel, which ends every participant's response body immediately
    /// instead of letting the transfer run to completion.
    pub fn abort_all_transfers(&self) {
        let transfers = self.transfers.lock().unwrap();
        for handle in transfers.iter() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_for_the_same_path() {
        let mut inner = Inner::default();
        inner.get_or_create_unestablished("/foo", 2);
        assert_eq!(inner.get_unestablished("/foo").unwrap().expected, 2);
        // A second arrival on the same path must observe the same record,
        // not a freshly reset one.
        inner.get_or_create_unestablished("/foo", 99);
        assert_eq!(inner.get_unestablished("/foo").unwrap().expected, 2);
    }

    #[test]
    fn dead_pipe_is_removed_live_pipe_is_kept() {
        let mut inner = Inner::default();
        inner.get_or_create_unestablished("/foo", 1);
        inner.remove_if_dead("/foo");
        assert!(inner.get_unestablished("/foo").is_none());
    }

    #[test]
    fn established_flag_round_trips() {
        let mut inner = Inner::default();
        assert!(!inner.is_established("/foo"));
        inner.mark_established("/foo");
        assert!(inner.is_established("/foo"));
        inner.clear_established("/foo");
        assert!(!inner.is_established("/foo"));
    }
}

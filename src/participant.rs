//! Participant identity and the revocable close-watcher (spec.md §3, §4.3, §9).
//!
//! A participant's lifetime is tied to its underlying HTTP connection, which
//! this crate never touches directly (spec.md §1 treats connection teardown
//! as an external collaborator's concern). Two mechanisms stand in for the
//! "close-watcher" the spec describes, chosen per which side of the
//! rendezvous the participant is on:
//!
//! - A **sender** already has a response in flight (its progress lines are
//!   streaming out), so its disconnect signal is the response body channel's
//!   [`tokio::sync::mpsc::Sender::closed`] future resolving. [`CloseWatcher`]
//!   wraps that in a background task, cancellable via a one-shot revoke.
//! - A **receiver** that hasn't been established yet is still blocking the
//!   handler future that will eventually produce its response. If the
//!   client disconnects, the HTTP layer drops that future before it
//!   resolves — so [`DropGuard`] performs the deregistration synchronously
//!   in its `Drop` impl, with no background task needed at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

/// Opaque per-registration identity, used to remove a participant from a
/// pipe's receiver list by identity rather than by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A background watcher that deregisters a sender when its response body
/// channel is dropped by the HTTP layer (i.e. the client disconnected),
/// unless revoked first.
///
/// Revocation is idempotent: establishment revokes every live watcher
/// exactly once, before the participant is handed to the transfer engine
/// (spec.md §4.2, Testable Property 4).
pub struct CloseWatcher {
    revoke: Mutex<Option<oneshot::Sender<()>>>,
}

impl CloseWatcher {
    /// Spawn a task that runs `on_close` if `closed` resolves before the
    /// watcher is revoked.
    pub fn spawn<C>(closed: C, on_close: impl FnOnce() + Send + 'static) -> Self
    where
        C: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::select! {
                () = closed => on_close(),
                _ = rx => {}
            }
        });
        Self {
            revoke: Mutex::new(Some(tx)),
        }
    }

    /// Cancel the watcher. Safe to call more than once or after the watcher
    /// has already fired.
    pub fn revoke(&self) {
        if let Some(tx) = self.revoke.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}

/// An RAII guard that runs `on_drop` exactly once, unless [`disarm`] is
/// called first.
///
/// [`disarm`]: DropGuard::disarm
pub struct DropGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> DropGuard<F> {
    pub fn new(on_drop: F) -> Self {
        Self {
            on_drop: Some(on_drop),
        }
    }

    /// Prevent `on_drop` from running. Consumes the guard.
    pub fn disarm(mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for DropGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn drop_guard_runs_on_drop_when_armed() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        {
            let _guard = DropGuard::new(move || ran2.store(true, Ordering::SeqCst));
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_guard_skips_on_drop_when_disarmed() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let guard = DropGuard::new(move || ran2.store(true, Ordering::SeqCst));
        guard.disarm();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_watcher_fires_when_closed_future_resolves_first() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _watcher = CloseWatcher::spawn(
            async move {
                let _ = rx.await;
            },
            move || ran2.store(true, Ordering::SeqCst),
        );
        tx.send(()).unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_watcher_revoke_prevents_on_close() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let watcher = CloseWatcher::spawn(
            async move {
                let _ = rx.await;
            },
            move || ran2.store(true, Ordering::SeqCst),
        );
        watcher.revoke();
        drop(tx);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn participant_ids_are_distinct() {
        let a = ParticipantId::next();
        let b = ParticipantId::next();
        assert_ne!(a, b);
    }
}

//! Internal error types for the transfer engine (spec.md §4.4, §7).
//!
//! These never reach a client directly — by the time a `TransferError`
//! occurs, the sender and receivers already have an HTTP response in flight
//! (spec.md §1, "headers are never revised after they are sent"), so the
//! only observable effect is the fixed progress line `[ERROR] Sending
//! Failed.\n` plus connection teardown, handled in [`crate::transfer`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error("source read error: {0}")]
    Source(String),
}

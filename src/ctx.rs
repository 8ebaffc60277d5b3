//! Algorithm-context envelopes.
//!
//! An envelope is the caller-facing, per-operation handle: it owns a strong
//! reference to a resolved implementation record plus the opaque working
//! state that record's `newctx` allocated, and forwards the
//! init/update/final-style calls to the record's slots while policing the
//! lifecycle:
//!
//! ```text
//! new() → reset → init(params…) → (update|set_params|get_params)* → final → reset|free
//!                   ↑___________________________|
//! ```
//!
//! Envelopes are single-owner values: they are deliberately not `Sync` to
//! share, and hand-off between threads goes through `dup`, which produces an
//! observationally equivalent context sharing no mutable state. Calls made
//! out of order fail with [`crate::Error::Misuse`] and leak nothing.

pub mod cipher;
pub mod digest;
pub mod keyexch;

pub use cipher::{CipherContext, Direction};
pub use digest::DigestContext;
pub use keyexch::KeyexchContext;

use crate::dispatch::{CtxFreeFn, Opaque};

bitflags::bitflags! {
    /// Lifecycle flags carried by every envelope.
    pub struct CtxFlags: u8 {
        /// The current working state has had its cleanup hook run.
        const CLEANED = 1 << 0;
        /// The working state may be reused by a re-`init` with the same
        /// implementation (the re-initialization fast path).
        const REUSE = 1 << 1;
        /// The bound implementation only runs single-shot; the envelope is
        /// buffering input on its behalf.
        const ONESHOT = 1 << 2;
        /// Skip the implementation's `init` slot: the caller prepares the
        /// state through other means.
        const NO_INIT = 1 << 3;
        /// `reset` leaves the attached public-key context in place.
        const KEEP_PKEY_CTX = 1 << 4;
    }
}

/// Runs the implementation's cleanup hook over `state` exactly once and
/// releases it. Shared by every envelope's reset/drop paths.
pub(crate) fn release_state(
    state: &mut Option<Box<dyn Opaque>>,
    free: Option<&CtxFreeFn>,
    flags: &mut CtxFlags,
) {
    if let Some(mut live) = state.take() {
        if !flags.contains(CtxFlags::CLEANED) {
            if let Some(free) = free {
                (free.0)(&mut *live);
            }
        }
        flags.insert(CtxFlags::CLEANED);
    }
}

//! Implementation records: dispatch tables decoded into typed, refcounted
//! per-operation methods.
//!
//! A record is built once from a provider's table by the operation's
//! adapter ([`FromDispatch`]), is immutable afterwards, and keeps its
//! provider alive through a strong back-edge for as long as any store or
//! context references it. The records for different operations share a
//! store, so they are kept behind the object-safe [`Method`] trait and
//! recovered by downcast at the fetch boundary.

pub mod cipher;
pub mod digest;
pub mod keyexch;
pub mod keymgmt;

pub use cipher::CipherMethod;
pub use digest::DigestMethod;
pub use keyexch::KeyexchMethod;
pub use keymgmt::KeymgmtMethod;

use crate::{
    dispatch::{Algorithm, Operation},
    names::{self, NameId},
    provider::Provider,
    Error, Result,
};
use downcast_rs::{impl_downcast, DowncastSync};
use std::sync::Arc;

/// What every implementation record exposes regardless of operation kind.
pub trait Method: DowncastSync + std::fmt::Debug {
    /// The operation kind this record implements.
    fn operation(&self) -> Operation;

    /// The canonical name id the record was registered under.
    fn name_id(&self) -> NameId;

    /// The provider that produced the record. Strong: providers outlive
    /// their implementations.
    fn provider(&self) -> &Arc<Provider>;

    /// Numeric id carried over from a pre-provider registry, if any.
    fn legacy_id(&self) -> Option<u32> {
        None
    }
}

impl_downcast!(sync Method);

/// The type-specific adapter from a raw dispatch table to a typed record.
pub(crate) trait FromDispatch: Method + Sized {
    /// The operation kind this adapter decodes for.
    const OPERATION: Operation;

    /// Decodes `algorithm`'s table, enforcing the operation's completeness
    /// rule. Fails with [`Error::Incomplete`] and allocates nothing on
    /// violation.
    fn from_dispatch(
        provider: &Arc<Provider>,
        name_id: NameId,
        algorithm: &Algorithm,
    ) -> Result<Self>;
}

/// The canonical member of a colon-separated name string.
pub(crate) fn canonical_name(algorithm: &Algorithm) -> &str {
    names::split_names(&algorithm.names).next().unwrap_or("")
}

/// Builds the per-operation incomplete-implementation error.
pub(crate) fn incomplete(
    operation: Operation,
    algorithm: &Algorithm,
    detail: impl Into<String>,
) -> Error {
    Error::Incomplete {
        operation,
        name: canonical_name(algorithm).to_owned(),
        detail: detail.into(),
    }
}

/// Shared decode preamble: rejects reserved ids up front.
pub(crate) fn check_table(operation: Operation, algorithm: &Algorithm) -> Result<()> {
    crate::dispatch::check_ids(&algorithm.dispatch)
        .map_err(|detail| incomplete(operation, algorithm, detail))
}

/// Maps a slot-signature mismatch into the operation's incomplete error.
pub(crate) fn bad_slot(operation: Operation, algorithm: &Algorithm) -> impl Fn(u32) -> Error + '_ {
    move |id| incomplete(operation, algorithm, format!("slot {} has the wrong signature", id))
}

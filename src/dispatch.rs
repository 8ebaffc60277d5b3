//! The numeric ABI between the runtime and its providers.
//!
//! Providers advertise implementations as *dispatch tables*: sequences of
//! `(function id, function)` pairs. Function ids are small stable integers,
//! namespaced per operation kind; id `0` is reserved and never a valid slot.
//! The runtime copies functions out of a table by id while building an
//! implementation record and never touches the table again. Ids it does not
//! recognize are skipped, so providers built against a newer slot list keep
//! working.
//!
//! On the caller-facing side these tables are decoded into typed per-operation
//! records (see [`crate::methods`]); the raw pairs only exist at the provider
//! boundary.

use crate::{params::Params, Result};
use downcast_rs::{impl_downcast, DowncastSync};
use std::{borrow::Cow, sync::Arc};

/// The closed set of operation kinds the runtime dispatches.
///
/// Discriminants are part of the ABI and never reused. Zero is reserved as a
/// terminator value and is not a member.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum Operation {
    /// Message digests.
    Digest = 1,
    /// Symmetric ciphers.
    Cipher = 2,
    /// Key management: domain parameters and key objects.
    Keymgmt = 10,
    /// Key exchange.
    Keyexch = 11,
}

impl Operation {
    /// Every member of the enumeration, for callers that sweep all
    /// operation kinds.
    pub const ALL: [Operation; 4] =
        [Operation::Digest, Operation::Cipher, Operation::Keymgmt, Operation::Keyexch];
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Digest => "digest",
            Operation::Cipher => "cipher",
            Operation::Keymgmt => "keymgmt",
            Operation::Keyexch => "keyexch",
        })
    }
}

/// Opaque state that crosses the provider boundary: per-context working
/// memory, provider contexts, key objects. The runtime never looks inside;
/// providers downcast back to their concrete types.
pub trait Opaque: DowncastSync {}

impl_downcast!(sync Opaque);

/// A shared handle to provider-owned key material or domain parameters.
pub type KeyHandle = Arc<dyn Opaque>;

macro_rules! slot_fn {
    ($(#[$meta:meta])* $name:ident => $($sig:tt)+) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(pub(crate) Arc<dyn $($sig)+ + Send + Sync>);

        impl $name {
            /// Wraps a function for use in a [`DispatchEntry`].
            pub fn new(f: impl $($sig)+ + Send + Sync + 'static) -> Self {
                Self(Arc::new(f))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

slot_fn! {
    /// Allocates a fresh opaque context for an implementation.
    CtxNewFn => Fn() -> Result<Box<dyn Opaque>>
}
slot_fn! {
    /// Cleanup hook run on an opaque context before it is dropped, e.g. for
    /// zeroization. Deallocation itself is `Drop`.
    CtxFreeFn => Fn(&mut dyn Opaque)
}
slot_fn! {
    /// Duplicates an opaque context; the copy must share no mutable state
    /// with the original.
    CtxDupFn => Fn(&dyn Opaque) -> Result<Box<dyn Opaque>>
}
slot_fn! {
    /// Reconfigures a live context from a parameter set.
    CtxSetParamsFn => Fn(&mut dyn Opaque, &Params) -> Result<()>
}
slot_fn! {
    /// Reads parameters out of a live context.
    CtxGetParamsFn => Fn(&dyn Opaque, &mut Params) -> Result<()>
}
slot_fn! {
    /// Reports a fixed size in bytes, e.g. digest or block size.
    SizeFn => Fn() -> usize
}
slot_fn! {
    /// Reads parameters describing the implementation itself.
    MethodGetParamsFn => Fn(&mut Params) -> Result<()>
}

slot_fn! {
    /// Starts (or restarts) a digest computation.
    DigestInitFn => Fn(&mut dyn Opaque, &Params) -> Result<()>
}
slot_fn! {
    /// Absorbs input into a digest computation.
    DigestUpdateFn => Fn(&mut dyn Opaque, &[u8]) -> Result<()>
}
slot_fn! {
    /// Produces the digest into the output buffer, returning bytes written.
    DigestFinalFn => Fn(&mut dyn Opaque, &mut [u8]) -> Result<usize>
}
slot_fn! {
    /// Single-shot digest of one input, bypassing init/update/final.
    DigestOneshotFn => Fn(&[u8], &mut [u8]) -> Result<usize>
}

slot_fn! {
    /// Keys a cipher context for one direction with `(key, iv, params)`.
    CipherInitFn => Fn(&mut dyn Opaque, &[u8], &[u8], &Params) -> Result<()>
}
slot_fn! {
    /// Transforms input into the output buffer, returning bytes written.
    CipherUpdateFn => Fn(&mut dyn Opaque, &mut [u8], &[u8]) -> Result<usize>
}
slot_fn! {
    /// Finishes a cipher stream, flushing any tail bytes.
    CipherFinalFn => Fn(&mut dyn Opaque, &mut [u8]) -> Result<usize>
}
slot_fn! {
    /// Single-shot cipher of one input on a keyed context.
    CipherOneshotFn => Fn(&mut dyn Opaque, &mut [u8], &[u8]) -> Result<usize>
}

slot_fn! {
    /// Binds the local key to a key-exchange context.
    KeyexchInitFn => Fn(&mut dyn Opaque, KeyHandle, &Params) -> Result<()>
}
slot_fn! {
    /// Binds the peer's key to a key-exchange context.
    KeyexchSetPeerFn => Fn(&mut dyn Opaque, KeyHandle) -> Result<()>
}
slot_fn! {
    /// Derives the shared secret. With no buffer, reports the exact secret
    /// size; with one, writes the secret and returns bytes written.
    KeyexchDeriveFn => Fn(&mut dyn Opaque, Option<&mut [u8]>) -> Result<usize>
}

slot_fn! {
    /// Produces a key-management object (domain parameters, or a key with no
    /// base parameters) from a parameter set.
    KeymgmtGenFn => Fn(&Params) -> Result<KeyHandle>
}
slot_fn! {
    /// Produces a key, optionally derived from existing domain parameters.
    KeymgmtGenKeyFn => Fn(Option<&KeyHandle>, &Params) -> Result<KeyHandle>
}
slot_fn! {
    /// Serializes a key-management object into a parameter set.
    KeymgmtExportFn => Fn(&dyn Opaque, &mut Params) -> Result<()>
}
slot_fn! {
    /// Cleanup hook run on a key-management object at explicit release.
    KeymgmtFreeFn => Fn(&dyn Opaque)
}

slot_fn! {
    /// Releases everything a provider allocated at init.
    ProviderTeardownFn => Fn(&dyn Opaque) -> Result<()>
}
slot_fn! {
    /// Reads provider-level parameters (name, version, status).
    ProviderGetParamsFn => Fn(&dyn Opaque, &mut Params) -> Result<()>
}
slot_fn! {
    /// Describes the parameters [`ProviderGetParamsFn`] can fill, as an
    /// unfilled request.
    ProviderGetParamTypesFn => Fn() -> Params
}
slot_fn! {
    /// Lists the algorithm tables a provider offers for one operation.
    ProviderQueryFn => Fn(&dyn Opaque, Operation) -> AlgorithmList
}
slot_fn! {
    /// Maps provider reason codes to human-readable strings.
    ProviderReasonsFn => Fn() -> Vec<(u32, &'static str)>
}

/// Function ids a provider's own dispatch table may carry, decoded at
/// registration.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u32)]
pub enum ProviderFunction {
    /// [`ProviderTeardownFn`]
    Teardown = 1,
    /// [`ProviderGetParamTypesFn`]
    GetParamTypes = 2,
    /// [`ProviderGetParamsFn`]
    GetParams = 3,
    /// [`ProviderQueryFn`], the only required entry.
    QueryOperation = 4,
    /// [`ProviderReasonsFn`]
    GetReasonStrings = 5,
}

/// Function ids valid in a digest dispatch table.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u32)]
pub enum DigestFunction {
    /// [`CtxNewFn`]
    NewCtx = 1,
    /// [`DigestInitFn`]
    Init = 2,
    /// [`DigestUpdateFn`]
    Update = 3,
    /// [`DigestFinalFn`]
    Final = 4,
    /// [`DigestOneshotFn`]
    Digest = 5,
    /// [`CtxFreeFn`]
    FreeCtx = 6,
    /// [`CtxDupFn`]
    DupCtx = 7,
    /// [`SizeFn`], mandatory for every digest.
    Size = 8,
    /// [`SizeFn`]
    BlockSize = 9,
    /// [`CtxSetParamsFn`]
    SetCtxParams = 10,
    /// [`CtxGetParamsFn`]
    GetCtxParams = 11,
}

/// Function ids valid in a cipher dispatch table.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u32)]
pub enum CipherFunction {
    /// [`CtxNewFn`]
    NewCtx = 1,
    /// [`CipherInitFn`] for encryption.
    EncryptInit = 2,
    /// [`CipherInitFn`] for decryption.
    DecryptInit = 3,
    /// [`CipherUpdateFn`]
    Update = 4,
    /// [`CipherFinalFn`]
    Final = 5,
    /// [`CipherOneshotFn`]
    Cipher = 6,
    /// [`CtxFreeFn`]
    FreeCtx = 7,
    /// [`CtxDupFn`]
    DupCtx = 8,
    /// [`MethodGetParamsFn`]
    GetParams = 9,
    /// [`CtxGetParamsFn`]
    GetCtxParams = 10,
    /// [`CtxSetParamsFn`]
    SetCtxParams = 11,
}

/// Function ids valid in a key-exchange dispatch table.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u32)]
pub enum KeyexchFunction {
    /// [`CtxNewFn`]
    NewCtx = 1,
    /// [`KeyexchInitFn`]
    Init = 2,
    /// [`KeyexchSetPeerFn`]
    SetPeer = 3,
    /// [`KeyexchDeriveFn`]
    Derive = 4,
    /// [`CtxFreeFn`]
    FreeCtx = 5,
    /// [`CtxDupFn`]
    DupCtx = 6,
    /// [`CtxSetParamsFn`]
    SetCtxParams = 7,
}

/// Function ids valid in a key-management dispatch table. Domain parameters
/// and keys have disjoint slot sets.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u32)]
pub enum KeymgmtFunction {
    /// [`KeymgmtGenFn`] for domain parameters.
    GenParams = 1,
    /// [`KeymgmtGenFn`] loading domain parameters from a reference.
    LoadParams = 2,
    /// [`KeymgmtGenFn`] importing domain parameters.
    ImportParams = 3,
    /// [`KeymgmtExportFn`] for domain parameters.
    ExportParams = 4,
    /// [`KeymgmtFreeFn`] for domain parameters.
    FreeParams = 5,
    /// [`KeymgmtGenKeyFn`]
    GenKey = 6,
    /// [`KeymgmtGenFn`] loading a key from a reference.
    LoadKey = 7,
    /// [`KeymgmtGenFn`] importing a key.
    ImportKey = 8,
    /// [`KeymgmtExportFn`] for keys.
    ExportKey = 9,
    /// [`KeymgmtFreeFn`] for keys.
    FreeKey = 10,
}

/// One `(function id, function)` pair in a dispatch table.
///
/// The function is type-erased here; the per-operation adapters recover the
/// typed slot by id. A table is a plain slice of entries; the C-style
/// `(0, null)` terminator is subsumed by slice length, and id `0` stays
/// reserved.
#[derive(Clone, Debug)]
pub struct DispatchEntry {
    id: u32,
    function: ErasedFn,
}

#[derive(Clone)]
struct ErasedFn(Arc<dyn std::any::Any + Send + Sync>);

impl std::fmt::Debug for ErasedFn {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("..")
    }
}

impl DispatchEntry {
    /// Pairs a function id with one of the `*Fn` slot wrappers above.
    pub fn new<I, T>(id: I, function: T) -> Self
    where
        I: Into<u32>,
        T: std::any::Any + Send + Sync,
    {
        Self { id: id.into(), function: ErasedFn(Arc::new(function)) }
    }

    /// The numeric slot this entry fills.
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Looks up slot `id` in `table` and recovers it at type `T`.
///
/// `Ok(None)` when absent, `Err(id)` when present with the wrong signature;
/// adapters report the latter as an incomplete implementation.
pub(crate) fn find_slot<T>(table: &[DispatchEntry], id: impl Into<u32>) -> Result<Option<T>, u32>
where
    T: Clone + 'static,
{
    let id = id.into();
    for entry in table {
        if entry.id == id {
            return match entry.function.0.downcast_ref::<T>() {
                Some(f) => Ok(Some(f.clone())),
                None => Err(id),
            };
        }
    }
    Ok(None)
}

/// Rejects tables that use the reserved terminator id.
pub(crate) fn check_ids(table: &[DispatchEntry]) -> Result<(), &'static str> {
    if table.iter().any(|e| e.id == 0) {
        Err("function id 0 is reserved")
    } else {
        Ok(())
    }
}

/// One algorithm a provider offers for some operation: a name string
/// (colon-separated aliases, canonical first), a property definition
/// describing what the implementation provides, and the dispatch table
/// itself.
#[derive(Clone, Debug)]
pub struct Algorithm {
    /// Colon-separated algorithm names, canonical spelling first.
    pub names: Cow<'static, str>,
    /// Property definition string, e.g. `"provider=soft,fips=yes"`.
    pub properties: Cow<'static, str>,
    /// Numeric id carried over from a pre-provider registry, if any.
    pub legacy_id: Option<u32>,
    /// The implementation's dispatch table.
    pub dispatch: Vec<DispatchEntry>,
}

impl Algorithm {
    /// A table entry with no legacy id.
    pub fn new(
        names: impl Into<Cow<'static, str>>,
        properties: impl Into<Cow<'static, str>>,
        dispatch: Vec<DispatchEntry>,
    ) -> Self {
        Self { names: names.into(), properties: properties.into(), legacy_id: None, dispatch }
    }
}

/// Everything a provider returns for one `query_operation` call.
#[derive(Clone, Debug, Default)]
pub struct AlgorithmList {
    /// The algorithms offered for the queried operation.
    pub algorithms: Vec<Algorithm>,
    /// When set, resolved methods are handed to the caller but never
    /// promoted into the library context's store or query cache.
    pub no_store: bool,
}

impl AlgorithmList {
    /// Wraps a plain list with caching allowed.
    pub fn new(algorithms: Vec<Algorithm>) -> Self {
        Self { algorithms, no_store: false }
    }
}

//! The digest implementation record.

use super::{bad_slot, check_table, incomplete, FromDispatch, Method};
use crate::{
    dispatch::{
        find_slot, Algorithm, CtxDupFn, CtxFreeFn, CtxGetParamsFn, CtxNewFn, CtxSetParamsFn,
        DigestFinalFn, DigestFunction, DigestInitFn, DigestOneshotFn, DigestUpdateFn, Operation,
        SizeFn,
    },
    names::NameId,
    provider::Provider,
    Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct DigestFns {
    pub(crate) newctx: Option<CtxNewFn>,
    pub(crate) init: Option<DigestInitFn>,
    pub(crate) update: Option<DigestUpdateFn>,
    pub(crate) finish: Option<DigestFinalFn>,
    pub(crate) oneshot: Option<DigestOneshotFn>,
    pub(crate) free: Option<CtxFreeFn>,
    pub(crate) dup: Option<CtxDupFn>,
    pub(crate) size: SizeFn,
    pub(crate) block_size: Option<SizeFn>,
    pub(crate) set_ctx_params: Option<CtxSetParamsFn>,
    pub(crate) get_ctx_params: Option<CtxGetParamsFn>,
}

/// A resolved digest implementation.
///
/// Either the streaming five-function set (`new`, `init`, `update`, `final`,
/// `free`) or the single-shot `digest` slot is guaranteed present, and `size`
/// always is; anything less fails decoding.
pub struct DigestMethod {
    provider: Arc<Provider>,
    name_id: NameId,
    legacy_id: Option<u32>,
    pub(crate) fns: DigestFns,
}

impl DigestMethod {
    /// Resolves the best digest implementation for `name` under `properties`
    /// in `libctx`. See [`crate::LibCtx`] for query semantics.
    pub fn fetch(
        libctx: &Arc<crate::LibCtx>,
        name: &str,
        properties: Option<&str>,
    ) -> Result<Arc<Self>> {
        crate::fetch::generic_fetch(libctx, name, properties)
    }

    /// Visits every digest every registered provider offers, once per
    /// `(provider, algorithm)` pair.
    pub fn do_all(libctx: &Arc<crate::LibCtx>, f: impl FnMut(Arc<Self>)) -> Result<()> {
        crate::fetch::generic_do_all(libctx, f)
    }

    /// The digest size in bytes.
    pub fn size(&self) -> usize {
        (self.fns.size.0)()
    }

    /// The digest block size in bytes, when the implementation reports one.
    pub fn block_size(&self) -> Option<usize> {
        self.fns.block_size.as_ref().map(|f| (f.0)())
    }

    /// Whether the full streaming function set is present, as opposed to
    /// only the single-shot `digest` slot.
    pub(crate) fn streaming(&self) -> bool {
        self.fns.newctx.is_some()
            && self.fns.init.is_some()
            && self.fns.update.is_some()
            && self.fns.finish.is_some()
            && self.fns.free.is_some()
    }
}

impl Method for DigestMethod {
    fn operation(&self) -> Operation {
        Operation::Digest
    }

    fn name_id(&self) -> NameId {
        self.name_id
    }

    fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    fn legacy_id(&self) -> Option<u32> {
        self.legacy_id
    }
}

impl std::fmt::Debug for DigestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DigestMethod")
            .field("provider", &self.provider.name())
            .field("name_id", &self.name_id.get())
            .field("size", &self.size())
            .finish()
    }
}

impl FromDispatch for DigestMethod {
    const OPERATION: Operation = Operation::Digest;

    fn from_dispatch(
        provider: &Arc<Provider>,
        name_id: NameId,
        algorithm: &Algorithm,
    ) -> Result<Self> {
        let op = Self::OPERATION;
        check_table(op, algorithm)?;
        let table = &algorithm.dispatch;
        let bad = bad_slot(op, algorithm);

        let fns = DigestFns {
            newctx: find_slot(table, DigestFunction::NewCtx).map_err(&bad)?,
            init: find_slot(table, DigestFunction::Init).map_err(&bad)?,
            update: find_slot(table, DigestFunction::Update).map_err(&bad)?,
            finish: find_slot(table, DigestFunction::Final).map_err(&bad)?,
            oneshot: find_slot(table, DigestFunction::Digest).map_err(&bad)?,
            free: find_slot(table, DigestFunction::FreeCtx).map_err(&bad)?,
            dup: find_slot(table, DigestFunction::DupCtx).map_err(&bad)?,
            size: find_slot(table, DigestFunction::Size)
                .map_err(&bad)?
                .ok_or_else(|| incomplete(op, algorithm, "the mandatory `size` slot is missing"))?,
            block_size: find_slot(table, DigestFunction::BlockSize).map_err(&bad)?,
            set_ctx_params: find_slot(table, DigestFunction::SetCtxParams).map_err(&bad)?,
            get_ctx_params: find_slot(table, DigestFunction::GetCtxParams).map_err(&bad)?,
        };

        let streaming = fns.newctx.is_some()
            && fns.init.is_some()
            && fns.update.is_some()
            && fns.finish.is_some()
            && fns.free.is_some();
        if !streaming && fns.oneshot.is_none() {
            return Err(incomplete(
                op,
                algorithm,
                "neither the full init/update/final set nor a one-shot `digest` slot is present",
            ));
        }

        Ok(Self {
            provider: provider.clone(),
            name_id,
            legacy_id: algorithm.legacy_id,
            fns,
        })
    }
}

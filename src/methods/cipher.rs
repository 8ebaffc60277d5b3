//! The cipher implementation record.

use super::{bad_slot, check_table, incomplete, FromDispatch, Method};
use crate::{
    dispatch::{
        find_slot, Algorithm, CipherFinalFn, CipherFunction, CipherInitFn, CipherOneshotFn,
        CipherUpdateFn, CtxDupFn, CtxFreeFn, CtxGetParamsFn, CtxNewFn, CtxSetParamsFn,
        MethodGetParamsFn, Operation,
    },
    names::NameId,
    params::Params,
    provider::Provider,
    Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct CipherFns {
    pub(crate) newctx: Option<CtxNewFn>,
    pub(crate) encrypt_init: Option<CipherInitFn>,
    pub(crate) decrypt_init: Option<CipherInitFn>,
    pub(crate) update: Option<CipherUpdateFn>,
    pub(crate) finish: Option<CipherFinalFn>,
    pub(crate) oneshot: Option<CipherOneshotFn>,
    pub(crate) free: Option<CtxFreeFn>,
    pub(crate) dup: Option<CtxDupFn>,
    pub(crate) get_params: Option<MethodGetParamsFn>,
    pub(crate) get_ctx_params: Option<CtxGetParamsFn>,
    pub(crate) set_ctx_params: Option<CtxSetParamsFn>,
}

/// A resolved cipher implementation.
///
/// Guaranteed to have `new`, at least one keying direction, and either the
/// streaming `update`/`final` pair or the single-shot `cipher` slot.
pub struct CipherMethod {
    provider: Arc<Provider>,
    name_id: NameId,
    legacy_id: Option<u32>,
    pub(crate) fns: CipherFns,
}

impl CipherMethod {
    /// Resolves the best cipher implementation for `name` under `properties`
    /// in `libctx`.
    pub fn fetch(
        libctx: &Arc<crate::LibCtx>,
        name: &str,
        properties: Option<&str>,
    ) -> Result<Arc<Self>> {
        crate::fetch::generic_fetch(libctx, name, properties)
    }

    /// Visits every cipher every registered provider offers.
    pub fn do_all(libctx: &Arc<crate::LibCtx>, f: impl FnMut(Arc<Self>)) -> Result<()> {
        crate::fetch::generic_do_all(libctx, f)
    }

    /// Reads implementation-level parameters (key length, block size, ...)
    /// into the requests in `params`.
    pub fn get_params(&self, params: &mut Params) -> Result<()> {
        match &self.fns.get_params {
            Some(f) => (f.0)(params),
            None => Ok(()),
        }
    }
}

impl Method for CipherMethod {
    fn operation(&self) -> Operation {
        Operation::Cipher
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

impl std::fmt::Debug for CipherMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CipherMethod")
            .field("provider", &self.provider.name())
            .field("name_id", &self.name_id.get())
            .finish()
    }
}

impl FromDispatch for CipherMethod {
    const OPERATION: Operation = Operation::Cipher;

    fn from_dispatch(
        provider: &Arc<Provider>,
        name_id: NameId,
        algorithm: &Algorithm,
    ) -> Result<Self> {
        let op = Self::OPERATION;
        check_table(op, algorithm)?;
        let table = &algorithm.dispatch;
        let bad = bad_slot(op, algorithm);

        let fns = CipherFns {
            newctx: find_slot(table, CipherFunction::NewCtx).map_err(&bad)?,
            encrypt_init: find_slot(table, CipherFunction::EncryptInit).map_err(&bad)?,
            decrypt_init: find_slot(table, CipherFunction::DecryptInit).map_err(&bad)?,
            update: find_slot(table, CipherFunction::Update).map_err(&bad)?,
            finish: find_slot(table, CipherFunction::Final).map_err(&bad)?,
            oneshot: find_slot(table, CipherFunction::Cipher).map_err(&bad)?,
            free: find_slot(table, CipherFunction::FreeCtx).map_err(&bad)?,
            dup: find_slot(table, CipherFunction::DupCtx).map_err(&bad)?,
            get_params: find_slot(table, CipherFunction::GetParams).map_err(&bad)?,
            get_ctx_params: find_slot(table, CipherFunction::GetCtxParams).map_err(&bad)?,
            set_ctx_params: find_slot(table, CipherFunction::SetCtxParams).map_err(&bad)?,
        };

        if fns.newctx.is_none() {
            return Err(incomplete(op, algorithm, "the mandatory `newctx` slot is missing"));
        }
        if fns.encrypt_init.is_none() && fns.decrypt_init.is_none() {
            return Err(incomplete(op, algorithm, "no keying direction is present"));
        }
        let streaming = fns.update.is_some() && fns.finish.is_some();
        if !streaming && fns.oneshot.is_none() {
            return Err(incomplete(
                op,
                algorithm,
                "neither the update/final pair nor a one-shot `cipher` slot is present",
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

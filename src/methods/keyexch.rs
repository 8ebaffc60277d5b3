//! The key-exchange implementation record.

use super::{bad_slot, check_table, incomplete, FromDispatch, Method};
use crate::{
    dispatch::{
        find_slot, Algorithm, CtxDupFn, CtxFreeFn, CtxNewFn, CtxSetParamsFn, KeyexchDeriveFn,
        KeyexchFunction, KeyexchInitFn, KeyexchSetPeerFn, Operation,
    },
    names::NameId,
    provider::Provider,
    Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct KeyexchFns {
    pub(crate) newctx: CtxNewFn,
    pub(crate) init: KeyexchInitFn,
    pub(crate) set_peer: KeyexchSetPeerFn,
    pub(crate) derive: KeyexchDeriveFn,
    pub(crate) free: Option<CtxFreeFn>,
    pub(crate) dup: Option<CtxDupFn>,
    pub(crate) set_ctx_params: Option<CtxSetParamsFn>,
}

/// A resolved key-exchange implementation. `new`, `init`, `set_peer`, and
/// `derive` are guaranteed present.
pub struct KeyexchMethod {
    provider: Arc<Provider>,
    name_id: NameId,
    legacy_id: Option<u32>,
    pub(crate) fns: KeyexchFns,
}

impl KeyexchMethod {
    /// Resolves the best key-exchange implementation for `name` under
    /// `properties` in `libctx`.
    pub fn fetch(
        libctx: &Arc<crate::LibCtx>,
        name: &str,
        properties: Option<&str>,
    ) -> Result<Arc<Self>> {
        crate::fetch::generic_fetch(libctx, name, properties)
    }

    /// Visits every key-exchange every registered provider offers.
    pub fn do_all(libctx: &Arc<crate::LibCtx>, f: impl FnMut(Arc<Self>)) -> Result<()> {
        crate::fetch::generic_do_all(libctx, f)
    }
}

impl Method for KeyexchMethod {
    fn operation(&self) -> Operation {
        Operation::Keyexch
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

impl std::fmt::Debug for KeyexchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("KeyexchMethod")
            .field("provider", &self.provider.name())
            .field("name_id", &self.name_id.get())
            .finish()
    }
}

impl FromDispatch for KeyexchMethod {
    const OPERATION: Operation = Operation::Keyexch;

    fn from_dispatch(
        provider: &Arc<Provider>,
        name_id: NameId,
        algorithm: &Algorithm,
    ) -> Result<Self> {
        let op = Self::OPERATION;
        check_table(op, algorithm)?;
        let table = &algorithm.dispatch;
        let bad = bad_slot(op, algorithm);

        let missing = |what: &'static str| {
            incomplete(op, algorithm, format!("the mandatory `{}` slot is missing", what))
        };

        let newctx = find_slot(table, KeyexchFunction::NewCtx)
            .map_err(&bad)?
            .ok_or_else(|| missing("newctx"))?;
        let init = find_slot(table, KeyexchFunction::Init)
            .map_err(&bad)?
            .ok_or_else(|| missing("init"))?;
        let set_peer = find_slot(table, KeyexchFunction::SetPeer)
            .map_err(&bad)?
            .ok_or_else(|| missing("set_peer"))?;
        let derive = find_slot(table, KeyexchFunction::Derive)
            .map_err(&bad)?
            .ok_or_else(|| missing("derive"))?;

        Ok(Self {
            provider: provider.clone(),
            name_id,
            legacy_id: algorithm.legacy_id,
            fns: KeyexchFns {
                newctx,
                init,
                set_peer,
                derive,
                free: find_slot(table, KeyexchFunction::FreeCtx).map_err(&bad)?,
                dup: find_slot(table, KeyexchFunction::DupCtx).map_err(&bad)?,
                set_ctx_params: find_slot(table, KeyexchFunction::SetCtxParams).map_err(&bad)?,
            },
        })
    }
}

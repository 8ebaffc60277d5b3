//! The key-management implementation record.
//!
//! Key management deals in two kinds of provider-owned objects with disjoint
//! slot sets: *domain parameters* and *keys*. A key may be generated from
//! domain parameters; handing one provider's parameters to another
//! provider's keymgmt is undefined and deliberately not detected here.

use super::{bad_slot, check_table, incomplete, FromDispatch, Method};
use crate::{
    dispatch::{
        find_slot, Algorithm, KeyHandle, KeymgmtExportFn, KeymgmtFreeFn, KeymgmtFunction,
        KeymgmtGenFn, KeymgmtGenKeyFn, Operation,
    },
    names::NameId,
    params::Params,
    provider::Provider,
    Error, Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct KeymgmtFns {
    pub(crate) gen_params: Option<KeymgmtGenFn>,
    pub(crate) load_params: Option<KeymgmtGenFn>,
    pub(crate) import_params: Option<KeymgmtGenFn>,
    pub(crate) export_params: Option<KeymgmtExportFn>,
    pub(crate) free_params: Option<KeymgmtFreeFn>,
    pub(crate) gen_key: Option<KeymgmtGenKeyFn>,
    pub(crate) load_key: Option<KeymgmtGenFn>,
    pub(crate) import_key: Option<KeymgmtGenFn>,
    pub(crate) export_key: Option<KeymgmtExportFn>,
    pub(crate) free_key: Option<KeymgmtFreeFn>,
}

/// A resolved key-management implementation. At least one way of producing
/// a key (`generate`, `import`, or `load`) is guaranteed present.
pub struct KeymgmtMethod {
    provider: Arc<Provider>,
    name_id: NameId,
    legacy_id: Option<u32>,
    fns: KeymgmtFns,
}

impl KeymgmtMethod {
    /// Resolves the best key-management implementation for `name` under
    /// `properties` in `libctx`.
    pub fn fetch(
        libctx: &Arc<crate::LibCtx>,
        name: &str,
        properties: Option<&str>,
    ) -> Result<Arc<Self>> {
        crate::fetch::generic_fetch(libctx, name, properties)
    }

    /// Visits every key-management implementation every registered provider
    /// offers.
    pub fn do_all(libctx: &Arc<crate::LibCtx>, f: impl FnMut(Arc<Self>)) -> Result<()> {
        crate::fetch::generic_do_all(libctx, f)
    }

    /// Generates fresh domain parameters.
    pub fn generate_parameters(&self, params: &Params) -> Result<KeyHandle> {
        match &self.fns.gen_params {
            Some(f) => (f.0)(params),
            None => Err(Error::Unsupported("generate_parameters")),
        }
    }

    /// Imports domain parameters from a parameter set.
    pub fn import_parameters(&self, params: &Params) -> Result<KeyHandle> {
        match &self.fns.import_params {
            Some(f) => (f.0)(params),
            None => Err(Error::Unsupported("import_parameters")),
        }
    }

    /// Serializes domain parameters into the requests in `params`.
    pub fn export_parameters(&self, object: &KeyHandle, params: &mut Params) -> Result<()> {
        match &self.fns.export_params {
            Some(f) => (f.0)(&**object, params),
            None => Err(Error::Unsupported("export_parameters")),
        }
    }

    /// Loads domain parameters from a provider-defined reference.
    pub fn load_parameters(&self, params: &Params) -> Result<KeyHandle> {
        match &self.fns.load_params {
            Some(f) => (f.0)(params),
            None => Err(Error::Unsupported("load_parameters")),
        }
    }

    /// Releases domain parameters, running the provider's cleanup hook.
    pub fn free_parameters(&self, object: KeyHandle) {
        if let Some(f) = &self.fns.free_params {
            (f.0)(&*object);
        }
        drop(object);
    }

    /// Generates a key, optionally on top of existing domain parameters.
    ///
    /// `base` must come from this same implementation; mixing providers is
    /// undefined.
    pub fn generate_key(&self, base: Option<&KeyHandle>, params: &Params) -> Result<KeyHandle> {
        match &self.fns.gen_key {
            Some(f) => (f.0)(base, params),
            None => Err(Error::Unsupported("generate_key")),
        }
    }

    /// Imports a key from a parameter set.
    pub fn import_key(&self, params: &Params) -> Result<KeyHandle> {
        match &self.fns.import_key {
            Some(f) => (f.0)(params),
            None => Err(Error::Unsupported("import_key")),
        }
    }

    /// Serializes a key into the requests in `params`.
    pub fn export_key(&self, key: &KeyHandle, params: &mut Params) -> Result<()> {
        match &self.fns.export_key {
            Some(f) => (f.0)(&**key, params),
            None => Err(Error::Unsupported("export_key")),
        }
    }

    /// Loads a key from a provider-defined reference.
    pub fn load_key(&self, params: &Params) -> Result<KeyHandle> {
        match &self.fns.load_key {
            Some(f) => (f.0)(params),
            None => Err(Error::Unsupported("load_key")),
        }
    }

    /// Releases a key, running the provider's cleanup hook.
    pub fn free_key(&self, key: KeyHandle) {
        if let Some(f) = &self.fns.free_key {
            (f.0)(&*key);
        }
        drop(key);
    }
}

impl Method for KeymgmtMethod {
    fn operation(&self) -> Operation {
        Operation::Keymgmt
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

impl std::fmt::Debug for KeymgmtMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("KeymgmtMethod")
            .field("provider", &self.provider.name())
            .field("name_id", &self.name_id.get())
            .finish()
    }
}

impl FromDispatch for KeymgmtMethod {
    const OPERATION: Operation = Operation::Keymgmt;

    fn from_dispatch(
        provider: &Arc<Provider>,
        name_id: NameId,
        algorithm: &Algorithm,
    ) -> Result<Self> {
        let op = Self::OPERATION;
        check_table(op, algorithm)?;
        let table = &algorithm.dispatch;
        let bad = bad_slot(op, algorithm);

        let fns = KeymgmtFns {
            gen_params: find_slot(table, KeymgmtFunction::GenParams).map_err(&bad)?,
            load_params: find_slot(table, KeymgmtFunction::LoadParams).map_err(&bad)?,
            import_params: find_slot(table, KeymgmtFunction::ImportParams).map_err(&bad)?,
            export_params: find_slot(table, KeymgmtFunction::ExportParams).map_err(&bad)?,
            free_params: find_slot(table, KeymgmtFunction::FreeParams).map_err(&bad)?,
            gen_key: find_slot(table, KeymgmtFunction::GenKey).map_err(&bad)?,
            load_key: find_slot(table, KeymgmtFunction::LoadKey).map_err(&bad)?,
            import_key: find_slot(table, KeymgmtFunction::ImportKey).map_err(&bad)?,
            export_key: find_slot(table, KeymgmtFunction::ExportKey).map_err(&bad)?,
            free_key: find_slot(table, KeymgmtFunction::FreeKey).map_err(&bad)?,
        };

        if fns.gen_key.is_none() && fns.import_key.is_none() && fns.load_key.is_none() {
            return Err(incomplete(op, algorithm, "no way of producing a key is present"));
        }

        Ok(Self {
            provider: provider.clone(),
            name_id,
            legacy_id: algorithm.legacy_id,
            fns,
        })
    }
}

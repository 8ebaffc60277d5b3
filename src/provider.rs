//! Provider handles and the registration-time ABI.
//!
//! A provider enters the runtime through an init function: the core hands it
//! a [`CoreHandle`] and gets back the provider's own dispatch table plus an
//! opaque `provctx` the provider threads through its upcalls. The table is
//! decoded once into typed slots; only `query_operation` is required.
//!
//! The runtime holds providers refcounted. A provider stays alive while any
//! implementation record or algorithm context built from it is reachable
//! (records keep a strong back-edge), and its `teardown` runs when the last
//! reference drops. Teardown failures are logged and swallowed; teardown
//! must not abort.

use crate::{
    dispatch::{
        check_ids, find_slot, AlgorithmList, DispatchEntry, Opaque, Operation, ProviderFunction,
        ProviderGetParamTypesFn, ProviderGetParamsFn, ProviderQueryFn, ProviderReasonsFn,
        ProviderTeardownFn,
    },
    params::Params,
    Error, LibCtx, Result,
};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// The dispatch the core offers a provider at init: a way back to the
/// owning library context and an error-reporting upcall.
pub struct CoreHandle {
    libctx: Weak<LibCtx>,
}

impl CoreHandle {
    pub(crate) fn new(libctx: &Arc<LibCtx>) -> Self {
        Self { libctx: Arc::downgrade(libctx) }
    }

    /// The library context the provider is being registered into, unless it
    /// is already being torn down.
    pub fn libctx(&self) -> Option<Arc<LibCtx>> {
        self.libctx.upgrade()
    }

    /// Reports a provider-side failure through the runtime's diagnostics.
    pub fn report_error(&self, provider: &str, reason: u32) {
        tracing::error!(provider, reason, "provider reported an error");
    }
}

/// A provider's entry point: returns its dispatch table and opaque context.
pub type ProviderInitFn = fn(&CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)>;

struct ProviderFns {
    teardown: Option<ProviderTeardownFn>,
    get_param_types: Option<ProviderGetParamTypesFn>,
    get_params: Option<ProviderGetParamsFn>,
    query_operation: ProviderQueryFn,
    get_reason_strings: Option<ProviderReasonsFn>,
}

/// A refcounted handle to a registered provider.
pub struct Provider {
    name: Box<str>,
    priority: usize,
    provctx: Arc<dyn Opaque>,
    fns: ProviderFns,
}

impl Provider {
    pub(crate) fn from_init(
        name: &str,
        priority: usize,
        init: ProviderInitFn,
        core: &CoreHandle,
    ) -> Result<Arc<Self>> {
        let (table, provctx) = init(core)?;
        check_ids(&table).map_err(Error::IncompleteProvider)?;

        let mismatch = |_| Error::IncompleteProvider("a slot has the wrong signature");
        let fns = ProviderFns {
            teardown: find_slot(&table, ProviderFunction::Teardown).map_err(mismatch)?,
            get_param_types: find_slot(&table, ProviderFunction::GetParamTypes)
                .map_err(mismatch)?,
            get_params: find_slot(&table, ProviderFunction::GetParams).map_err(mismatch)?,
            query_operation: find_slot(&table, ProviderFunction::QueryOperation)
                .map_err(mismatch)?
                .ok_or(Error::IncompleteProvider("`query_operation` is required"))?,
            get_reason_strings: find_slot(&table, ProviderFunction::GetReasonStrings)
                .map_err(mismatch)?,
        };

        debug!(name, priority, "registered provider");
        Ok(Arc::new(Self { name: name.into(), priority, provctx, fns }))
    }

    /// The name the provider was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration rank used to break property-score ties: earlier
    /// registrations rank higher.
    pub fn priority(&self) -> usize {
        self.priority
    }

    /// The algorithm tables this provider offers for `operation`.
    pub fn query_operation(&self, operation: Operation) -> AlgorithmList {
        (self.fns.query_operation.0)(&*self.provctx, operation)
    }

    /// Reads provider-level parameters (name, version, status) into the
    /// requests in `params`.
    pub fn get_params(&self, params: &mut Params) -> Result<()> {
        match &self.fns.get_params {
            Some(f) => (f.0)(&*self.provctx, params),
            None => Ok(()),
        }
    }

    /// The parameters [`Provider::get_params`] can fill, as an unfilled
    /// request.
    pub fn param_types(&self) -> Params {
        match &self.fns.get_param_types {
            Some(f) => (f.0)(),
            None => Params::new(),
        }
    }

    /// Resolves a provider reason code to its human-readable string.
    pub fn reason_string(&self, reason: u32) -> Option<&'static str> {
        let f = self.fns.get_reason_strings.as_ref()?;
        (f.0)().into_iter().find(|(code, _)| *code == reason).map(|(_, s)| s)
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        if let Some(teardown) = &self.fns.teardown {
            if let Err(error) = (teardown.0)(&*self.provctx) {
                warn!(provider = &*self.name, %error, "provider teardown failed; continuing");
            }
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ProviderFunction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullCtx;
    impl Opaque for NullCtx {}

    fn core() -> CoreHandle {
        CoreHandle::new(&LibCtx::new())
    }

    #[test]
    fn query_operation_is_required() {
        fn init(_: &CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)> {
            Ok((vec![], Arc::new(NullCtx)))
        }
        assert_eq!(
            Provider::from_init("empty", 0, init, &core()).unwrap_err(),
            Error::IncompleteProvider("`query_operation` is required"),
        );
    }

    #[test]
    fn teardown_runs_once_on_last_release() {
        static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

        fn init(_: &CoreHandle) -> Result<(Vec<DispatchEntry>, Arc<dyn Opaque>)> {
            let table = vec![
                DispatchEntry::new(
                    ProviderFunction::QueryOperation,
                    ProviderQueryFn::new(|_, _| AlgorithmList::default()),
                ),
                DispatchEntry::new(
                    ProviderFunction::Teardown,
                    ProviderTeardownFn::new(|_| {
                        TEARDOWNS.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ),
            ];
            Ok((table, Arc::new(NullCtx)))
        }

        let provider = Provider::from_init("soft", 0, init, &core()).unwrap();
        let second = provider.clone();
        drop(provider);
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 0, "still referenced");
        drop(second);
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 1);
    }
}

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! A pluggable provider runtime for cryptographic algorithms.
//!
//! `purveyor` sits between a generic cryptographic API (digests, ciphers,
//! key exchange, key management) and interchangeable *provider* backends
//! supplying the concrete algorithm implementations. Given an operation
//! kind, an algorithm name, and a property query, it locates (or lazily
//! constructs) the best implementation, returns a refcounted record bound
//! to it, and mediates the init/update/final-style lifecycle of the
//! contexts that use it.
//!
//! # Resolution pipeline
//!
//! A fetch such as [`DigestMethod::fetch`] runs through three layers:
//!
//! | layer | keyed by | on miss |
//! |-------|----------|---------|
//! | query cache | `(method id, literal query string)` | fall through |
//! | method store | method id, filtered by property query | fall through |
//! | constructor | none | enumerate every provider's algorithm tables |
//!
//! The constructor decodes matching dispatch tables into typed records
//! (rejecting incomplete ones), picks the best property match in a
//! temporary store, promotes the winner into the context's store, and
//! caches the resolution. Concurrent fetches of the same triple converge on
//! a single record: the first promotion wins and later ones are handed the
//! existing record instead.
//!
//! # Properties
//!
//! Implementations carry property *definitions* (`"provider=soft,fips=yes"`)
//! and callers pass property *queries*, where `fips=yes` is a requirement
//! and `fips?yes` a tie-breaking preference. A library context can carry
//! default properties that merge into every query; see
//! [`LibCtx::set_default_properties`].
//!
//! # Contexts
//!
//! Fetched records are bound into per-operation context envelopes,
//! [`DigestContext`], [`CipherContext`], and [`KeyexchContext`], which own the
//! implementation's opaque working state and enforce the lifecycle state
//! machine. Envelopes belong to one thread at a time; `dup` is the hand-off
//! mechanism.
//!
//! # Concurrency
//!
//! Every operation on [`LibCtx`], the name map, and the store is reentrant
//! and thread-safe; nothing suspends, and any blocking lives inside
//! provider init. Contexts are the only single-owner objects.

pub mod ctx;
pub mod dispatch;
mod error;
mod fetch;
pub mod methods;
pub mod names;
pub mod params;
pub mod property;
pub mod provider;
mod store;

pub use ctx::{CipherContext, CtxFlags, DigestContext, Direction, KeyexchContext};
pub use dispatch::Operation;
pub use error::{Error, Result};
pub use methods::{CipherMethod, DigestMethod, KeyexchMethod, KeymgmtMethod, Method};
pub use names::{NameId, NameMap};
pub use params::{ParamKind, ParamValue, Params};
pub use property::{PropertyDefinition, PropertyQuery};
pub use provider::{CoreHandle, Provider, ProviderInitFn};
pub use store::MethodId;

use crate::store::MethodStore;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// An isolated instance of the runtime: owns the name map, the method
/// store with its query cache, the registered providers, and the default
/// property query.
///
/// Contexts are fully independent of each other. A process-wide default
/// instance is available through [`LibCtx::global`], but every entry point
/// takes the context explicitly; there is no hidden ambient state.
///
/// Dropping the last handle tears the context down: the store releases its
/// records, records release their providers, and each provider's
/// `teardown` runs (failures are logged and swallowed).
pub struct LibCtx {
    names: NameMap,
    // declared before `providers` so records drop before provider teardown
    store: MethodStore,
    providers: RwLock<Vec<Arc<Provider>>>,
}

impl LibCtx {
    /// A fresh, empty context.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            names: NameMap::new(),
            store: MethodStore::new(),
            providers: RwLock::new(Vec::new()),
        })
    }

    /// The process-wide default context, lazily initialized on first use.
    pub fn global() -> Arc<Self> {
        static GLOBAL: Lazy<Arc<LibCtx>> = Lazy::new(LibCtx::new);
        GLOBAL.clone()
    }

    /// Runs `init` and registers the resulting provider. Providers
    /// registered earlier outrank later ones when a fetch has to break a
    /// property-score tie.
    ///
    /// Registration flushes the query cache: resolutions taken before the
    /// new provider existed may no longer be the best answer.
    pub fn register_provider(
        self: &Arc<Self>,
        name: &str,
        init: ProviderInitFn,
    ) -> Result<Arc<Provider>> {
        let core = CoreHandle::new(self);
        // init runs outside the provider lock so it may call back into the
        // context
        let priority = self.providers.read().len();
        let provider = Provider::from_init(name, priority, init, &core)?;
        self.providers.write().push(provider.clone());
        self.store.flush_cache();
        Ok(provider)
    }

    /// Deactivates a provider: removes it from the registration list,
    /// drops every store record it produced, and flushes the query cache.
    /// Contexts still holding its methods keep working; the provider tears
    /// down once the last of those references drops. Returns whether the
    /// provider was registered here.
    pub fn unregister_provider(&self, provider: &Arc<Provider>) -> bool {
        let removed = {
            let mut providers = self.providers.write();
            let before = providers.len();
            providers.retain(|p| !Arc::ptr_eq(p, provider));
            providers.len() != before
        };
        if removed {
            debug!(provider = provider.name(), "unregistered provider");
            self.store.remove_provider(provider);
            self.store.flush_cache();
        }
        removed
    }

    /// A snapshot of the registered providers, in registration order.
    pub fn providers(&self) -> Vec<Arc<Provider>> {
        self.providers.read().clone()
    }

    /// Replaces the default property query merged into every fetch. An
    /// empty string clears it. Changing defaults invalidates the query
    /// cache.
    pub fn set_default_properties(&self, query: &str) -> Result<()> {
        let parsed = if query.trim().is_empty() {
            None
        } else {
            Some(PropertyQuery::parse(query)?)
        };
        debug!(query, "setting default properties");
        self.store.set_global_properties(parsed);
        Ok(())
    }

    /// The current default property query, in its parsed-and-normalized
    /// spelling.
    pub fn default_properties(&self) -> Option<String> {
        self.store.global_properties().map(|q| q.to_string())
    }

    /// The context's algorithm name map.
    pub fn names(&self) -> &NameMap {
        &self.names
    }

    /// Drops query-cache entries that have not been hit since the previous
    /// trim.
    pub fn trim_query_cache(&self) {
        self.store.sweep_cache();
    }

    /// Releases every resolved record and registered provider now, without
    /// waiting for the last handle to drop. Provider teardown failures are
    /// logged and swallowed.
    pub fn teardown(&self) {
        self.store.clear();
        self.providers.write().clear();
    }

    pub(crate) fn store(&self) -> &MethodStore {
        &self.store
    }
}

impl std::fmt::Debug for LibCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LibCtx")
            .field("names", &self.names)
            .field("store", &self.store)
            .field("providers", &self.providers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_context_is_shared() {
        let a = LibCtx::global();
        let b = LibCtx::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn default_properties_roundtrip() {
        let libctx = LibCtx::new();
        assert_eq!(libctx.default_properties(), None);

        libctx.set_default_properties("fips=yes, provider?soft").unwrap();
        assert_eq!(
            libctx.default_properties().as_deref(),
            Some("fips=yes,provider?soft"),
        );

        libctx.set_default_properties("").unwrap();
        assert_eq!(libctx.default_properties(), None);

        assert!(libctx.set_default_properties("=bad").is_err());
    }
}

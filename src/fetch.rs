//! Method resolution: the query-cache probe, the store probe, and the
//! provider-enumerating constructor behind every fetch, plus `do_all`
//! enumeration.
//!
//! Resolution is check-then-build-then-commit, and the commit converges:
//! concurrent fetches of the same `(operation, name, query)` may each build
//! a candidate record, but the store keeps whichever promotion lands first
//! and hands it back to the losers, so identical fetches always return the
//! same underlying record.

use crate::{
    methods::{FromDispatch, Method},
    names,
    property::{PropertyDefinition, PropertyQuery},
    store::{MethodId, MethodStore, StoreEntry},
    Error, LibCtx, Result,
};
use std::sync::Arc;
use tracing::{debug, trace};

fn not_found(operation: crate::Operation, name: &str, query: &PropertyQuery) -> Error {
    Error::NotFound {
        operation,
        name: name.to_owned(),
        properties: query.to_string(),
    }
}

fn downcast<M: Method>(method: Arc<dyn Method>) -> Arc<M> {
    method
        .into_any_arc()
        .downcast()
        .ok()
        .expect("a method id never maps to two record types")
}

/// Resolves the best implementation of `M::OPERATION` for `name` under
/// `properties`, consulting the query cache, then the store, then the
/// providers.
pub(crate) fn generic_fetch<M: FromDispatch>(
    libctx: &Arc<LibCtx>,
    name: &str,
    properties: Option<&str>,
) -> Result<Arc<M>> {
    let operation = M::OPERATION;
    let query = match properties {
        Some(input) => PropertyQuery::parse(input)?,
        None => PropertyQuery::empty(),
    };
    let effective = match libctx.store().global_properties() {
        Some(defaults) => query.merge_defaults(&defaults),
        None => query,
    };
    let cache_key = properties.unwrap_or("");

    if let Some(name_id) = libctx.names().lookup(name) {
        let id = MethodId::new(operation, name_id);
        if let Some(cached) = libctx.store().cache_get(id, cache_key) {
            trace!(%operation, name, "query cache hit");
            return Ok(downcast(cached));
        }
        if let Some(found) = libctx.store().fetch(id, &effective) {
            libctx.store().cache_set(id, cache_key, found.method.clone());
            return Ok(downcast(found.method));
        }
    }

    construct(libctx, name, &effective, cache_key)
}

/// The slow path: enumerate providers into a temporary store, pick the best
/// match there, and promote it into the context's store unless the provider
/// opted out of caching.
fn construct<M: FromDispatch>(
    libctx: &Arc<LibCtx>,
    name: &str,
    effective: &PropertyQuery,
    cache_key: &str,
) -> Result<Arc<M>> {
    let operation = M::OPERATION;
    let temporary = MethodStore::new();
    let mut no_store = false;
    let mut target = None;

    for provider in libctx.providers() {
        let list = provider.query_operation(operation);
        for algorithm in &list.algorithms {
            if !names::contains(&algorithm.names, name) {
                continue;
            }
            let name_id = libctx.names().intern_names(&algorithm.names)?;
            let id = MethodId::new(operation, name_id);
            target = Some(id);

            // a matching name with a bad table aborts the whole fetch
            let method = M::from_dispatch(&provider, name_id, algorithm)?;
            let definition = PropertyDefinition::parse(&algorithm.properties)?;
            temporary.add(
                id,
                StoreEntry {
                    definition,
                    method: Arc::new(method),
                    priority: provider.priority(),
                },
            );
            if list.no_store {
                no_store = true;
            }
        }
    }

    let id = target.ok_or_else(|| not_found(operation, name, effective))?;
    let found = temporary
        .fetch(id, effective)
        .ok_or_else(|| not_found(operation, name, effective))?;

    let winner = if no_store {
        trace!(%operation, name, "provider requested no-store; skipping promotion");
        found.method
    } else {
        // promote every candidate so later queries with different
        // preferences resolve against the full set; on conflicts the
        // store's existing occupants win
        for entry in temporary.take_entries(id) {
            libctx.store().add(id, entry);
        }
        let promoted = libctx
            .store()
            .fetch(id, effective)
            .map(|entry| entry.method)
            .unwrap_or(found.method);
        libctx.store().cache_set(id, cache_key, promoted.clone());
        promoted
    };

    debug!(%operation, name, provider = winner.provider().name(), "constructed method");
    Ok(downcast(winner))
}

/// Visits one transient record per `(provider, algorithm)` pair offering
/// `M::OPERATION`, exactly once each, in provider-registration order but
/// otherwise unspecified. A table that fails to decode aborts the whole
/// walk, the same way it aborts a fetch.
pub(crate) fn generic_do_all<M: FromDispatch>(
    libctx: &Arc<LibCtx>,
    mut f: impl FnMut(Arc<M>),
) -> Result<()> {
    let operation = M::OPERATION;
    for provider in libctx.providers() {
        let list = provider.query_operation(operation);
        for algorithm in &list.algorithms {
            let name_id = libctx.names().intern_names(&algorithm.names)?;
            let method = M::from_dispatch(&provider, name_id, algorithm)?;
            f(Arc::new(method));
        }
    }
    Ok(())
}

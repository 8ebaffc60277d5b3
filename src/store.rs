//! The method store: the per-library-context registry of implementation
//! records, plus its query cache.
//!
//! Records are keyed by [`MethodId`], an `(operation, name)` pair packed
//! into one integer, and each key holds an ordered list of
//! `(property definition, record)` candidates. Fetching scans the
//! candidates for the key and picks the best match for a property query:
//! highest preference score first, then provider rank, then insertion
//! order.
//!
//! The store also carries an advisory cache of full query results keyed by
//! the caller's literal query string. Cached values are marked live when
//! read, dyn-cache style, and the whole cache is flushed whenever the
//! global property query changes, since that can change what any query
//! resolves to.

use crate::{
    dispatch::Operation,
    methods::Method,
    names::NameId,
    property::{PropertyDefinition, PropertyQuery},
};
use hash_hasher::HashBuildHasher;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::{convert::TryFrom, num::NonZeroU32, sync::Arc};

/// Uniquely identifies an `(operation, name)` pair within one library
/// context: the name id in the high 24 bits, the operation id in the low 8.
///
/// Both operands are non-zero and bounded by construction, so the packing
/// cannot collide and the packed value cannot be zero.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct MethodId(NonZeroU32);

impl MethodId {
    /// Packs an operation and a name id.
    pub fn new(operation: Operation, name: NameId) -> Self {
        debug_assert!(name.get() <= crate::names::MAX_NAME_ID);
        let raw = (name.get() << 8) | u32::from(u8::from(operation));
        Self(NonZeroU32::new(raw).unwrap())
    }

    /// The operation the id was packed from.
    pub fn operation(self) -> Option<Operation> {
        Operation::try_from((self.0.get() & 0xff) as u8).ok()
    }

    /// The name id the id was packed from.
    pub fn name_id(self) -> Option<NameId> {
        NameId::from_raw(self.0.get() >> 8)
    }
}

impl std::fmt::Debug for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "MethodId({:#x})", self.0.get())
    }
}

/// One candidate under a method id.
#[derive(Clone)]
pub(crate) struct StoreEntry {
    pub(crate) definition: PropertyDefinition,
    pub(crate) method: Arc<dyn Method>,
    /// Provider rank; smaller ranks (earlier registrations) win ties.
    pub(crate) priority: usize,
}

#[derive(Default)]
struct Bucket {
    entries: Vec<StoreEntry>,
}

impl Bucket {
    /// The best-scoring candidate for `query`, honoring rank and insertion
    /// order on ties.
    fn select(&self, query: &PropertyQuery) -> Option<&StoreEntry> {
        let mut best: Option<(u32, &StoreEntry)> = None;
        for entry in &self.entries {
            let score = match query.score(&entry.definition) {
                Some(score) => score,
                None => continue,
            };
            let better = match best {
                None => true,
                Some((best_score, best_entry)) => {
                    score > best_score
                        || (score == best_score && entry.priority < best_entry.priority)
                }
            };
            if better {
                best = Some((score, entry));
            }
        }
        best.map(|(_, entry)| entry)
    }
}

/// Describes the outcome for a cached query result if the cache were swept
/// when observed. Results are marked `Live` when stored and again on every
/// hit; [`MethodStore::sweep_cache`] drops the rest.
#[derive(Debug, PartialEq)]
enum Liveness {
    /// The result would be retained in a sweep right now.
    Live,
    /// The result would be dropped in a sweep right now.
    Dead,
}

struct CacheCell {
    method: Arc<dyn Method>,
    liveness: Liveness,
}

type Buckets = HashMap<MethodId, Bucket, HashBuildHasher>;
type QueryCache = HashMap<MethodId, HashMap<Box<str>, CacheCell>, HashBuildHasher>;

/// The registry itself. One lives in every library context; the method
/// constructor also builds short-lived private ones while resolving.
pub(crate) struct MethodStore {
    buckets: RwLock<Buckets>,
    cache: Mutex<QueryCache>,
    global: RwLock<Option<PropertyQuery>>,
}

impl MethodStore {
    pub(crate) fn new() -> Self {
        Self {
            buckets: RwLock::new(Buckets::default()),
            cache: Mutex::new(QueryCache::default()),
            global: RwLock::new(None),
        }
    }

    /// Inserts a candidate, taking a strong reference. If an equivalent
    /// candidate (same provider, same definition) is already present the
    /// existing record wins and is returned instead; this is what makes
    /// concurrent construction of the same method converge on one record.
    pub(crate) fn add(&self, id: MethodId, entry: StoreEntry) -> Arc<dyn Method> {
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(id).or_default();
        if let Some(existing) = bucket.entries.iter().find(|e| {
            e.definition == entry.definition
                && Arc::ptr_eq(e.method.provider(), entry.method.provider())
        }) {
            return existing.method.clone();
        }
        let method = entry.method.clone();
        bucket.entries.push(entry);
        method
    }

    /// Drops every candidate under `id` holding this exact record.
    pub(crate) fn remove(&self, id: MethodId, method: &Arc<dyn Method>) {
        let mut buckets = self.buckets.write();
        if let Some(bucket) = buckets.get_mut(&id) {
            bucket.entries.retain(|e| !Arc::ptr_eq(&e.method, method));
        }
    }

    /// The best candidate for `query` under `id`, with a reference bumped.
    pub(crate) fn fetch(&self, id: MethodId, query: &PropertyQuery) -> Option<StoreEntry> {
        self.buckets.read().get(&id)?.select(query).cloned()
    }

    /// Removes and returns every candidate under `id`; used to promote a
    /// temporary store's results wholesale.
    pub(crate) fn take_entries(&self, id: MethodId) -> Vec<StoreEntry> {
        self.buckets
            .write()
            .remove(&id)
            .map(|bucket| bucket.entries)
            .unwrap_or_default()
    }

    /// A cached resolution of `(id, query string)`, marked live on the way
    /// out.
    pub(crate) fn cache_get(&self, id: MethodId, query: &str) -> Option<Arc<dyn Method>> {
        let mut cache = self.cache.lock();
        let cell = cache.get_mut(&id)?.get_mut(query)?;
        cell.liveness = Liveness::Live;
        Some(cell.method.clone())
    }

    /// Records a resolution for `(id, query string)`. Advisory: sweeps and
    /// flushes may drop it at any time.
    pub(crate) fn cache_set(&self, id: MethodId, query: &str, method: Arc<dyn Method>) {
        self.cache
            .lock()
            .entry(id)
            .or_default()
            .insert(query.into(), CacheCell { method, liveness: Liveness::Live });
    }

    /// Drops every cached resolution.
    pub(crate) fn flush_cache(&self) {
        self.cache.lock().clear();
    }

    /// Drops cached resolutions that have not been hit since the previous
    /// sweep, and marks the survivors for the next one.
    pub(crate) fn sweep_cache(&self) {
        let mut cache = self.cache.lock();
        for per_id in cache.values_mut() {
            per_id.retain(|_, cell| cell.liveness == Liveness::Live);
            per_id.values_mut().for_each(|cell| cell.liveness = Liveness::Dead);
        }
        cache.retain(|_, per_id| !per_id.is_empty());
    }

    /// Replaces the global default property query and flushes the cache,
    /// serialized against concurrent cache use.
    pub(crate) fn set_global_properties(&self, query: Option<PropertyQuery>) {
        let mut global = self.global.write();
        *global = query;
        self.flush_cache();
    }

    /// The current global default property query.
    pub(crate) fn global_properties(&self) -> Option<PropertyQuery> {
        self.global.read().clone()
    }

    /// Drops every candidate a deactivated provider produced, across all
    /// operations.
    pub(crate) fn remove_provider(&self, provider: &Arc<crate::provider::Provider>) {
        for operation in Operation::ALL.iter().copied() {
            let mut doomed: Vec<(MethodId, Arc<dyn Method>)> = Vec::new();
            self.for_each(operation, |method| {
                if Arc::ptr_eq(method.provider(), provider) {
                    doomed.push((MethodId::new(operation, method.name_id()), method.clone()));
                }
            });
            for (id, method) in doomed {
                self.remove(id, &method);
            }
        }
    }

    /// Visits every stored record for `operation`, over a snapshot so `f`
    /// may re-enter the store.
    pub(crate) fn for_each(&self, operation: Operation, mut f: impl FnMut(&Arc<dyn Method>)) {
        let snapshot: Vec<Arc<dyn Method>> = {
            let buckets = self.buckets.read();
            buckets
                .iter()
                .filter(|(id, _)| id.operation() == Some(operation))
                .flat_map(|(_, bucket)| bucket.entries.iter().map(|e| e.method.clone()))
                .collect()
        };
        for method in &snapshot {
            f(method);
        }
    }

    /// Releases every record and cached resolution.
    pub(crate) fn clear(&self) {
        self.flush_cache();
        self.buckets.write().clear();
    }
}

impl std::fmt::Debug for MethodStore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let buckets = self.buckets.read();
        f.debug_struct("MethodStore")
            .field("methods", &buckets.values().map(|b| b.entries.len()).sum::<usize>())
            .field("keys", &buckets.len())
            .finish()
    }
}

//! Canonicalizes algorithm names to dense numeric ids.
//!
//! Names compare case-insensitively under ASCII folding and may carry
//! aliases: several strings denoting the same implementation. Each library
//! context owns one map; ids are assigned on first sight, never reused, and
//! stay stable for the context's lifetime.

use crate::{Error, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::num::NonZeroU32;

/// The largest id the map will assign. Ids must pack into the high 24 bits
/// of a method id, see [`crate::MethodId`].
pub const MAX_NAME_ID: u32 = (1 << 24) - 1;

/// A dense identifier for a canonical algorithm name.
///
/// Always positive; "no name" is represented as `Option<NameId>` rather than
/// a zero sentinel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NameId(NonZeroU32);

impl NameId {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        let raw = index as u32 + 1;
        if raw > MAX_NAME_ID {
            return None;
        }
        NonZeroU32::new(raw).map(NameId)
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        if raw == 0 || raw > MAX_NAME_ID {
            return None;
        }
        NonZeroU32::new(raw).map(NameId)
    }

    /// The numeric value, in `1..=MAX_NAME_ID`.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Splits a provider's colon-separated name string into its members,
/// canonical name first.
pub(crate) fn split_names(names: &str) -> impl Iterator<Item = &str> {
    names.split(':').map(str::trim).filter(|n| !n.is_empty())
}

/// Whether any member of a colon-separated name string equals `wanted` under
/// ASCII folding.
pub(crate) fn contains(names: &str, wanted: &str) -> bool {
    split_names(names).any(|n| n.eq_ignore_ascii_case(wanted))
}

#[derive(Default)]
struct Inner {
    /// Folded name (canonical or alias) to id.
    ids: HashMap<Box<str>, NameId>,
    /// Canonical names as first seen, indexed by `id - 1`.
    canonical: Vec<Box<str>>,
}

/// An append-only, thread-safe map from algorithm names to [`NameId`]s.
///
/// `intern` is linearizable: two racing interns of equal folded names observe
/// the same id. Reads never block other reads.
pub struct NameMap {
    inner: RwLock<Inner>,
}

impl NameMap {
    /// An empty map.
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Returns the id `name` is bound to, if it has been seen.
    pub fn lookup(&self, name: &str) -> Option<NameId> {
        let folded = name.to_ascii_lowercase();
        self.inner.read().ids.get(folded.as_str()).copied()
    }

    /// Returns the id for `name`, assigning a fresh one on first sight.
    pub fn intern(&self, name: &str) -> Result<NameId> {
        let folded = name.to_ascii_lowercase();
        if let Some(&id) = self.inner.read().ids.get(folded.as_str()) {
            return Ok(id);
        }

        let mut inner = self.inner.write();
        // a racing intern may have won between the locks
        if let Some(&id) = inner.ids.get(folded.as_str()) {
            return Ok(id);
        }

        let id = NameId::from_index(inner.canonical.len()).ok_or(Error::NamesExhausted)?;
        inner.canonical.push(name.into());
        inner.ids.insert(folded.into(), id);
        tracing::trace!(name, id = id.get(), "interned algorithm name");
        Ok(id)
    }

    /// Binds `alias` to an already-assigned id. Idempotent for an alias that
    /// is already bound to `id`; binding it to a different id is an error.
    pub fn add_alias(&self, id: NameId, alias: &str) -> Result<()> {
        let folded = alias.to_ascii_lowercase();
        let mut inner = self.inner.write();
        if id.get() as usize > inner.canonical.len() {
            return Err(Error::NameConflict(alias.to_owned()));
        }
        match inner.ids.get(folded.as_str()) {
            Some(&existing) if existing == id => Ok(()),
            Some(_) => Err(Error::NameConflict(alias.to_owned())),
            None => {
                inner.ids.insert(folded.into(), id);
                Ok(())
            }
        }
    }

    /// Interns a colon-separated name string: the first member becomes (or
    /// already is) the canonical name, the rest become aliases of it.
    pub fn intern_names(&self, names: &str) -> Result<NameId> {
        let mut members = split_names(names);
        let canonical = members
            .next()
            .ok_or_else(|| Error::NameConflict(names.to_owned()))?;
        let id = self.intern(canonical)?;
        for alias in members {
            self.add_alias(id, alias)?;
        }
        Ok(id)
    }

    /// The canonical spelling for `id`, if assigned.
    pub fn name(&self, id: NameId) -> Option<String> {
        self.inner
            .read()
            .canonical
            .get(id.get() as usize - 1)
            .map(|n| n.to_string())
    }

    /// Calls `f` once per assigned id with the canonical name only; aliases
    /// are not visited. Iterates over a snapshot, so `f` may re-enter the
    /// map.
    pub fn for_each(&self, mut f: impl FnMut(NameId, &str)) {
        let snapshot: Vec<(NameId, Box<str>)> = {
            let inner = self.inner.read();
            inner
                .canonical
                .iter()
                .enumerate()
                .map(|(i, n)| (NameId::from_index(i).unwrap(), n.clone()))
                .collect()
        };
        for (id, name) in &snapshot {
            f(*id, name);
        }
    }

    /// How many canonical names have been assigned ids.
    pub fn len(&self) -> usize {
        self.inner.read().canonical.len()
    }

    /// Whether no names have been interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NameMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NameMap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("NameMap").field("len", &self.len()).finish()
    }
}

//! The key-exchange context envelope.

use super::{release_state, CtxFlags};
use crate::{
    dispatch::{KeyHandle, Opaque},
    methods::KeyexchMethod,
    params::Params,
    Error, Result,
};
use std::sync::Arc;

/// A key-exchange computation bound to a fetched [`KeyexchMethod`].
///
/// `derive` only runs once both the local key (`init`) and the peer key
/// (`set_peer`) are in place; anything else is misuse.
pub struct KeyexchContext {
    method: Option<Arc<KeyexchMethod>>,
    state: Option<Box<dyn Opaque>>,
    have_key: bool,
    have_peer: bool,
    flags: CtxFlags,
}

impl KeyexchContext {
    /// An empty envelope with nothing bound.
    pub fn new() -> Self {
        Self {
            method: None,
            state: None,
            have_key: false,
            have_peer: false,
            flags: CtxFlags::empty(),
        }
    }

    /// Binds `method` and the local `key`. Re-initializing with the same
    /// implementation reuses the existing working state; the peer key must
    /// be set again either way.
    pub fn init(&mut self, method: &Arc<KeyexchMethod>, key: KeyHandle, params: &Params) -> Result<()> {
        let fast = self.flags.contains(CtxFlags::REUSE)
            && self.method.as_ref().map(|m| Arc::ptr_eq(m, method)) == Some(true);

        if !fast {
            self.teardown();
            let state = (method.fns.newctx.0)()?;
            let mut guard = scopeguard::guard(state, |mut state| {
                if let Some(free) = &method.fns.free {
                    (free.0)(&mut *state);
                }
            });
            (method.fns.init.0)(&mut **guard, key, params)?;
            self.state = Some(scopeguard::ScopeGuard::into_inner(guard));
            self.method = Some(method.clone());
            self.flags.remove(CtxFlags::CLEANED);
            self.flags.insert(CtxFlags::REUSE);
        } else {
            let state = self.state.as_mut().ok_or(Error::Misuse("init on a torn-down context"))?;
            (method.fns.init.0)(&mut **state, key, params)?;
        }

        self.have_key = true;
        self.have_peer = false;
        Ok(())
    }

    /// Binds the peer's key.
    pub fn set_peer(&mut self, key: KeyHandle) -> Result<()> {
        let method = self.method.as_ref().ok_or(Error::Misuse("set_peer before init"))?;
        let state = self.state.as_mut().ok_or(Error::Misuse("set_peer before init"))?;
        (method.fns.set_peer.0)(&mut **state, key)?;
        self.have_peer = true;
        Ok(())
    }

    /// Derives the shared secret.
    ///
    /// With `out` of `None` this is a sizing call: the exact secret size is
    /// returned and nothing is written. With a buffer, the secret is
    /// written and its length returned; a buffer smaller than the secret
    /// fails without writing.
    pub fn derive(&mut self, out: Option<&mut [u8]>) -> Result<usize> {
        if !(self.have_key && self.have_peer) {
            return Err(Error::Misuse("derive before init and set_peer"));
        }
        let method = self.method.as_ref().ok_or(Error::Misuse("derive before init"))?;
        let state = self.state.as_mut().ok_or(Error::Misuse("derive before init"))?;
        (method.fns.derive.0)(&mut **state, out)
    }

    /// Derives the shared secret into a fresh buffer of exactly the right
    /// size.
    pub fn derive_vec(&mut self) -> Result<Vec<u8>> {
        let size = self.derive(None)?;
        let mut out = vec![0; size];
        let written = self.derive(Some(&mut out))?;
        out.truncate(written);
        Ok(out)
    }

    /// Reconfigures the exchange, e.g. toggling output padding.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        let method = self.method.as_ref().ok_or(Error::Misuse("set_params before init"))?;
        let state = self.state.as_mut().ok_or(Error::Misuse("set_params before init"))?;
        let f = method.fns.set_ctx_params.as_ref().ok_or(Error::Unsupported("set_params"))?;
        (f.0)(&mut **state, params)
    }

    /// A second context observationally equivalent to this one, sharing no
    /// mutable state.
    pub fn dup(&self) -> Result<Self> {
        let state = match (&self.state, &self.method) {
            (Some(state), Some(method)) => {
                let dup = method.fns.dup.as_ref().ok_or(Error::Unsupported("dup"))?;
                Some((dup.0)(&**state)?)
            }
            _ => None,
        };

        Ok(Self {
            method: self.method.clone(),
            state,
            have_key: self.have_key,
            have_peer: self.have_peer,
            flags: self.flags,
        })
    }

    /// Returns the envelope to its post-`new` state.
    pub fn reset(&mut self) {
        self.teardown();
        self.method = None;
        self.flags = CtxFlags::empty();
    }

    /// The bound implementation, if any.
    pub fn method(&self) -> Option<&Arc<KeyexchMethod>> {
        self.method.as_ref()
    }

    fn teardown(&mut self) {
        let free = self.method.as_ref().and_then(|m| m.fns.free.clone());
        release_state(&mut self.state, free.as_ref(), &mut self.flags);
        self.have_key = false;
        self.have_peer = false;
        self.flags.remove(CtxFlags::REUSE);
    }
}

impl Default for KeyexchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyexchContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for KeyexchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("KeyexchContext")
            .field("method", &self.method)
            .field("have_key", &self.have_key)
            .field("have_peer", &self.have_peer)
            .finish()
    }
}

//! The digest context envelope.

use super::{release_state, CtxFlags};
use crate::{
    dispatch::Opaque,
    methods::DigestMethod,
    params::Params,
    Error, Result,
};
use std::sync::Arc;

/// A streaming digest computation bound to a fetched [`DigestMethod`].
///
/// For implementations that only expose the single-shot `digest` slot, the
/// envelope buffers `update` input itself and runs the implementation once
/// at `finalize`; callers cannot tell the difference.
pub struct DigestContext {
    method: Option<Arc<DigestMethod>>,
    state: Option<Box<dyn Opaque>>,
    /// Pending input while driving a single-shot implementation.
    buffer: Vec<u8>,
    finalized: bool,
    flags: CtxFlags,
    /// A public-key context attached for digest-sign flows. Owned but
    /// opaque; the envelope only manages its lifetime.
    pkey_ctx: Option<Box<dyn Opaque>>,
}

impl DigestContext {
    /// An empty envelope with nothing bound.
    pub fn new() -> Self {
        Self {
            method: None,
            state: None,
            buffer: Vec::new(),
            finalized: false,
            flags: CtxFlags::empty(),
            pkey_ctx: None,
        }
    }

    /// Binds `method` and starts a fresh computation.
    ///
    /// Re-initializing a finalized context is legal. When `method` is
    /// already the bound implementation and no public-key context is
    /// attached, the existing working state is re-initialized in place
    /// instead of being torn down and reallocated.
    pub fn init(&mut self, method: &Arc<DigestMethod>, params: &Params) -> Result<()> {
        let fast = self.flags.contains(CtxFlags::REUSE)
            && self.pkey_ctx.is_none()
            && self.method.as_ref().map(|m| Arc::ptr_eq(m, method)) == Some(true);

        if fast {
            if let Some(state) = &mut self.state {
                if !self.flags.contains(CtxFlags::NO_INIT) {
                    if let Some(init) = &method.fns.init {
                        (init.0)(&mut **state, params)?;
                    }
                }
            }
            self.buffer.clear();
            self.finalized = false;
            return Ok(());
        }

        self.teardown();

        if method.streaming() {
            let newctx = method
                .fns
                .newctx
                .as_ref()
                .ok_or(Error::Unsupported("newctx"))?;
            let state = (newctx.0)()?;

            // the fresh state must see the cleanup hook if init fails
            let mut guard = scopeguard::guard(state, |mut state| {
                if let Some(free) = &method.fns.free {
                    (free.0)(&mut *state);
                }
            });
            if !self.flags.contains(CtxFlags::NO_INIT) {
                if let Some(init) = &method.fns.init {
                    (init.0)(&mut **guard, params)?;
                }
            }
            self.state = Some(scopeguard::ScopeGuard::into_inner(guard));
        } else {
            self.flags.insert(CtxFlags::ONESHOT);
        }

        self.method = Some(method.clone());
        self.finalized = false;
        self.flags.remove(CtxFlags::CLEANED);
        self.flags.insert(CtxFlags::REUSE);
        Ok(())
    }

    /// Absorbs `data` into the running computation.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::Misuse("update on a finalized digest context"));
        }
        if self.method.is_none() {
            return Err(Error::Misuse("update before init"));
        }

        if self.flags.contains(CtxFlags::ONESHOT) {
            self.buffer.extend_from_slice(data);
            return Ok(());
        }

        let method = self
            .method
            .as_ref()
            .ok_or(Error::Misuse("update before init"))?;
        let state = self
            .state
            .as_mut()
            .ok_or(Error::Misuse("update before init"))?;
        let update = method.fns.update.as_ref().ok_or(Error::Unsupported("update"))?;
        (update.0)(&mut **state, data)
    }

    /// Produces the digest into `out`, returning the bytes written. The
    /// context stays bound and may be re-initialized.
    pub fn finalize(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.finalized {
            return Err(Error::Misuse("finalize on a finalized digest context"));
        }
        let method = self
            .method
            .as_ref()
            .ok_or(Error::Misuse("finalize before init"))?;

        let need = method.size();
        if out.len() < need {
            return Err(Error::BufferTooSmall { need, got: out.len() });
        }

        let written = if self.flags.contains(CtxFlags::ONESHOT) {
            let oneshot = method.fns.oneshot.as_ref().ok_or(Error::Unsupported("digest"))?;
            let written = (oneshot.0)(&self.buffer, out)?;
            self.buffer.clear();
            written
        } else {
            let state = self
                .state
                .as_mut()
                .ok_or(Error::Misuse("finalize before init"))?;
            let finish = method.fns.finish.as_ref().ok_or(Error::Unsupported("final"))?;
            (finish.0)(&mut **state, out)?
        };

        self.finalized = true;
        Ok(written)
    }

    /// Digests `data` in one call on an initialized context, preferring the
    /// implementation's single-shot slot when it has one.
    pub fn digest(&mut self, data: &[u8], out: &mut [u8]) -> Result<usize> {
        let method = self
            .method
            .as_ref()
            .ok_or(Error::Misuse("digest before init"))?;

        if let Some(oneshot) = &method.fns.oneshot {
            let need = method.size();
            if out.len() < need {
                return Err(Error::BufferTooSmall { need, got: out.len() });
            }
            let written = (oneshot.0)(data, out)?;
            self.finalized = true;
            return Ok(written);
        }

        self.update(data)?;
        self.finalize(out)
    }

    /// A second context observationally equivalent to this one, sharing no
    /// mutable state. The implementation reference is bumped and the opaque
    /// state goes through the implementation's `dup` slot.
    pub fn dup(&self) -> Result<Self> {
        if self.pkey_ctx.is_some() {
            return Err(Error::Unsupported("dup with an attached public-key context"));
        }

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
            buffer: self.buffer.clone(),
            finalized: self.finalized,
            flags: self.flags,
            pkey_ctx: None,
        })
    }

    /// Returns the envelope to its post-`new` state, releasing the working
    /// state (through the implementation's cleanup hook) and the
    /// implementation reference.
    pub fn reset(&mut self) {
        self.teardown();
        self.method = None;
        self.finalized = false;
        let keep_pkey = self.flags.contains(CtxFlags::KEEP_PKEY_CTX);
        if !keep_pkey {
            self.pkey_ctx = None;
        }
        self.flags = if keep_pkey { CtxFlags::KEEP_PKEY_CTX } else { CtxFlags::empty() };
    }

    /// The digest size of the bound implementation.
    pub fn size(&self) -> Option<usize> {
        self.method.as_ref().map(|m| m.size())
    }

    /// The block size of the bound implementation, when reported.
    pub fn block_size(&self) -> Option<usize> {
        self.method.as_ref().and_then(|m| m.block_size())
    }

    /// The bound implementation, if any.
    pub fn method(&self) -> Option<&Arc<DigestMethod>> {
        self.method.as_ref()
    }

    /// Reconfigures the running computation.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        let method = self.method.as_ref().ok_or(Error::Misuse("set_params before init"))?;
        let state = self.state.as_mut().ok_or(Error::Misuse("set_params before init"))?;
        let f = method.fns.set_ctx_params.as_ref().ok_or(Error::Unsupported("set_params"))?;
        (f.0)(&mut **state, params)
    }

    /// Reads parameters out of the running computation.
    pub fn get_params(&self, params: &mut Params) -> Result<()> {
        let method = self.method.as_ref().ok_or(Error::Misuse("get_params before init"))?;
        let state = self.state.as_ref().ok_or(Error::Misuse("get_params before init"))?;
        let f = method.fns.get_ctx_params.as_ref().ok_or(Error::Unsupported("get_params"))?;
        (f.0)(&**state, params)
    }

    /// Attaches a public-key context for a digest-sign flow. The envelope
    /// owns it; `reset` releases it unless [`CtxFlags::KEEP_PKEY_CTX`] is
    /// set.
    pub fn set_pkey_ctx(&mut self, pkey_ctx: Box<dyn Opaque>) {
        self.pkey_ctx = Some(pkey_ctx);
    }

    /// Detaches the public-key context, if one is attached.
    pub fn take_pkey_ctx(&mut self) -> Option<Box<dyn Opaque>> {
        self.pkey_ctx.take()
    }

    /// The current lifecycle flags.
    pub fn flags(&self) -> CtxFlags {
        self.flags
    }

    /// Sets caller-controlled lifecycle flags.
    pub fn set_flags(&mut self, flags: CtxFlags) {
        self.flags.insert(flags);
    }

    /// Clears caller-controlled lifecycle flags.
    pub fn clear_flags(&mut self, flags: CtxFlags) {
        self.flags.remove(flags);
    }

    /// Releases the working state through the cleanup hook, keeping the
    /// binding-related fields for the caller to overwrite.
    fn teardown(&mut self) {
        let free = self.method.as_ref().and_then(|m| m.fns.free.clone());
        release_state(&mut self.state, free.as_ref(), &mut self.flags);
        self.buffer.clear();
        self.flags.remove(CtxFlags::ONESHOT | CtxFlags::REUSE);
    }
}

impl Default for DigestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DigestContext {
    fn drop(&mut self) {
        // state (and its cleanup hook) goes first, then the implementation
        // reference is released when `method` drops
        self.teardown();
    }
}

impl std::fmt::Debug for DigestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DigestContext")
            .field("method", &self.method)
            .field("finalized", &self.finalized)
            .field("flags", &self.flags)
            .finish()
    }
}

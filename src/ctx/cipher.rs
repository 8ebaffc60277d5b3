//! The cipher context envelope.

use super::{release_state, CtxFlags};
use crate::{
    dispatch::Opaque,
    methods::CipherMethod,
    params::Params,
    Error, Result,
};
use std::sync::Arc;

/// Which way a cipher context has been keyed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Plaintext in, ciphertext out.
    Encrypt,
    /// Ciphertext in, plaintext out.
    Decrypt,
}

/// A cipher computation bound to a fetched [`CipherMethod`].
pub struct CipherContext {
    method: Option<Arc<CipherMethod>>,
    state: Option<Box<dyn Opaque>>,
    direction: Option<Direction>,
    finalized: bool,
    flags: CtxFlags,
}

impl CipherContext {
    /// An empty envelope with nothing bound.
    pub fn new() -> Self {
        Self {
            method: None,
            state: None,
            direction: None,
            finalized: false,
            flags: CtxFlags::empty(),
        }
    }

    /// Binds `method` and keys the context for encryption.
    pub fn encrypt_init(
        &mut self,
        method: &Arc<CipherMethod>,
        key: &[u8],
        iv: &[u8],
        params: &Params,
    ) -> Result<()> {
        self.keyed_init(method, Direction::Encrypt, key, iv, params)
    }

    /// Binds `method` and keys the context for decryption.
    pub fn decrypt_init(
        &mut self,
        method: &Arc<CipherMethod>,
        key: &[u8],
        iv: &[u8],
        params: &Params,
    ) -> Result<()> {
        self.keyed_init(method, Direction::Decrypt, key, iv, params)
    }

    fn keyed_init(
        &mut self,
        method: &Arc<CipherMethod>,
        direction: Direction,
        key: &[u8],
        iv: &[u8],
        params: &Params,
    ) -> Result<()> {
        let init = match direction {
            Direction::Encrypt => &method.fns.encrypt_init,
            Direction::Decrypt => &method.fns.decrypt_init,
        };
        let init = init.as_ref().ok_or(Error::Unsupported(match direction {
            Direction::Encrypt => "encrypt_init",
            Direction::Decrypt => "decrypt_init",
        }))?;

        let fast = self.flags.contains(CtxFlags::REUSE)
            && self.method.as_ref().map(|m| Arc::ptr_eq(m, method)) == Some(true);

        if fast {
            let state = self.state.as_mut().ok_or(Error::Misuse("init on a torn-down context"))?;
            (init.0)(&mut **state, key, iv, params)?;
        } else {
            self.teardown();
            let newctx = method.fns.newctx.as_ref().ok_or(Error::Unsupported("newctx"))?;
            let state = (newctx.0)()?;
            let mut guard = scopeguard::guard(state, |mut state| {
                if let Some(free) = &method.fns.free {
                    (free.0)(&mut *state);
                }
            });
            (init.0)(&mut **guard, key, iv, params)?;
            self.state = Some(scopeguard::ScopeGuard::into_inner(guard));
            self.method = Some(method.clone());
            self.flags.remove(CtxFlags::CLEANED);
            self.flags.insert(CtxFlags::REUSE);
        }

        self.direction = Some(direction);
        self.finalized = false;
        Ok(())
    }

    /// Transforms `input` into `out`, returning the bytes written.
    pub fn update(&mut self, out: &mut [u8], input: &[u8]) -> Result<usize> {
        if self.finalized {
            return Err(Error::Misuse("update on a finalized cipher context"));
        }
        let method = self.method.as_ref().ok_or(Error::Misuse("update before init"))?;
        let state = self.state.as_mut().ok_or(Error::Misuse("update before init"))?;
        let update = method.fns.update.as_ref().ok_or(Error::Unsupported("update"))?;
        (update.0)(&mut **state, out, input)
    }

    /// Finishes the stream, flushing any tail bytes into `out`.
    pub fn finalize(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.finalized {
            return Err(Error::Misuse("finalize on a finalized cipher context"));
        }
        let method = self.method.as_ref().ok_or(Error::Misuse("finalize before init"))?;
        let state = self.state.as_mut().ok_or(Error::Misuse("finalize before init"))?;
        let finish = method.fns.finish.as_ref().ok_or(Error::Unsupported("final"))?;
        let written = (finish.0)(&mut **state, out)?;
        self.finalized = true;
        Ok(written)
    }

    /// Transforms `input` in one call on a keyed context, preferring the
    /// implementation's single-shot slot when it has one.
    pub fn cipher(&mut self, out: &mut [u8], input: &[u8]) -> Result<usize> {
        if self.finalized {
            return Err(Error::Misuse("cipher on a finalized cipher context"));
        }
        let method = self.method.as_ref().ok_or(Error::Misuse("cipher before init"))?;

        if let Some(oneshot) = method.fns.oneshot.clone() {
            let state = self.state.as_mut().ok_or(Error::Misuse("cipher before init"))?;
            let written = (oneshot.0)(&mut **state, out, input)?;
            self.finalized = true;
            return Ok(written);
        }

        let mut written = self.update(out, input)?;
        written += self.finalize(&mut out[written..])?;
        Ok(written)
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
            direction: self.direction,
            finalized: self.finalized,
            flags: self.flags,
        })
    }

    /// Returns the envelope to its post-`new` state.
    pub fn reset(&mut self) {
        self.teardown();
        self.method = None;
        self.finalized = false;
        self.flags = CtxFlags::empty();
    }

    /// Which direction the context is keyed for, if any.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// The bound implementation, if any.
    pub fn method(&self) -> Option<&Arc<CipherMethod>> {
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

    fn teardown(&mut self) {
        let free = self.method.as_ref().and_then(|m| m.fns.free.clone());
        release_state(&mut self.state, free.as_ref(), &mut self.flags);
        self.direction = None;
        self.flags.remove(CtxFlags::REUSE);
    }
}

impl Default for CipherContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CipherContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("method", &self.method)
            .field("direction", &self.direction)
            .field("finalized", &self.finalized)
            .finish()
    }
}

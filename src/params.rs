//! Typed parameter passing across the provider boundary.
//!
//! A [`Params`] value is a small array of keyed, typed entries used in both
//! directions: *set*-style calls carry filled values into an implementation,
//! *get*-style calls carry unfilled requests that the implementation fills.
//! Implementations silently skip keys they do not recognize; callers that
//! cannot proceed without a value mark the request required and check it
//! afterwards with [`Params::check_required`].

use crate::{Error, Result};
use std::borrow::Cow;

/// The type tag of a parameter slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamKind {
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// A size in bytes.
    Size,
    /// Arbitrary-precision unsigned integer, big-endian bytes.
    Bignum,
    /// UTF-8 string.
    Utf8,
    /// Raw octet string.
    Octets,
}

/// A parameter value, tagged per [`ParamKind`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParamValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// A size in bytes.
    Size(usize),
    /// Arbitrary-precision unsigned integer, big-endian bytes, no leading
    /// zeros.
    Bignum(Vec<u8>),
    /// UTF-8 string.
    Utf8(String),
    /// Raw octet string.
    Octets(Vec<u8>),
}

impl ParamValue {
    /// The tag of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Uint(_) => ParamKind::Uint,
            ParamValue::Size(_) => ParamKind::Size,
            ParamValue::Bignum(_) => ParamKind::Bignum,
            ParamValue::Utf8(_) => ParamKind::Utf8,
            ParamValue::Octets(_) => ParamKind::Octets,
        }
    }

    /// A [`ParamValue::Bignum`] in canonical form: leading zero bytes
    /// stripped.
    pub fn bignum(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        let zeros = bytes.iter().take_while(|&&b| b == 0).count();
        bytes.drain(..zeros);
        ParamValue::Bignum(bytes)
    }

    /// The "returned length" of a variable-size value, in bytes.
    pub fn returned_len(&self) -> Option<usize> {
        match self {
            ParamValue::Bignum(b) | ParamValue::Octets(b) => Some(b.len()),
            ParamValue::Utf8(s) => Some(s.len()),
            _ => None,
        }
    }
}

/// One keyed slot in a [`Params`] array.
#[derive(Clone, Debug)]
pub struct Param {
    key: Cow<'static, str>,
    kind: ParamKind,
    value: Option<ParamValue>,
    required: bool,
}

impl Param {
    /// The slot's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The slot's type tag.
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// The slot's value, if set or filled.
    pub fn value(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    /// Whether the caller insists this request be filled.
    pub fn required(&self) -> bool {
        self.required
    }
}

/// An ordered parameter array. See the module docs for the two directions of
/// use.
#[derive(Clone, Debug, Default)]
pub struct Params {
    entries: Vec<Param>,
}

impl Params {
    /// The empty array, for calls that pass no parameters.
    pub const EMPTY: Params = Params { entries: Vec::new() };

    /// An empty, growable array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filled (set-style) entry.
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: ParamValue) -> Self {
        let kind = value.kind();
        self.entries.push(Param { key: key.into(), kind, value: Some(value), required: false });
        self
    }

    /// Appends an unfilled (get-style) request.
    pub fn request(mut self, key: impl Into<Cow<'static, str>>, kind: ParamKind) -> Self {
        self.entries.push(Param { key: key.into(), kind, value: None, required: false });
        self
    }

    /// Appends an unfilled request that [`Params::check_required`] will
    /// insist on.
    pub fn request_required(mut self, key: impl Into<Cow<'static, str>>, kind: ParamKind) -> Self {
        self.entries.push(Param { key: key.into(), kind, value: None, required: true });
        self
    }

    /// Fills the request for `key`, if one is present with a matching kind.
    /// Returns whether a slot accepted the value; implementations ignore a
    /// `false` return and move on.
    pub fn fill(&mut self, key: &str, value: ParamValue) -> bool {
        for entry in &mut self.entries {
            if entry.key == key && entry.kind == value.kind() {
                entry.value = Some(value);
                return true;
            }
        }
        false
    }

    /// Errors with [`Error::MissingParam`] if any required request is still
    /// unfilled.
    pub fn check_required(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.required && entry.value.is_none() {
                return Err(Error::MissingParam(entry.key.clone().into_owned()));
            }
        }
        Ok(())
    }

    /// The value at `key`, if set or filled.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value.as_ref())
    }

    /// An unsigned integer at `key`, coercing across the integer tags.
    pub fn get_uint(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            ParamValue::Uint(v) => Some(*v),
            ParamValue::Size(v) => Some(*v as u64),
            ParamValue::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// A size at `key`, coercing across the integer tags.
    pub fn get_size(&self, key: &str) -> Option<usize> {
        self.get_uint(key).map(|v| v as usize)
    }

    /// A string at `key`.
    pub fn get_utf8(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            ParamValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// An octet string at `key`.
    pub fn get_octets(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            ParamValue::Octets(b) => Some(b),
            _ => None,
        }
    }

    /// Big-endian bignum bytes at `key`.
    pub fn get_bignum(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            ParamValue::Bignum(b) => Some(b),
            _ => None,
        }
    }

    /// Iterates the slots in order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.entries.iter()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the array has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Well-known parameter keys used by the runtime's own surfaces.
pub mod key {
    /// Digest or secret size in bytes (`Size`).
    pub const SIZE: &str = "size";
    /// Digest block size in bytes (`Size`).
    pub const BLOCK_SIZE: &str = "blocksize";
    /// Zero-padding toggle on key-exchange output (`Uint`, 0 or 1).
    pub const PAD: &str = "pad";
    /// Provider name (`Utf8`).
    pub const NAME: &str = "name";
    /// Provider version (`Utf8`).
    pub const VERSION: &str = "version";
    /// Provider status string (`Utf8`).
    pub const STATUS: &str = "status";
}

//! Failures surfaced by the runtime. Every public operation reports through
//! [`crate::Result`]; fetch misses are recoverable, everything else is fatal
//! for the failing call only.

use crate::dispatch::Operation;

/// Any failure the runtime can report to a caller.
///
/// Variants group into the classes a caller may want to branch on:
///
/// * *not found*: [`Error::NotFound`], retry with different properties
/// * *incomplete implementation*: [`Error::Incomplete`],
///   [`Error::IncompleteProvider`]
/// * *protocol misuse*: [`Error::Misuse`], [`Error::Unsupported`],
///   [`Error::BufferTooSmall`]
/// * *configuration*: [`Error::MalformedProperties`],
///   [`Error::MissingParam`], [`Error::NameConflict`]
/// * *resource exhaustion*: [`Error::Exhausted`], [`Error::NamesExhausted`]
/// * *provider-reported*: [`Error::Provider`]
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// No implementation matched the `(operation, name, properties)` triple.
    #[error("no {operation} implementation for `{name}` matches properties `{properties}`")]
    NotFound {
        /// The operation kind that was requested.
        operation: Operation,
        /// The algorithm name that was requested.
        name: String,
        /// The effective property query, after default merging.
        properties: String,
    },

    /// A provider's dispatch table failed the operation's completeness rule.
    #[error("incomplete {operation} implementation of `{name}`: {detail}")]
    Incomplete {
        /// The operation kind whose rule was violated.
        operation: Operation,
        /// The algorithm the table was offered under.
        name: String,
        /// Which slot was missing or malformed.
        detail: String,
    },

    /// A provider's own dispatch table (returned from `provider_init`) was
    /// missing a required entry.
    #[error("provider dispatch table is incomplete: {0}")]
    IncompleteProvider(&'static str),

    /// An operation was invoked in a state that does not admit it, e.g.
    /// `update` on a context that never saw `init`.
    #[error("operation invoked in the wrong state: {0}")]
    Misuse(&'static str),

    /// The bound implementation does not expose the requested optional slot.
    #[error("`{0}` is not supported by the bound implementation")]
    Unsupported(&'static str),

    /// A caller-supplied output buffer cannot hold the result.
    #[error("output buffer too small: need {need} bytes, got {got}")]
    BufferTooSmall {
        /// Bytes the operation would produce.
        need: usize,
        /// Bytes the caller made available.
        got: usize,
    },

    /// A property definition or query failed to parse.
    #[error("malformed property string `{input}`: {detail} at byte {at}")]
    MalformedProperties {
        /// The offending input, verbatim.
        input: String,
        /// Byte offset of the first unparseable character.
        at: usize,
        /// What the parser expected there.
        detail: &'static str,
    },

    /// A parameter marked required by the caller was not filled in.
    #[error("required parameter `{0}` was not provided")]
    MissingParam(String),

    /// An algorithm name is already bound to a different identity.
    #[error("name `{0}` is already bound to a different algorithm")]
    NameConflict(String),

    /// The name map ran out of identifiers.
    #[error("algorithm name id space is exhausted")]
    NamesExhausted,

    /// A provider reported that it could not allocate.
    #[error("provider `{provider}` ran out of resources")]
    Exhausted {
        /// Name of the provider that failed.
        provider: String,
    },

    /// A provider reported a failure of its own.
    #[error("provider `{provider}` failed with reason code {reason}")]
    Provider {
        /// Name of the provider that failed.
        provider: String,
        /// Provider-defined reason code, resolvable through
        /// [`crate::provider::Provider::reason_string`].
        reason: u32,
    },
}

/// The runtime's `Result` alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for schema construction.
//!
//! Every failure in this crate is a build-time [`SchemaError`]: a resolved
//! layout applied to a correctly sized buffer cannot fail at encode/decode
//! time, so there is no runtime error category at all.

use thiserror::Error;

/// Result type alias for schema construction.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors reported while a schema is being defined.
///
/// All variants are fatal: the definition pass stops at the first one and the
/// offending struct or field path is part of the message.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A struct with this name is already registered in the builder.
    #[error("struct '{0}' is already defined")]
    DuplicateStruct(String),

    /// Two fields in one struct share a name.
    #[error("duplicate field '{path}'")]
    DuplicateField { path: String },

    /// A candidate codec failed the capability gate (missing operation,
    /// missing size, or an otherwise unusable operation table).
    #[error("field '{path}': {detail}")]
    InvalidCandidate { path: String, detail: String },

    /// A converter's four endian operations do not agree on one receiver.
    #[error("field '{path}': converter operations disagree on receiver ({first} vs {second})")]
    ReceiverMismatch {
        path: String,
        first: String,
        second: String,
    },

    /// A bit-field is wider than its underlying integer type.
    #[error("field '{path}': bit width {width} exceeds {scalar} ({max} bits)")]
    WidthOverflow {
        path: String,
        width: u32,
        scalar: &'static str,
        max: u32,
    },

    /// A bit group ended up wider than the 64-bit scratch word.
    #[error("field '{path}': bit group spans {bits} bits, the limit is 64")]
    GroupTooWide { path: String, bits: u32 },

    /// A raw bit-field was used directly as an array element.
    #[error("field '{path}': a bit-field cannot be an array element, group it inside a struct first")]
    BitFieldInArray { path: String },

    /// A bits-adapter's `set`/`integer` pair does not match the declared
    /// underlying scalar.
    #[error("field '{path}': bits adapter mismatch: {detail}")]
    AdapterMismatch { path: String, detail: String },

    /// A cast target cannot be derived from the converter's receiver type.
    #[error("field '{path}': cast target {target} is not convertible from receiver {receiver}")]
    CastMismatch {
        path: String,
        target: &'static str,
        receiver: &'static str,
    },
}

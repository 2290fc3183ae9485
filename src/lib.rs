//! Schema-driven binary layouts: declarative struct descriptions compiled
//! to deterministic byte layouts with symmetric encode and decode.
//!
//! A schema is an ordered list of fields (scalars, nested structs, fixed
//! arrays, sub-byte bit-fields, converter-backed leaves). Defining it
//! validates every piece once, packs bit-field runs into shared containers,
//! resolves byte order, and produces a [`StructLayout`]: total size, the
//! offset of every field, and one traversal plan serving all four
//! operations (encode and decode, little and big endian).
//!
//! # Features
//!
//! - Nested structs embedded by value, with per-embedding byte order
//! - Fixed-size arrays of any element, including arrays of arrays
//! - Bit-fields packed into 1, 2, 4, or 8 byte containers
//! - Custom codecs admitted through a declared capability table
//! - Converter deduplication keyed by codec identity, not instance
//! - Casts that store one type and serialize through another
//!
//! # Example
//!
//! ```
//! use bytepack::{bit, bits, field, Endianness, SchemaBuilder, Value, ValueType};
//!
//! let mut builder = SchemaBuilder::new();
//! let status = builder.define(
//!     "status",
//!     Endianness::Little,
//!     vec![
//!         field("voltage", ValueType::F32),
//!         field("enabled", bit()),
//!         field("mode", bits(ValueType::U8, 3)),
//!     ],
//! )?;
//!
//! // One f32 plus a single packed byte for the two bit-fields.
//! assert_eq!(status.size(), 5);
//!
//! let value = Value::record([
//!     ("voltage", Value::F32(12.5)),
//!     ("enabled", Value::Bool(true)),
//!     ("mode", Value::U8(3)),
//! ]);
//! let bytes = status.encode_vec(&value);
//! assert_eq!(status.decode(&bytes, 0), value);
//! # Ok::<(), bytepack::SchemaError>(())
//! ```
//!
//! # Scalar Types
//!
//! | Type | Size | Bit-field widths |
//! |-----------|---------|------------------|
//! | `Bool` | 1 byte | 1 |
//! | `I8`/`U8` | 1 byte | 1 to 8 |
//! | `I16`/`U16` | 2 bytes | 1 to 16 |
//! | `I32`/`U32` | 4 bytes | 1 to 32 |
//! | `I64`/`U64` | 8 bytes | 1 to 64 |
//! | `F32` | 4 bytes | not packable |
//! | `F64` | 8 bytes | not packable |
//! | `Str` | codec-defined | not packable |
//!
//! # Byte Order
//!
//! Every struct declares a default. A field inherits the default of the
//! struct it is finally attached to, so embedding the same schema in a
//! little-endian and a big-endian parent yields two layouts that differ
//! exactly where inheritance applies. [`Field::endian`] pins a field (or a
//! whole embedded subtree) regardless of any parent. At encode time the
//! four operation variants substitute their byte order only for inherited
//! fields; explicit overrides are already baked into the plan.
//!
//! # Schema Errors
//!
//! All validation happens in [`SchemaBuilder::define`], which returns
//! [`SchemaError`] for duplicate names, rejected codecs, over-wide
//! bit-fields, and mismatched casts or adapters. Encode and decode never
//! return errors; handing them a short buffer or a value missing a field
//! is a caller bug and panics.

pub mod codec;
pub mod endian;
pub mod error;
mod exec;
pub mod schema;
pub mod value;

pub use codec::{
    AdapterCapability, BitsAdapter, Capability, Codec, CodecId, FixedStr, Op, Receiver,
    ScalarCodec,
};
pub use endian::Endianness;
pub use error::{Result, SchemaError};
pub use schema::{
    array, bit, bits, cast, codec, field, BitGroup, BitMember, BitsInit, CastInit,
    ConverterRegistry, Field, FieldInit, Kind, Plan, SchemaBuilder, Step, StructLayout,
};
pub use value::{Value, ValueType};

//! Schema definition and resolution.
//!
//! [`field`], [`array`], [`bits`], [`bit`], [`codec`], and [`cast`] build
//! inert field descriptions; [`SchemaBuilder::define`] validates them,
//! packs bit-field runs, resolves offsets and byte order, and returns a
//! shared [`StructLayout`] ready to encode and decode.

pub(crate) mod bitfield;
pub(crate) mod builder;
pub(crate) mod field;
pub(crate) mod resolve;

pub use bitfield::{BitGroup, BitMember};
pub use builder::{ConverterRegistry, Kind, SchemaBuilder};
pub use field::{array, bit, bits, cast, codec, field, BitsInit, CastInit, Field, FieldInit};
pub use resolve::{Plan, Step, StructLayout};

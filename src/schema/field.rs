//! Field tree model and the free builder functions.
//!
//! `field`, `array`, `bits`, `bit`, and `cast` build inert descriptions; all
//! validation happens in [`SchemaBuilder::define`](crate::SchemaBuilder::define),
//! the single fallible entry point of the definition pass.

use std::sync::Arc;

use crate::codec::{BitsAdapter, Codec};
use crate::endian::{Endianness, FieldEndian};
use crate::schema::bitfield::BitGroup;
use crate::schema::resolve::StructLayout;
use crate::value::ValueType;

/// The unresolved struct tree: an ordered field list with a declared default
/// byte order. Deep-cloned on every embedding so per-embedding endianness
/// never leaks between uses of the same named schema.
#[derive(Debug, Clone)]
pub(crate) struct StructSchema {
    pub(crate) name: String,
    pub(crate) endian: Endianness,
    pub(crate) fields: Vec<Field>,
    pub(crate) size: usize,
}

/// One field of a struct: name, payload kind, resolved byte size and offset,
/// and its byte-order state.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) endian: FieldEndian,
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

/// Payload of a field.
#[derive(Debug, Clone)]
pub(crate) enum FieldKind {
    /// A leaf codec; `own_storage` is true for self-contained leaves and
    /// false for converters, decided by the capability gate.
    Scalar {
        codec: Arc<dyn Codec>,
        own_storage: bool,
    },
    /// An embedded struct (always a deep clone of the registered tree).
    Struct(StructSchema),
    /// Fixed-length homogeneous repetition.
    Array(ArrayNode),
    /// A sub-byte field, present only between `field()` and `define()`; the
    /// packer folds runs of these into `Group` fields.
    Bits(BitFieldDecl),
    /// A packed run of bit-fields occupying one container.
    Group(Arc<BitGroup>),
    /// A stored type bridged to a converter with a different receiver.
    Cast(CastNode),
}

#[derive(Debug, Clone)]
pub(crate) struct ArrayNode {
    pub(crate) len: usize,
    pub(crate) elem: Box<Field>,
}

#[derive(Debug, Clone)]
pub(crate) struct BitFieldDecl {
    pub(crate) scalar: ValueType,
    pub(crate) width: u32,
    pub(crate) adapter: Option<Arc<dyn BitsAdapter>>,
}

#[derive(Debug, Clone)]
pub(crate) struct CastNode {
    pub(crate) target: ValueType,
    pub(crate) codec: Arc<dyn Codec>,
    /// Converter receiver. Starts equal to `target`; the gate overwrites it
    /// with the converter's declared receiver during `define()`.
    pub(crate) receiver: ValueType,
}

impl Field {
    fn new(name: &str, kind: FieldKind) -> Field {
        Field {
            name: name.to_owned(),
            kind,
            endian: FieldEndian::inherited(),
            offset: 0,
            size: 0,
        }
    }

    /// Unnamed field wrapping an array element.
    pub(crate) fn anonymous(kind: FieldKind) -> Field {
        Field::new("", kind)
    }

    /// Sets an explicit byte-order override on this field.
    ///
    /// On an embedded struct or array this rewrites the whole subtree: every
    /// descendant becomes explicitly `endian`, including descendants that
    /// carried their own overrides.
    pub fn endian(mut self, endian: Endianness) -> Field {
        crate::schema::resolve::propagate_endian(std::slice::from_mut(&mut self), endian, true);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset relative to the owning struct, valid after `define()`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte size, valid after `define()`.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte-order state, resolved at the latest attachment.
    pub fn endian_state(&self) -> FieldEndian {
        self.endian
    }

    /// Short label of the payload kind, for layout tables.
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            FieldKind::Scalar { own_storage, .. } => {
                if *own_storage {
                    "type"
                } else {
                    "converter"
                }
            }
            FieldKind::Struct(_) => "struct",
            FieldKind::Array(_) => "array",
            FieldKind::Bits(_) => "bits",
            FieldKind::Group(_) => "group",
            FieldKind::Cast(_) => "cast",
        }
    }
}

/// An unvalidated field payload, accepted by [`field`] and [`array`].
///
/// Anything usable as a field converts into this: a [`ValueType`] (built-in
/// scalar codec), a defined layout reference (embedded as a deep clone), or
/// the results of [`codec`], [`array`], [`bits`], [`bit`], and [`cast`].
#[derive(Debug)]
pub struct FieldInit(pub(crate) FieldKind);

impl From<ValueType> for FieldInit {
    fn from(ty: ValueType) -> FieldInit {
        FieldInit(FieldKind::Scalar {
            codec: Arc::new(crate::codec::ScalarCodec::new(ty)),
            own_storage: false,
        })
    }
}

impl From<&StructLayout> for FieldInit {
    fn from(layout: &StructLayout) -> FieldInit {
        FieldInit(FieldKind::Struct(layout.schema().clone()))
    }
}

impl From<&Arc<StructLayout>> for FieldInit {
    fn from(layout: &Arc<StructLayout>) -> FieldInit {
        FieldInit(FieldKind::Struct(layout.schema().clone()))
    }
}

/// Builds a named field from any payload.
pub fn field(name: &str, init: impl Into<FieldInit>) -> Field {
    Field::new(name, init.into().0)
}

/// A leaf backed by an explicit codec value, built in or user defined.
/// The capability gate decides at `define()` whether it is a
/// self-contained type or a converter.
pub fn codec<C: Codec + 'static>(codec: C) -> FieldInit {
    FieldInit(FieldKind::Scalar {
        codec: Arc::new(codec),
        own_storage: false,
    })
}

/// Fixed-length repetition of `element`, which may itself be an array.
///
/// A bare bit-field element is rejected by `define()`: bit-fields must be
/// grouped inside a struct before they can repeat.
pub fn array(len: usize, element: impl Into<FieldInit>) -> FieldInit {
    FieldInit(FieldKind::Array(ArrayNode {
        len,
        elem: Box::new(Field::anonymous(element.into().0)),
    }))
}

/// A sub-byte field description, produced by [`bits`] and [`bit`].
#[derive(Debug)]
pub struct BitsInit {
    scalar: ValueType,
    width: u32,
    adapter: Option<Arc<dyn BitsAdapter>>,
}

impl BitsInit {
    /// Routes the field through a bits-adapter: encode reads the narrow
    /// integer via `to_bits`, decode rebuilds the rich value via
    /// `from_bits`. The adapter's declared scalar must match `scalar`.
    pub fn via<A: BitsAdapter + 'static>(mut self, adapter: A) -> BitsInit {
        self.adapter = Some(Arc::new(adapter));
        self
    }
}

impl From<BitsInit> for FieldInit {
    fn from(init: BitsInit) -> FieldInit {
        FieldInit(FieldKind::Bits(BitFieldDecl {
            scalar: init.scalar,
            width: init.width,
            adapter: init.adapter,
        }))
    }
}

/// A bit-field of `width` bits over an integer scalar.
///
/// Consecutive bit-fields pack into shared byte-aligned containers whose
/// byte order follows the struct default; a per-field [`Field::endian`]
/// override has no effect on a bit-field.
pub fn bits(scalar: ValueType, width: u32) -> BitsInit {
    BitsInit {
        scalar,
        width,
        adapter: None,
    }
}

/// A single-bit boolean field.
pub fn bit() -> BitsInit {
    bits(ValueType::Bool, 1)
}

/// A cast field description, produced by [`cast`].
#[derive(Debug)]
pub struct CastInit {
    target: ValueType,
    codec: Arc<dyn Codec>,
}

impl From<CastInit> for FieldInit {
    fn from(init: CastInit) -> FieldInit {
        FieldInit(FieldKind::Cast(CastNode {
            target: init.target,
            codec: init.codec,
            receiver: init.target,
        }))
    }
}

/// A field stored as `target` but serialized through `converter`, whose
/// receiver type differs. `define()` validates that the two types are
/// interconvertible (numeric with numeric, string with string).
pub fn cast<C: Codec + 'static>(target: ValueType, converter: C) -> CastInit {
    CastInit {
        target,
        codec: Arc::new(converter),
    }
}

//! Codec capability model and the built-in codecs.
//!
//! Anything that serializes a leaf declares an explicit operation table
//! ([`Capability`]): which of the four endian-specific operations it exposes
//! and which receiver each operation reads or writes. The table is verified
//! once, when the schema is defined, replacing the reflective probing such
//! designs otherwise rely on. Verified codecs are cached and deduplicated by
//! [`CodecId`], a type identity combined with a configuration hash.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::endian::Endianness;
use crate::value::{Value, ValueType};

/// One of the four endian-specific serialization operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    EncodeLittle,
    DecodeLittle,
    EncodeBig,
    DecodeBig,
}

impl Op {
    pub const ALL: [Op; 4] = [
        Op::EncodeLittle,
        Op::DecodeLittle,
        Op::EncodeBig,
        Op::DecodeBig,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Op::EncodeLittle => "encode_le",
            Op::DecodeLittle => "decode_le",
            Op::EncodeBig => "encode_be",
            Op::DecodeBig => "decode_be",
        }
    }
}

/// The receiver a codec operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// The codec serializes its own storage: a self-contained leaf.
    Own,
    /// The codec serializes an external value of the given type.
    External(ValueType),
}

impl Receiver {
    pub fn name(self) -> &'static str {
        match self {
            Receiver::Own => "self",
            Receiver::External(ty) => ty.name(),
        }
    }
}

/// Declared operation table of a candidate codec.
///
/// Built-in codecs declare complete tables through [`Capability::leaf`] or
/// [`Capability::converter`]; hand-assembled tables exist so external codecs
/// can declare exactly what they implement, and so incomplete ones are
/// rejected when the schema is defined.
#[derive(Debug, Clone)]
pub struct Capability {
    ops: Vec<(Op, Receiver)>,
    sized: bool,
}

/// Why a capability table was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CapabilityIssue {
    MissingSize,
    MissingOp(Op),
    ReceiverDisagreement { first: Receiver, second: Receiver },
}

impl Capability {
    /// Empty table; build it up with [`Capability::op`] and
    /// [`Capability::sized`].
    pub fn new() -> Capability {
        Capability {
            ops: Vec::new(),
            sized: false,
        }
    }

    /// Complete table of a self-contained leaf.
    pub fn leaf() -> Capability {
        let mut cap = Capability::new().sized();
        for op in Op::ALL {
            cap = cap.op(op, Receiver::Own);
        }
        cap
    }

    /// Complete table of a converter for an external receiver type.
    pub fn converter(receiver: ValueType) -> Capability {
        let mut cap = Capability::new().sized();
        for op in Op::ALL {
            cap = cap.op(op, Receiver::External(receiver));
        }
        cap
    }

    /// Declares one operation and its receiver.
    pub fn op(mut self, op: Op, receiver: Receiver) -> Capability {
        self.ops.push((op, receiver));
        self
    }

    /// Declares that the codec reports a fixed byte size.
    pub fn sized(mut self) -> Capability {
        self.sized = true;
        self
    }

    /// Checks the table: size present, all four operations present, all
    /// receivers equal. Returns the agreed receiver.
    pub(crate) fn verify(&self) -> std::result::Result<Receiver, CapabilityIssue> {
        if !self.sized {
            return Err(CapabilityIssue::MissingSize);
        }
        for op in Op::ALL {
            if !self.ops.iter().any(|(declared, _)| *declared == op) {
                return Err(CapabilityIssue::MissingOp(op));
            }
        }
        let first = self.ops[0].1;
        for (_, receiver) in &self.ops[1..] {
            if *receiver != first {
                return Err(CapabilityIssue::ReceiverDisagreement {
                    first,
                    second: *receiver,
                });
            }
        }
        Ok(first)
    }
}

impl Default for Capability {
    fn default() -> Capability {
        Capability::new()
    }
}

/// Stable codec identity: the Rust type plus a configuration hash.
///
/// Two codec instances with the same type and configuration are one codec as
/// far as the registry is concerned, no matter how many fields hold separate
/// instances. Configured codecs (such as fixed-length strings) fold their
/// parameters in so different configurations stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecId {
    type_id: TypeId,
    label: &'static str,
    config: u64,
}

impl CodecId {
    /// Identity of an unconfigured codec type.
    pub fn new<C: 'static>(label: &'static str) -> CodecId {
        CodecId {
            type_id: TypeId::of::<C>(),
            label,
            config: 0,
        }
    }

    /// Folds a configuration value into the identity.
    pub fn with<H: Hash>(mut self, config: H) -> CodecId {
        let mut hasher = DefaultHasher::new();
        self.config.hash(&mut hasher);
        config.hash(&mut hasher);
        self.config = hasher.finish();
        self
    }

    /// Display label used by layout tables.
    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// A leaf serializer: fixed size plus the four endian-specific operations.
///
/// The `endian` parameter selects between the little- and big-endian halves
/// of the declared operation table; implementations must honor both.
///
/// # Panics
///
/// `encode` panics if handed a value of the wrong type, and both operations
/// panic if the buffer is shorter than `at + size()`. Both are caller
/// contract violations; a defined schema never produces either.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Operation table inspected when the schema is defined.
    fn capability(&self) -> Capability;

    /// Identity for caching and registry deduplication.
    fn id(&self) -> CodecId;

    /// Encoded size in bytes.
    fn size(&self) -> usize;

    /// Writes `value` at `buf[at..at + size()]`.
    fn encode(&self, value: &Value, buf: &mut [u8], at: usize, endian: Endianness);

    /// Reads a value from `buf[at..at + size()]`.
    fn decode(&self, buf: &[u8], at: usize, endian: Endianness) -> Value;
}

/// Built-in codec for the fixed-size scalar types.
#[derive(Debug, Clone, Copy)]
pub struct ScalarCodec {
    ty: ValueType,
}

impl ScalarCodec {
    pub fn new(ty: ValueType) -> ScalarCodec {
        ScalarCodec { ty }
    }

    pub fn value_type(&self) -> ValueType {
        self.ty
    }
}

fn wrong_type(expected: ValueType, found: &Value) -> ! {
    panic!("expected {} value, found {}", expected, found.kind_name())
}

impl Codec for ScalarCodec {
    fn capability(&self) -> Capability {
        // A string scalar has no fixed size; leaving the table unsized makes
        // the gate reject it instead of guessing a length.
        if self.ty.byte_size().is_none() {
            let mut cap = Capability::new();
            for op in Op::ALL {
                cap = cap.op(op, Receiver::External(self.ty));
            }
            return cap;
        }
        Capability::converter(self.ty)
    }

    fn id(&self) -> CodecId {
        CodecId::new::<ScalarCodec>(self.ty.name()).with(self.ty.name())
    }

    fn size(&self) -> usize {
        self.ty.byte_size().unwrap_or(0)
    }

    fn encode(&self, value: &Value, buf: &mut [u8], at: usize, endian: Endianness) {
        match self.ty {
            ValueType::Bool => match value {
                Value::Bool(v) => buf[at] = *v as u8,
                other => wrong_type(self.ty, other),
            },
            ValueType::I8 => match value {
                Value::I8(v) => buf[at] = *v as u8,
                other => wrong_type(self.ty, other),
            },
            ValueType::U8 => match value {
                Value::U8(v) => buf[at] = *v,
                other => wrong_type(self.ty, other),
            },
            ValueType::I16 => match value {
                Value::I16(v) => match endian {
                    Endianness::Little => LittleEndian::write_i16(&mut buf[at..at + 2], *v),
                    Endianness::Big => BigEndian::write_i16(&mut buf[at..at + 2], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::U16 => match value {
                Value::U16(v) => match endian {
                    Endianness::Little => LittleEndian::write_u16(&mut buf[at..at + 2], *v),
                    Endianness::Big => BigEndian::write_u16(&mut buf[at..at + 2], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::I32 => match value {
                Value::I32(v) => match endian {
                    Endianness::Little => LittleEndian::write_i32(&mut buf[at..at + 4], *v),
                    Endianness::Big => BigEndian::write_i32(&mut buf[at..at + 4], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::U32 => match value {
                Value::U32(v) => match endian {
                    Endianness::Little => LittleEndian::write_u32(&mut buf[at..at + 4], *v),
                    Endianness::Big => BigEndian::write_u32(&mut buf[at..at + 4], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::I64 => match value {
                Value::I64(v) => match endian {
                    Endianness::Little => LittleEndian::write_i64(&mut buf[at..at + 8], *v),
                    Endianness::Big => BigEndian::write_i64(&mut buf[at..at + 8], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::U64 => match value {
                Value::U64(v) => match endian {
                    Endianness::Little => LittleEndian::write_u64(&mut buf[at..at + 8], *v),
                    Endianness::Big => BigEndian::write_u64(&mut buf[at..at + 8], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::F32 => match value {
                Value::F32(v) => match endian {
                    Endianness::Little => LittleEndian::write_f32(&mut buf[at..at + 4], *v),
                    Endianness::Big => BigEndian::write_f32(&mut buf[at..at + 4], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::F64 => match value {
                Value::F64(v) => match endian {
                    Endianness::Little => LittleEndian::write_f64(&mut buf[at..at + 8], *v),
                    Endianness::Big => BigEndian::write_f64(&mut buf[at..at + 8], *v),
                },
                other => wrong_type(self.ty, other),
            },
            ValueType::Str => panic!("str scalar has no fixed-size codec"),
        }
    }

    fn decode(&self, buf: &[u8], at: usize, endian: Endianness) -> Value {
        match self.ty {
            ValueType::Bool => Value::Bool(buf[at] != 0),
            ValueType::I8 => Value::I8(buf[at] as i8),
            ValueType::U8 => Value::U8(buf[at]),
            ValueType::I16 => Value::I16(match endian {
                Endianness::Little => LittleEndian::read_i16(&buf[at..at + 2]),
                Endianness::Big => BigEndian::read_i16(&buf[at..at + 2]),
            }),
            ValueType::U16 => Value::U16(match endian {
                Endianness::Little => LittleEndian::read_u16(&buf[at..at + 2]),
                Endianness::Big => BigEndian::read_u16(&buf[at..at + 2]),
            }),
            ValueType::I32 => Value::I32(match endian {
                Endianness::Little => LittleEndian::read_i32(&buf[at..at + 4]),
                Endianness::Big => BigEndian::read_i32(&buf[at..at + 4]),
            }),
            ValueType::U32 => Value::U32(match endian {
                Endianness::Little => LittleEndian::read_u32(&buf[at..at + 4]),
                Endianness::Big => BigEndian::read_u32(&buf[at..at + 4]),
            }),
            ValueType::I64 => Value::I64(match endian {
                Endianness::Little => LittleEndian::read_i64(&buf[at..at + 8]),
                Endianness::Big => BigEndian::read_i64(&buf[at..at + 8]),
            }),
            ValueType::U64 => Value::U64(match endian {
                Endianness::Little => LittleEndian::read_u64(&buf[at..at + 8]),
                Endianness::Big => BigEndian::read_u64(&buf[at..at + 8]),
            }),
            ValueType::F32 => Value::F32(match endian {
                Endianness::Little => LittleEndian::read_f32(&buf[at..at + 4]),
                Endianness::Big => BigEndian::read_f32(&buf[at..at + 4]),
            }),
            ValueType::F64 => Value::F64(match endian {
                Endianness::Little => LittleEndian::read_f64(&buf[at..at + 8]),
                Endianness::Big => BigEndian::read_f64(&buf[at..at + 8]),
            }),
            ValueType::Str => panic!("str scalar has no fixed-size codec"),
        }
    }
}

/// Built-in codec for fixed-length strings.
///
/// Encode copies up to `len` bytes of UTF-8 and pads the rest with NULs;
/// decode takes everything before the first NUL. The length is part of the
/// codec identity, so one-byte and four-byte strings register separately.
#[derive(Debug, Clone, Copy)]
pub struct FixedStr {
    len: usize,
}

impl FixedStr {
    pub fn new(len: usize) -> FixedStr {
        FixedStr { len }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Codec for FixedStr {
    fn capability(&self) -> Capability {
        Capability::converter(ValueType::Str)
    }

    fn id(&self) -> CodecId {
        CodecId::new::<FixedStr>("str").with(self.len)
    }

    fn size(&self) -> usize {
        self.len
    }

    fn encode(&self, value: &Value, buf: &mut [u8], at: usize, _endian: Endianness) {
        let s = match value {
            Value::Str(s) => s.as_bytes(),
            other => wrong_type(ValueType::Str, other),
        };
        let n = s.len().min(self.len);
        buf[at..at + n].copy_from_slice(&s[..n]);
        for b in &mut buf[at + n..at + self.len] {
            *b = 0;
        }
    }

    fn decode(&self, buf: &[u8], at: usize, _endian: Endianness) -> Value {
        let raw = &buf[at..at + self.len];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(self.len);
        Value::Str(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

/// Declared `set`/`integer` pair of a bits-adapter.
#[derive(Debug, Clone, Copy)]
pub struct AdapterCapability {
    set: Option<ValueType>,
    integer: Option<ValueType>,
}

impl AdapterCapability {
    /// Both operations against one integer scalar, the usual case.
    pub fn symmetric(scalar: ValueType) -> AdapterCapability {
        AdapterCapability {
            set: Some(scalar),
            integer: Some(scalar),
        }
    }

    /// Empty declaration; fill with [`set`](Self::set) and
    /// [`integer`](Self::integer).
    pub fn new() -> AdapterCapability {
        AdapterCapability {
            set: None,
            integer: None,
        }
    }

    pub fn set(mut self, scalar: ValueType) -> AdapterCapability {
        self.set = Some(scalar);
        self
    }

    pub fn integer(mut self, scalar: ValueType) -> AdapterCapability {
        self.integer = Some(scalar);
        self
    }

    /// Checks the pair against the bit-field's underlying scalar.
    pub(crate) fn verify(&self, underlying: ValueType) -> std::result::Result<(), String> {
        let set = match self.set {
            Some(set) => set,
            None => return Err("set(integer) is not declared".to_owned()),
        };
        let integer = match self.integer {
            Some(integer) => integer,
            None => return Err("integer() is not declared".to_owned()),
        };
        if set != integer {
            return Err(format!(
                "set takes {} but integer returns {}",
                set, integer
            ));
        }
        if set != underlying {
            return Err(format!(
                "adapter works over {} but the field is declared over {}",
                set, underlying
            ));
        }
        Ok(())
    }
}

impl Default for AdapterCapability {
    fn default() -> AdapterCapability {
        AdapterCapability::new()
    }
}

/// A richer value type exposing a narrow integer view for bit packing.
///
/// Encode obtains the raw bits through [`to_bits`](Self::to_bits) and masks
/// them to the field width; decode hands the zero-extended raw bits back
/// through [`from_bits`](Self::from_bits). Interpretation of a signed
/// underlying scalar is the adapter's business.
pub trait BitsAdapter: fmt::Debug + Send + Sync {
    /// Declared operation pair, checked when the schema is defined.
    fn capability(&self) -> AdapterCapability;

    /// Identity for caching, like [`Codec::id`].
    fn id(&self) -> CodecId;

    /// Narrow integer view of `value`.
    fn to_bits(&self, value: &Value) -> u64;

    /// Rebuilds the rich value from raw field bits.
    fn from_bits(&self, bits: u64) -> Value;
}

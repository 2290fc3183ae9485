//! Dynamic values exchanged with the executor.
//!
//! Encode walks a [`Value`] tree and writes bytes; decode reads bytes and
//! builds a [`Value`] tree. The tree mirrors the schema: structs become
//! name-keyed maps, arrays become vectors, leaves become typed scalars.

use std::collections::BTreeMap;

/// Wire-level type of a leaf value, used for converter receivers, cast
/// targets, and bit-field underlying types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
}

impl ValueType {
    /// Lowercase name used in layout tables and error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Str => "str",
        }
    }

    /// Encoded size in bytes, if the type has a fixed one.
    ///
    /// Strings have no inherent size; their codec carries the length.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            ValueType::Bool | ValueType::I8 | ValueType::U8 => Some(1),
            ValueType::I16 | ValueType::U16 => Some(2),
            ValueType::I32 | ValueType::U32 | ValueType::F32 => Some(4),
            ValueType::I64 | ValueType::U64 | ValueType::F64 => Some(8),
            ValueType::Str => None,
        }
    }

    /// Width limit for a bit-field declared over this type, if it can back
    /// one at all. Booleans are single bits; floats and strings cannot back
    /// bit-fields.
    pub fn bit_limit(self) -> Option<u32> {
        match self {
            ValueType::Bool => Some(1),
            ValueType::I8 | ValueType::U8 => Some(8),
            ValueType::I16 | ValueType::U16 => Some(16),
            ValueType::I32 | ValueType::U32 => Some(32),
            ValueType::I64 | ValueType::U64 => Some(64),
            ValueType::F32 | ValueType::F64 | ValueType::Str => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ValueType::I8
                | ValueType::I16
                | ValueType::I32
                | ValueType::I64
                | ValueType::U8
                | ValueType::U16
                | ValueType::U32
                | ValueType::U64
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, ValueType::F32 | ValueType::F64)
    }

    /// Whether a stored value of `self` can bridge to a converter receiver of
    /// `other` (and back). Numeric types interconvert; strings only convert
    /// to strings; booleans only to booleans.
    pub fn convertible_to(self, other: ValueType) -> bool {
        if self == other {
            return true;
        }
        self.is_numeric() && other.is_numeric()
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamic value: one leaf, or a whole record tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
}

impl Value {
    /// Builds a struct value from name/value pairs.
    pub fn record<S, I>(fields: I) -> Value
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Value)>,
    {
        Value::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Looks up a field of a struct value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Looks up a field of a struct value, panicking if it is absent.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not a struct value or has no field `name`.
    pub fn field(&self, name: &str) -> &Value {
        match self.get(name) {
            Some(value) => value,
            None => panic!("no field '{}' in {} value", name, self.kind_name()),
        }
    }

    /// The [`ValueType`] of a leaf value; `None` for structs and arrays.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Bool(_) => Some(ValueType::Bool),
            Value::I8(_) => Some(ValueType::I8),
            Value::I16(_) => Some(ValueType::I16),
            Value::I32(_) => Some(ValueType::I32),
            Value::I64(_) => Some(ValueType::I64),
            Value::U8(_) => Some(ValueType::U8),
            Value::U16(_) => Some(ValueType::U16),
            Value::U32(_) => Some(ValueType::U32),
            Value::U64(_) => Some(ValueType::U64),
            Value::F32(_) => Some(ValueType::F32),
            Value::F64(_) => Some(ValueType::F64),
            Value::Str(_) => Some(ValueType::Str),
            Value::Struct(_) | Value::Array(_) => None,
        }
    }

    /// Short name of the variant, for panic and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            other => other.value_type().map(ValueType::name).unwrap_or("value"),
        }
    }

    /// Raw bit pattern of a boolean or integer leaf, sign-extended to 64
    /// bits for signed types. The bit-group writer masks this down to the
    /// field width.
    ///
    /// # Panics
    ///
    /// Panics for floats, strings, structs, and arrays; the builder never
    /// admits those as bit-field scalars.
    pub(crate) fn int_bits(&self) -> u64 {
        match self {
            Value::Bool(v) => *v as u64,
            Value::I8(v) => *v as i64 as u64,
            Value::I16(v) => *v as i64 as u64,
            Value::I32(v) => *v as i64 as u64,
            Value::I64(v) => *v as u64,
            Value::U8(v) => *v as u64,
            Value::U16(v) => *v as u64,
            Value::U32(v) => *v as u64,
            Value::U64(v) => *v,
            other => panic!("{} value has no integer bits", other.kind_name()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_owned())
    }
}

/// Intermediate used by cast conversions: every numeric leaf widens to one
/// of these before narrowing to the target.
enum Num {
    Int(i128),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::I8(v) => Some(Num::Int(*v as i128)),
        Value::I16(v) => Some(Num::Int(*v as i128)),
        Value::I32(v) => Some(Num::Int(*v as i128)),
        Value::I64(v) => Some(Num::Int(*v as i128)),
        Value::U8(v) => Some(Num::Int(*v as i128)),
        Value::U16(v) => Some(Num::Int(*v as i128)),
        Value::U32(v) => Some(Num::Int(*v as i128)),
        Value::U64(v) => Some(Num::Int(*v as i128)),
        Value::F32(v) => Some(Num::Float(*v as f64)),
        Value::F64(v) => Some(Num::Float(*v)),
        _ => None,
    }
}

/// Converts a leaf value to `to`, with `as`-cast semantics between numeric
/// types (integer narrowing wraps, float to integer saturates and truncates).
///
/// The builder validates convertibility when the schema is defined, so this
/// only sees pairs [`ValueType::convertible_to`] accepts.
///
/// # Panics
///
/// Panics on a pair the builder would have rejected, such as a string where
/// a numeric value is stored.
pub(crate) fn convert(value: &Value, to: ValueType) -> Value {
    if value.value_type() == Some(to) {
        return value.clone();
    }
    if let (Value::Str(s), ValueType::Str) = (value, to) {
        return Value::Str(s.clone());
    }
    let num = match as_num(value) {
        Some(num) => num,
        None => panic!("cannot convert {} value to {}", value.kind_name(), to),
    };
    match to {
        ValueType::I8 => Value::I8(num_int(num) as i8),
        ValueType::I16 => Value::I16(num_int(num) as i16),
        ValueType::I32 => Value::I32(num_int(num) as i32),
        ValueType::I64 => Value::I64(num_int(num) as i64),
        ValueType::U8 => Value::U8(num_int(num) as u8),
        ValueType::U16 => Value::U16(num_int(num) as u16),
        ValueType::U32 => Value::U32(num_int(num) as u32),
        ValueType::U64 => Value::U64(num_int(num) as u64),
        ValueType::F32 => Value::F32(match num {
            Num::Int(i) => i as f32,
            Num::Float(f) => f as f32,
        }),
        ValueType::F64 => Value::F64(match num {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }),
        ValueType::Bool | ValueType::Str => {
            panic!("cannot convert {} value to {}", value.kind_name(), to)
        }
    }
}

/// Collapses a [`Num`] to an integer with `as` truncation for floats.
fn num_int(num: Num) -> i128 {
    match num {
        Num::Int(i) => i,
        Num::Float(f) => f as i128,
    }
}

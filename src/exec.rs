//! Plan executor: the in-crate back end that walks resolved steps.
//!
//! All four operations (encode and decode, little and big) interpret the
//! same step list; the role byte order substitutes only for fields whose
//! endianness was inherited, never for explicit overrides. Contract
//! violations (short buffers, missing or mistyped fields, wrong array
//! lengths) panic; a defined schema plus a conforming value never trips
//! them.

use std::collections::BTreeMap;

use crate::endian::Endianness;
use crate::schema::bitfield::{mask, sign_extend, BitGroup, BitMember};
use crate::schema::resolve::Step;
use crate::value::{convert, Value, ValueType};

pub(crate) fn encode_steps(
    steps: &[Step],
    role: Endianness,
    value: &Value,
    buf: &mut [u8],
    base: usize,
) {
    for step in steps {
        match step {
            Step::Leaf {
                path,
                offset,
                endian,
                codec,
                ..
            } => {
                codec.encode(lookup(value, path), buf, base + offset, endian.effective(role));
            }
            Step::Group {
                path,
                offset,
                endian,
                group,
                ..
            } => {
                encode_group(
                    group,
                    endian.effective(role),
                    lookup(value, path),
                    buf,
                    base + offset,
                );
            }
            Step::Cast {
                path,
                offset,
                endian,
                codec,
                receiver,
                ..
            } => {
                let bridged = convert(lookup(value, path), *receiver);
                codec.encode(&bridged, buf, base + offset, endian.effective(role));
            }
            Step::Array {
                path,
                offset,
                len,
                stride,
                body,
            } => {
                let items = array_items(lookup(value, path), path, *len);
                for (i, item) in items.iter().enumerate() {
                    encode_steps(body, role, item, buf, base + offset + i * stride);
                }
            }
        }
    }
}

pub(crate) fn decode_steps(steps: &[Step], role: Endianness, buf: &[u8], base: usize) -> Value {
    let mut root = Value::Struct(BTreeMap::new());
    for step in steps {
        match step {
            Step::Leaf {
                path,
                offset,
                endian,
                codec,
                ..
            } => {
                let v = codec.decode(buf, base + offset, endian.effective(role));
                insert(&mut root, path, v);
            }
            Step::Group {
                path,
                offset,
                endian,
                group,
                ..
            } => {
                let e = endian.effective(role);
                let raw = read_container(buf, base + offset, group.size(), e);
                for member in group.members() {
                    let bits = (raw >> member.shift(group.container_bits(), e)) & mask(member.width());
                    let mut full = path.clone();
                    full.push(member.name().to_owned());
                    insert(&mut root, &full, member_value(member, bits));
                }
            }
            Step::Cast {
                path,
                offset,
                endian,
                codec,
                target,
                ..
            } => {
                let received = codec.decode(buf, base + offset, endian.effective(role));
                insert(&mut root, path, convert(&received, *target));
            }
            Step::Array {
                path,
                offset,
                len,
                stride,
                body,
            } => {
                let mut items = Vec::with_capacity(*len);
                for i in 0..*len {
                    items.push(decode_steps(body, role, buf, base + offset + i * stride));
                }
                insert(&mut root, path, Value::Array(items));
            }
        }
    }
    root
}

/// Follows a dotted path down a value tree. An empty path is the value
/// itself, which is how anonymous array elements resolve.
fn lookup<'a>(value: &'a Value, path: &[String]) -> &'a Value {
    let mut current = value;
    for segment in path {
        current = current.field(segment);
    }
    current
}

fn array_items<'a>(value: &'a Value, path: &[String], len: usize) -> &'a [Value] {
    let items = match value {
        Value::Array(items) => items,
        other => panic!(
            "expected array value at '{}', found {}",
            path.join("."),
            other.kind_name()
        ),
    };
    if items.len() != len {
        panic!(
            "array '{}' expects {} elements, found {}",
            path.join("."),
            len,
            items.len()
        );
    }
    items
}

/// Places `value` at `path`, creating intermediate struct values as
/// needed. An empty path replaces the root, which is how anonymous array
/// elements come back out.
fn insert(root: &mut Value, path: &[String], value: Value) {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => {
            *root = value;
            return;
        }
    };
    let mut current = root;
    for segment in parents {
        current = child_entry(current, segment);
    }
    *child_entry(current, last) = value;
}

fn child_entry<'a>(value: &'a mut Value, name: &str) -> &'a mut Value {
    match value {
        Value::Struct(fields) => fields
            .entry(name.to_owned())
            .or_insert_with(|| Value::Struct(BTreeMap::new())),
        other => panic!("'{}' is a {} value, not a struct", name, other.kind_name()),
    }
}

fn encode_group(group: &BitGroup, endian: Endianness, holder: &Value, buf: &mut [u8], at: usize) {
    let container_bits = group.container_bits();
    let mut scratch = 0u64;
    for member in group.members() {
        let v = holder.field(member.name());
        let raw = match &member.adapter {
            Some(adapter) => adapter.to_bits(v),
            None => v.int_bits(),
        };
        scratch |= (raw & mask(member.width())) << member.shift(container_bits, endian);
    }
    write_container(buf, at, group.size(), endian, scratch);
}

fn member_value(member: &BitMember, bits: u64) -> Value {
    if let Some(adapter) = &member.adapter {
        return adapter.from_bits(bits);
    }
    match member.scalar() {
        ValueType::Bool => Value::Bool(bits != 0),
        ValueType::I8 => Value::I8(sign_extend(bits, member.width()) as i8),
        ValueType::I16 => Value::I16(sign_extend(bits, member.width()) as i16),
        ValueType::I32 => Value::I32(sign_extend(bits, member.width()) as i32),
        ValueType::I64 => Value::I64(sign_extend(bits, member.width())),
        ValueType::U8 => Value::U8(bits as u8),
        ValueType::U16 => Value::U16(bits as u16),
        ValueType::U32 => Value::U32(bits as u32),
        ValueType::U64 => Value::U64(bits),
        other => unreachable!("bit-field over {}", other),
    }
}

fn write_container(buf: &mut [u8], at: usize, size: usize, endian: Endianness, bits: u64) {
    for i in 0..size {
        let byte = (bits >> (8 * i)) as u8;
        match endian {
            Endianness::Little => buf[at + i] = byte,
            Endianness::Big => buf[at + size - 1 - i] = byte,
        }
    }
}

fn read_container(buf: &[u8], at: usize, size: usize, endian: Endianness) -> u64 {
    let mut bits = 0u64;
    for i in 0..size {
        let byte = match endian {
            Endianness::Little => buf[at + i],
            Endianness::Big => buf[at + size - 1 - i],
        };
        bits |= (byte as u64) << (8 * i);
    }
    bits
}

//! Layout resolution: cumulative offsets, byte-order propagation, and the
//! traversal plan every back end follows.
//!
//! The plan is one deterministic, declaration-ordered step list per struct:
//! one read-or-write per leaf at its resolved byte range, nested structs
//! flattened into dotted paths, arrays as one nested iteration per
//! dimension. The in-crate executor interprets it; a source emitter could
//! walk the same steps and print code instead.

use std::fmt;
use std::sync::Arc;

use crate::codec::Codec;
use crate::endian::{Endianness, FieldEndian};
use crate::exec;
use crate::schema::bitfield::BitGroup;
use crate::schema::field::{Field, FieldKind, StructSchema};
use crate::value::{Value, ValueType};

/// Walks fields in declaration order, assigning byte offsets. Returns the
/// total size.
pub(crate) fn assign_offsets(fields: &mut [Field]) -> usize {
    let mut offset = 0;
    for field in fields.iter_mut() {
        field.offset = offset;
        offset += field.size;
    }
    offset
}

/// Applies a struct default to every field that has not been explicitly
/// overridden, recursing through nested structs and array elements. A
/// forced application rewrites overrides too and marks the subtree
/// explicit; `Field::endian` uses it when an embedding field carries its
/// own override.
pub(crate) fn propagate_endian(fields: &mut [Field], default: Endianness, force: bool) {
    for field in fields.iter_mut() {
        field.endian.apply(default, force);
        match &mut field.kind {
            FieldKind::Struct(schema) => propagate_endian(&mut schema.fields, default, force),
            FieldKind::Array(array) => {
                propagate_endian(std::slice::from_mut(&mut array.elem), default, force)
            }
            _ => {}
        }
    }
}

/// One step of the resolved traversal.
#[derive(Debug, Clone)]
pub enum Step {
    /// A leaf codec read or write at `offset`.
    Leaf {
        path: Vec<String>,
        offset: usize,
        endian: FieldEndian,
        codec: Arc<dyn Codec>,
        /// True for self-contained leaves, false for converters; a text
        /// back end calls a method on the receiver for the former and a
        /// registered converter instance for the latter.
        own_storage: bool,
    },
    /// A packed bit-group occupying one container at `offset`. Member
    /// values live directly under `path`, keyed by member name.
    Group {
        path: Vec<String>,
        offset: usize,
        endian: FieldEndian,
        group: Arc<BitGroup>,
        /// Scratch-word index, unique across the whole tree.
        index: usize,
    },
    /// A converter invocation bridged through a typed scratch slot.
    Cast {
        path: Vec<String>,
        offset: usize,
        endian: FieldEndian,
        codec: Arc<dyn Codec>,
        target: ValueType,
        receiver: ValueType,
        /// Index into the layout's receiver-typed scratch slots.
        slot: usize,
    },
    /// `len` repetitions of `body`, each `stride` bytes apart. Body paths
    /// and offsets are relative to the element.
    Array {
        path: Vec<String>,
        offset: usize,
        len: usize,
        stride: usize,
        body: Vec<Step>,
    },
}

/// The deterministic traversal of one resolved struct.
#[derive(Debug, Clone)]
pub struct Plan {
    pub(crate) steps: Vec<Step>,
}

impl Plan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Builds the plan for a fully validated, grouped, offset schema.
pub(crate) fn resolve(schema: StructSchema) -> StructLayout {
    let mut next_group = 0;
    let mut cast_slots = Vec::new();
    let steps = build_steps(&schema.fields, 0, &[], &mut next_group, &mut cast_slots);
    StructLayout {
        schema,
        plan: Plan { steps },
        cast_slots,
    }
}

fn build_steps(
    fields: &[Field],
    base: usize,
    prefix: &[String],
    next_group: &mut usize,
    cast_slots: &mut Vec<ValueType>,
) -> Vec<Step> {
    let mut steps = Vec::new();
    for field in fields {
        let offset = base + field.offset;
        match &field.kind {
            FieldKind::Scalar { codec, own_storage } => steps.push(Step::Leaf {
                path: join(prefix, &field.name),
                offset,
                endian: field.endian,
                codec: codec.clone(),
                own_storage: *own_storage,
            }),
            FieldKind::Struct(schema) => {
                let path = join(prefix, &field.name);
                steps.extend(build_steps(
                    &schema.fields,
                    offset,
                    &path,
                    next_group,
                    cast_slots,
                ));
            }
            FieldKind::Array(array) => {
                let body =
                    build_steps(std::slice::from_ref(&array.elem), 0, &[], next_group, cast_slots);
                steps.push(Step::Array {
                    path: join(prefix, &field.name),
                    offset,
                    len: array.len,
                    stride: array.elem.size,
                    body,
                });
            }
            FieldKind::Bits(_) => unreachable!("bit-fields are grouped before resolution"),
            FieldKind::Group(group) => {
                let index = *next_group;
                *next_group += 1;
                steps.push(Step::Group {
                    path: prefix.to_vec(),
                    offset,
                    endian: field.endian,
                    group: group.clone(),
                    index,
                });
            }
            FieldKind::Cast(node) => {
                let receiver = node.receiver;
                let slot = match cast_slots.iter().position(|t| *t == receiver) {
                    Some(slot) => slot,
                    None => {
                        cast_slots.push(receiver);
                        cast_slots.len() - 1
                    }
                };
                steps.push(Step::Cast {
                    path: join(prefix, &field.name),
                    offset,
                    endian: field.endian,
                    codec: node.codec.clone(),
                    target: node.target,
                    receiver,
                    slot,
                });
            }
        }
    }
    steps
}

fn join(prefix: &[String], name: &str) -> Vec<String> {
    let mut path = prefix.to_vec();
    if !name.is_empty() {
        path.push(name.to_owned());
    }
    path
}

/// A resolved struct: the immutable tree, its traversal plan, and the
/// receiver-typed scratch slots its casts share.
///
/// Produced by [`SchemaBuilder::define`](crate::SchemaBuilder::define);
/// everything here is read-only and safe to share across threads.
#[derive(Debug)]
pub struct StructLayout {
    schema: StructSchema,
    plan: Plan,
    cast_slots: Vec<ValueType>,
}

impl StructLayout {
    pub(crate) fn schema(&self) -> &StructSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Total encoded size in bytes.
    pub fn size(&self) -> usize {
        self.schema.size
    }

    /// The byte order declared when the struct was defined.
    pub fn default_endian(&self) -> Endianness {
        self.schema.endian
    }

    /// Resolved top-level fields in declaration order. Bit-field runs
    /// appear as their packed group fields.
    pub fn fields(&self) -> &[Field] {
        &self.schema.fields
    }

    /// The traversal plan shared by every back end.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Receiver types of the cast scratch slots, deduplicated in first-use
    /// order across the whole tree.
    pub fn cast_slots(&self) -> &[ValueType] {
        &self.cast_slots
    }

    /// Encodes `value` at `buf[at..]` using the declared default byte order
    /// for every inherited field.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is shorter than `at + size()`, or if `value` is
    /// missing a field or holds one of the wrong type. Both are caller
    /// contract violations; they cannot arise from a defined schema.
    pub fn encode(&self, value: &Value, buf: &mut [u8], at: usize) {
        exec::encode_steps(&self.plan.steps, self.schema.endian, value, buf, at);
    }

    /// Decodes a value from `buf[at..]` using the declared default byte
    /// order for every inherited field.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is shorter than `at + size()`.
    pub fn decode(&self, buf: &[u8], at: usize) -> Value {
        exec::decode_steps(&self.plan.steps, self.schema.endian, buf, at)
    }

    /// Encodes with inherited fields little-endian.
    pub fn encode_le(&self, value: &Value, buf: &mut [u8], at: usize) {
        exec::encode_steps(&self.plan.steps, Endianness::Little, value, buf, at);
    }

    /// Encodes with inherited fields big-endian.
    pub fn encode_be(&self, value: &Value, buf: &mut [u8], at: usize) {
        exec::encode_steps(&self.plan.steps, Endianness::Big, value, buf, at);
    }

    /// Decodes with inherited fields little-endian.
    pub fn decode_le(&self, buf: &[u8], at: usize) -> Value {
        exec::decode_steps(&self.plan.steps, Endianness::Little, buf, at)
    }

    /// Decodes with inherited fields big-endian.
    pub fn decode_be(&self, buf: &[u8], at: usize) -> Value {
        exec::decode_steps(&self.plan.steps, Endianness::Big, buf, at)
    }

    /// Encodes into a fresh buffer of exactly [`size()`](Self::size) bytes.
    pub fn encode_vec(&self, value: &Value) -> Vec<u8> {
        let mut buf = vec![0u8; self.size()];
        self.encode(value, &mut buf, 0);
        buf
    }
}

impl fmt::Display for StructLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "struct {} ({} bytes, {})",
            self.schema.name, self.schema.size, self.schema.endian
        )?;
        writeln!(f, "{:>7}  {:>5}  field", "offset", "size")?;
        fmt_steps(f, &self.plan.steps, "", 0)
    }
}

fn fmt_steps(f: &mut fmt::Formatter<'_>, steps: &[Step], prefix: &str, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    for step in steps {
        match step {
            Step::Leaf {
                path,
                offset,
                endian,
                codec,
                own_storage,
            } => {
                writeln!(
                    f,
                    "{:>7}  {:>5}  {}{}{}  {} {}{}",
                    offset,
                    codec.size(),
                    pad,
                    prefix,
                    display_path(path),
                    codec.id().label(),
                    endian.resolved(),
                    explicit_mark(*endian),
                )?;
            }
            Step::Group {
                path,
                offset,
                endian,
                group,
                index,
            } => {
                for (i, member) in group.members().iter().enumerate() {
                    let mut full = path.clone();
                    full.push(member.name().to_owned());
                    writeln!(
                        f,
                        "{:>7}  {:>5}  {}{}{}  {}:{} bit {} g{} {}{}",
                        offset,
                        group.size(),
                        pad,
                        prefix,
                        display_path(&full),
                        member.scalar(),
                        member.width(),
                        group.bit_offset(i, endian.resolved()),
                        index,
                        endian.resolved(),
                        explicit_mark(*endian),
                    )?;
                }
            }
            Step::Cast {
                path,
                offset,
                endian,
                codec,
                target,
                slot,
                ..
            } => {
                writeln!(
                    f,
                    "{:>7}  {:>5}  {}{}{}  {} via {} r{} {}{}",
                    offset,
                    codec.size(),
                    pad,
                    prefix,
                    display_path(path),
                    target,
                    codec.id().label(),
                    slot,
                    endian.resolved(),
                    explicit_mark(*endian),
                )?;
            }
            Step::Array {
                path,
                offset,
                len,
                stride,
                body,
            } => {
                writeln!(
                    f,
                    "{:>7}  {:>5}  {}{}{}  [{} x {} bytes]",
                    offset,
                    len * stride,
                    pad,
                    prefix,
                    display_path(path),
                    len,
                    stride,
                )?;
                let inner = format!("{}{}[]", prefix, display_path(path));
                let inner = if body_has_paths(body) {
                    format!("{}.", inner)
                } else {
                    inner
                };
                fmt_steps(f, body, &inner, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn display_path(path: &[String]) -> String {
    path.join(".")
}

fn explicit_mark(endian: FieldEndian) -> &'static str {
    if endian.is_explicit() {
        "*"
    } else {
        ""
    }
}

fn body_has_paths(body: &[Step]) -> bool {
    body.iter().any(|step| match step {
        Step::Leaf { path, .. }
        | Step::Group { path, .. }
        | Step::Cast { path, .. }
        | Step::Array { path, .. } => !path.is_empty(),
    })
}

//! Schema definition context: the capability gate, both registries, and
//! `define()`, the single pass that turns field lists into resolved layouts.
//!
//! The context object owns everything the definition phase mutates (layouts
//! by name, converters by identity, classification cache), so construction
//! is single-threaded by construction and the registries are read-only once
//! definition ends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::codec::{CapabilityIssue, Codec, CodecId, Receiver, ScalarCodec};
use crate::endian::Endianness;
use crate::error::{Result, SchemaError};
use crate::schema::bitfield::pack_groups;
use crate::schema::field::{Field, FieldInit, FieldKind, StructSchema};
use crate::schema::resolve::{self, StructLayout};
use crate::value::ValueType;

/// Classification of a candidate field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Self-contained leaf: serializes its own storage.
    Type,
    /// External codec for a foreign receiver type.
    Converter,
    Struct,
    Array,
    BitField,
    ConverterCast,
    Invalid,
}

/// Cached outcome of verifying one codec's capability table.
#[derive(Debug, Clone)]
enum Classified {
    Type,
    Converter(ValueType),
    Invalid(CapabilityIssue),
}

/// Distinct converters of a schema graph, in registration order.
///
/// Deduplication is by [`CodecId`], never by instance address: however many
/// fields hold their own codec instances, one identity registers once. A
/// text back end emits exactly one converter declaration per entry.
pub struct ConverterRegistry {
    by_id: HashMap<CodecId, usize>,
    entries: Vec<Arc<dyn Codec>>,
}

impl ConverterRegistry {
    fn new() -> ConverterRegistry {
        ConverterRegistry {
            by_id: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn register(&mut self, codec: &Arc<dyn Codec>) {
        let id = codec.id();
        if !self.by_id.contains_key(&id) {
            self.by_id.insert(id, self.entries.len());
            self.entries.push(codec.clone());
        }
    }

    /// Registered codecs in first-seen order.
    pub fn entries(&self) -> &[Arc<dyn Codec>] {
        &self.entries
    }

    pub fn contains(&self, id: &CodecId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The schema definition context.
///
/// All definition goes through one builder; layouts it returns stay valid
/// after the builder is dropped. Layouts registered here are immutable,
/// `Send + Sync`, and safe to encode/decode from any number of threads.
pub struct SchemaBuilder {
    layouts: HashMap<String, Arc<StructLayout>>,
    converters: ConverterRegistry,
    classified: HashMap<CodecId, Classified>,
}

impl SchemaBuilder {
    pub fn new() -> SchemaBuilder {
        SchemaBuilder {
            layouts: HashMap::new(),
            converters: ConverterRegistry::new(),
            classified: HashMap::new(),
        }
    }

    /// Defines a struct: validates every field, packs bit-field runs,
    /// assigns offsets, applies the default byte order, builds the
    /// traversal plan, and registers the layout under `name`.
    ///
    /// This is the only fallible call in the crate; every schema error
    /// surfaces here, naming the offending field path.
    pub fn define(
        &mut self,
        name: &str,
        endian: Endianness,
        mut fields: Vec<Field>,
    ) -> Result<Arc<StructLayout>> {
        if self.layouts.contains_key(name) {
            return Err(SchemaError::DuplicateStruct(name.to_owned()));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    path: format!("{}.{}", name, field.name),
                });
            }
        }

        for field in &mut fields {
            let path = format!("{}.{}", name, field.name);
            self.validate_field(&path, field)?;
        }

        let mut fields = pack_groups(name, fields)?;
        for field in &fields {
            if let FieldKind::Group(group) = &field.kind {
                self.register_scalar(group.container_scalar());
            }
        }

        let size = resolve::assign_offsets(&mut fields);
        resolve::propagate_endian(&mut fields, endian, false);

        let schema = StructSchema {
            name: name.to_owned(),
            endian,
            fields,
            size,
        };
        let layout = Arc::new(resolve::resolve(schema));
        self.layouts.insert(name.to_owned(), layout.clone());
        Ok(layout)
    }

    /// Looks up a previously defined layout.
    pub fn get(&self, name: &str) -> Option<&Arc<StructLayout>> {
        self.layouts.get(name)
    }

    /// The converter registry accumulated so far.
    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Classifies a candidate payload the way `define()` will.
    ///
    /// Codec candidates run through the capability gate (cached by
    /// identity); composite payloads report their structural kind, with the
    /// deep checks left to `define()`.
    pub fn classify(&mut self, init: &FieldInit) -> Kind {
        match &init.0 {
            FieldKind::Scalar { codec, .. } => match self.classify_codec(codec) {
                Classified::Type => Kind::Type,
                Classified::Converter(_) => Kind::Converter,
                Classified::Invalid(_) => Kind::Invalid,
            },
            FieldKind::Struct(_) => Kind::Struct,
            FieldKind::Array(_) => Kind::Array,
            FieldKind::Bits(_) | FieldKind::Group(_) => Kind::BitField,
            FieldKind::Cast(_) => Kind::ConverterCast,
        }
    }

    /// Runs a codec's capability table through the gate, caching by
    /// identity; the first time an identity verifies as a converter it is
    /// registered.
    fn classify_codec(&mut self, codec: &Arc<dyn Codec>) -> Classified {
        let id = codec.id();
        if let Some(cached) = self.classified.get(&id) {
            return cached.clone();
        }
        let outcome = match codec.capability().verify() {
            Ok(Receiver::Own) => Classified::Type,
            Ok(Receiver::External(receiver)) => {
                self.converters.register(codec);
                Classified::Converter(receiver)
            }
            Err(issue) => Classified::Invalid(issue),
        };
        self.classified.insert(id, outcome.clone());
        outcome
    }

    fn register_scalar(&mut self, ty: ValueType) {
        let codec: Arc<dyn Codec> = Arc::new(ScalarCodec::new(ty));
        self.converters.register(&codec);
    }

    /// Validates one field in place: classifies its payload, fixes its byte
    /// size, and recurses through composites. Re-validating an embedded
    /// tree is idempotent and pulls its converters into this builder's
    /// registry.
    fn validate_field(&mut self, path: &str, field: &mut Field) -> Result<()> {
        match &mut field.kind {
            FieldKind::Scalar { codec, own_storage } => {
                let codec = codec.clone();
                match self.classify_codec(&codec) {
                    Classified::Type => {
                        *own_storage = true;
                        field.size = codec.size();
                    }
                    Classified::Converter(_) => {
                        *own_storage = false;
                        field.size = codec.size();
                    }
                    Classified::Invalid(issue) => return Err(issue_error(path, issue)),
                }
            }
            FieldKind::Struct(schema) => {
                field.size = schema.size;
                let mut inner = std::mem::take(&mut schema.fields);
                for child in &mut inner {
                    let child_path = format!("{}.{}", path, child.name);
                    self.validate_field(&child_path, child)?;
                }
                schema.fields = inner;
            }
            FieldKind::Array(array) => {
                if matches!(array.elem.kind, FieldKind::Bits(_)) {
                    return Err(SchemaError::BitFieldInArray {
                        path: path.to_owned(),
                    });
                }
                let elem_path = format!("{}[]", path);
                self.validate_field(&elem_path, &mut array.elem)?;
                field.size = array.len * array.elem.size;
            }
            FieldKind::Bits(decl) => {
                let limit = match decl.scalar.bit_limit() {
                    Some(limit) => limit,
                    None => {
                        return Err(SchemaError::InvalidCandidate {
                            path: path.to_owned(),
                            detail: format!("{} cannot back a bit-field", decl.scalar),
                        })
                    }
                };
                if decl.width == 0 {
                    return Err(SchemaError::InvalidCandidate {
                        path: path.to_owned(),
                        detail: "bit width must be at least 1".to_owned(),
                    });
                }
                if decl.width > limit {
                    return Err(SchemaError::WidthOverflow {
                        path: path.to_owned(),
                        width: decl.width,
                        scalar: decl.scalar.name(),
                        max: limit,
                    });
                }
                if let Some(adapter) = &decl.adapter {
                    adapter
                        .capability()
                        .verify(decl.scalar)
                        .map_err(|detail| SchemaError::AdapterMismatch {
                            path: path.to_owned(),
                            detail,
                        })?;
                }
            }
            FieldKind::Group(group) => {
                field.size = group.size();
                self.register_scalar(group.container_scalar());
            }
            FieldKind::Cast(node) => {
                let codec = node.codec.clone();
                match self.classify_codec(&codec) {
                    Classified::Converter(receiver) => {
                        if !node.target.convertible_to(receiver) {
                            return Err(SchemaError::CastMismatch {
                                path: path.to_owned(),
                                target: node.target.name(),
                                receiver: receiver.name(),
                            });
                        }
                        node.receiver = receiver;
                        field.size = codec.size();
                    }
                    Classified::Type => {
                        return Err(SchemaError::InvalidCandidate {
                            path: path.to_owned(),
                            detail: "cast requires a converter with an external receiver".to_owned(),
                        })
                    }
                    Classified::Invalid(issue) => return Err(issue_error(path, issue)),
                }
            }
        }
        Ok(())
    }
}

impl Default for SchemaBuilder {
    fn default() -> SchemaBuilder {
        SchemaBuilder::new()
    }
}

fn issue_error(path: &str, issue: CapabilityIssue) -> SchemaError {
    match issue {
        CapabilityIssue::MissingSize => SchemaError::InvalidCandidate {
            path: path.to_owned(),
            detail: "codec does not report a fixed size".to_owned(),
        },
        CapabilityIssue::MissingOp(op) => SchemaError::InvalidCandidate {
            path: path.to_owned(),
            detail: format!("codec does not implement {}", op.name()),
        },
        CapabilityIssue::ReceiverDisagreement { first, second } => SchemaError::ReceiverMismatch {
            path: path.to_owned(),
            first: first.name().to_owned(),
            second: second.name().to_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Capability, FixedStr, Op};
    use crate::schema::field::{array, bit, bits, cast, codec, field};
    use crate::value::Value;

    #[derive(Debug)]
    struct HalfCodec;

    impl Codec for HalfCodec {
        fn capability(&self) -> Capability {
            Capability::new()
                .sized()
                .op(Op::EncodeLittle, Receiver::External(ValueType::U8))
                .op(Op::DecodeLittle, Receiver::External(ValueType::U8))
        }

        fn id(&self) -> CodecId {
            CodecId::new::<HalfCodec>("half")
        }

        fn size(&self) -> usize {
            1
        }

        fn encode(&self, _: &Value, _: &mut [u8], _: usize, _: Endianness) {}

        fn decode(&self, _: &[u8], _: usize, _: Endianness) -> Value {
            Value::U8(0)
        }
    }

    #[derive(Debug)]
    struct OwnLeaf;

    impl Codec for OwnLeaf {
        fn capability(&self) -> Capability {
            Capability::leaf()
        }

        fn id(&self) -> CodecId {
            CodecId::new::<OwnLeaf>("own")
        }

        fn size(&self) -> usize {
            2
        }

        fn encode(&self, value: &Value, buf: &mut [u8], at: usize, _: Endianness) {
            match value {
                Value::U16(v) => buf[at..at + 2].copy_from_slice(&v.to_le_bytes()),
                other => panic!("expected u16, found {}", other.kind_name()),
            }
        }

        fn decode(&self, buf: &[u8], at: usize, _: Endianness) -> Value {
            Value::U16(u16::from_le_bytes([buf[at], buf[at + 1]]))
        }
    }

    #[test]
    fn test_simple_struct_layout() {
        let mut builder = SchemaBuilder::new();
        let point = builder
            .define(
                "point",
                Endianness::Little,
                vec![field("x", ValueType::I16), field("y", ValueType::I16)],
            )
            .unwrap();
        assert_eq!(point.size(), 4);
        assert_eq!(point.name(), "point");
        let offsets: Vec<usize> = point.fields().iter().map(|f| f.offset()).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[test]
    fn test_mixed_type_offsets() {
        let mut builder = SchemaBuilder::new();
        let layout = builder
            .define(
                "mixed",
                Endianness::Little,
                vec![
                    field("flag", ValueType::Bool),
                    field("small", ValueType::I16),
                    field("medium", ValueType::I32),
                    field("wide", ValueType::F64),
                ],
            )
            .unwrap();
        let offsets: Vec<usize> = layout.fields().iter().map(|f| f.offset()).collect();
        assert_eq!(offsets, vec![0, 1, 3, 7]);
        assert_eq!(layout.size(), 15);
    }

    #[test]
    fn test_duplicate_struct_name_fails() {
        let mut builder = SchemaBuilder::new();
        builder
            .define("twice", Endianness::Little, vec![field("a", ValueType::U8)])
            .unwrap();
        match builder.define("twice", Endianness::Big, vec![field("a", ValueType::U8)]) {
            Err(SchemaError::DuplicateStruct(name)) => assert_eq!(name, "twice"),
            other => panic!("expected duplicate struct error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_field_name_fails() {
        let mut builder = SchemaBuilder::new();
        let result = builder.define(
            "s",
            Endianness::Little,
            vec![field("a", ValueType::U8), field("a", ValueType::U16)],
        );
        match result {
            Err(SchemaError::DuplicateField { path }) => assert_eq!(path, "s.a"),
            other => panic!("expected duplicate field error, got {:?}", other),
        }
    }

    #[test]
    fn test_bit_width_overflow_fails() {
        let mut builder = SchemaBuilder::new();
        match builder.define("s", Endianness::Little, vec![field("a", bits(ValueType::U8, 9))]) {
            Err(SchemaError::WidthOverflow { path, width, max, .. }) => {
                assert_eq!(path, "s.a");
                assert_eq!(width, 9);
                assert_eq!(max, 8);
            }
            other => panic!("expected width overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_bool_bit_width_is_one() {
        let mut builder = SchemaBuilder::new();
        assert!(builder
            .define("ok", Endianness::Little, vec![field("a", bit())])
            .is_ok());
        match builder.define("bad", Endianness::Little, vec![field("a", bits(ValueType::Bool, 2))])
        {
            Err(SchemaError::WidthOverflow { max, .. }) => assert_eq!(max, 1),
            other => panic!("expected width overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_float_cannot_back_bit_field() {
        let mut builder = SchemaBuilder::new();
        match builder.define("s", Endianness::Little, vec![field("a", bits(ValueType::F32, 3))]) {
            Err(SchemaError::InvalidCandidate { path, .. }) => assert_eq!(path, "s.a"),
            other => panic!("expected invalid candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_width_rejected() {
        let mut builder = SchemaBuilder::new();
        assert!(matches!(
            builder.define("s", Endianness::Little, vec![field("a", bits(ValueType::U8, 0))]),
            Err(SchemaError::InvalidCandidate { .. })
        ));
    }

    #[test]
    fn test_bit_field_as_array_element_fails() {
        let mut builder = SchemaBuilder::new();
        match builder.define(
            "s",
            Endianness::Little,
            vec![field("a", array(2, bits(ValueType::U8, 4)))],
        ) {
            Err(SchemaError::BitFieldInArray { path }) => assert_eq!(path, "s.a"),
            other => panic!("expected bit-field-in-array error, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_codec_rejected() {
        let mut builder = SchemaBuilder::new();
        match builder.define("s", Endianness::Little, vec![field("a", codec(HalfCodec))]) {
            Err(SchemaError::InvalidCandidate { path, detail }) => {
                assert_eq!(path, "s.a");
                assert!(detail.contains("encode_be"), "{}", detail);
            }
            other => panic!("expected invalid candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_classification_kinds() {
        let mut builder = SchemaBuilder::new();
        let nested = builder
            .define("n", Endianness::Little, vec![field("a", ValueType::U8)])
            .unwrap();
        assert_eq!(builder.classify(&ValueType::U8.into()), Kind::Converter);
        assert_eq!(builder.classify(&codec(OwnLeaf)), Kind::Type);
        assert_eq!(builder.classify(&codec(HalfCodec)), Kind::Invalid);
        assert_eq!(builder.classify(&(&nested).into()), Kind::Struct);
        assert_eq!(builder.classify(&array(3, ValueType::U8)), Kind::Array);
        assert_eq!(
            builder.classify(&bits(ValueType::U8, 3).into()),
            Kind::BitField
        );
        assert_eq!(
            builder.classify(&cast(ValueType::I32, ScalarCodec::new(ValueType::I8)).into()),
            Kind::ConverterCast
        );
    }

    #[test]
    fn test_own_storage_leaf_accepted() {
        let mut builder = SchemaBuilder::new();
        let layout = builder
            .define("s", Endianness::Little, vec![field("a", codec(OwnLeaf))])
            .unwrap();
        assert_eq!(layout.size(), 2);
        // Self-contained leaves are not converters and do not register.
        assert!(!builder.converters().contains(&OwnLeaf.id()));
    }

    #[test]
    fn test_converter_dedup_across_graph() {
        let mut builder = SchemaBuilder::new();
        let inner = builder
            .define(
                "inner",
                Endianness::Little,
                vec![field("a", ValueType::U16), field("b", ValueType::U16)],
            )
            .unwrap();
        builder
            .define(
                "outer",
                Endianness::Little,
                vec![
                    field("x", ValueType::U16),
                    field("nested", &inner),
                    field("arr", array(4, ValueType::U16)),
                ],
            )
            .unwrap();
        assert_eq!(builder.converters().len(), 1);
        assert!(builder
            .converters()
            .contains(&ScalarCodec::new(ValueType::U16).id()));
    }

    #[test]
    fn test_string_lengths_register_separately() {
        let mut builder = SchemaBuilder::new();
        builder
            .define(
                "s",
                Endianness::Little,
                vec![
                    field("one", codec(FixedStr::new(1))),
                    field("four", codec(FixedStr::new(4))),
                    field("again", codec(FixedStr::new(1))),
                ],
            )
            .unwrap();
        assert_eq!(builder.converters().len(), 2);
    }

    #[test]
    fn test_group_container_registered() {
        let mut builder = SchemaBuilder::new();
        builder
            .define(
                "s",
                Endianness::Little,
                vec![
                    field("a", bits(ValueType::U8, 3)),
                    field("b", bits(ValueType::U8, 5)),
                ],
            )
            .unwrap();
        assert!(builder
            .converters()
            .contains(&ScalarCodec::new(ValueType::U8).id()));
    }

    #[test]
    fn test_cast_mismatch_fails() {
        let mut builder = SchemaBuilder::new();
        match builder.define(
            "s",
            Endianness::Little,
            vec![field("a", cast(ValueType::I32, FixedStr::new(2)))],
        ) {
            Err(SchemaError::CastMismatch { target, receiver, .. }) => {
                assert_eq!(target, "i32");
                assert_eq!(receiver, "str");
            }
            other => panic!("expected cast mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_resolves_receiver() {
        let mut builder = SchemaBuilder::new();
        let layout = builder
            .define(
                "s",
                Endianness::Little,
                vec![field("a", cast(ValueType::I32, ScalarCodec::new(ValueType::I8)))],
            )
            .unwrap();
        assert_eq!(layout.size(), 1);
        assert_eq!(layout.cast_slots(), &[ValueType::I8]);
    }
}

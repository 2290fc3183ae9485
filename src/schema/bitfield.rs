//! Bit-field grouping and the bit arithmetic behind packed containers.
//!
//! Consecutive bit-fields merge into byte-aligned containers of 1, 2, 4, or
//! 8 bytes, capped at 64 bits of content each. A field that would push the
//! open group past 64 bits closes it and opens the next group. Bit offsets
//! depend on the container's byte order: little-endian fills from bit 0
//! upward in declaration order, big-endian from the top downward.

use std::sync::Arc;

use crate::codec::BitsAdapter;
use crate::endian::Endianness;
use crate::error::{Result, SchemaError};
use crate::schema::field::{Field, FieldKind};
use crate::value::ValueType;

/// One bit-field inside a packed group.
#[derive(Debug, Clone)]
pub struct BitMember {
    pub(crate) name: String,
    pub(crate) scalar: ValueType,
    pub(crate) width: u32,
    /// Running offset from the first-declared member, in bits.
    pub(crate) offset_bits: u32,
    pub(crate) adapter: Option<Arc<dyn BitsAdapter>>,
}

impl BitMember {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scalar(&self) -> ValueType {
        self.scalar
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Shift of this member inside the container word for the given byte
    /// order.
    pub(crate) fn shift(&self, container_bits: u32, endian: Endianness) -> u32 {
        match endian {
            Endianness::Little => self.offset_bits,
            Endianness::Big => container_bits - self.offset_bits - self.width,
        }
    }
}

/// A packed run of bit-fields occupying one container.
#[derive(Debug, Clone)]
pub struct BitGroup {
    members: Vec<BitMember>,
    size: usize,
}

impl BitGroup {
    /// Assigns running offsets, sizes the container, and checks the 64-bit
    /// cap. `path` names the first member for error messages.
    pub(crate) fn build(path: &str, mut members: Vec<BitMember>) -> Result<BitGroup> {
        let mut running = 0u32;
        for member in &mut members {
            member.offset_bits = running;
            running += member.width;
        }
        if running > 64 {
            return Err(SchemaError::GroupTooWide {
                path: path.to_owned(),
                bits: running,
            });
        }
        let size = round_container(running.div_ceil(8) as usize);
        Ok(BitGroup { members, size })
    }

    pub fn members(&self) -> &[BitMember] {
        &self.members
    }

    /// Container size in bytes: 1, 2, 4, or 8.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn container_bits(&self) -> u32 {
        self.size as u32 * 8
    }

    /// Unsigned scalar matching the container, the type a text back end
    /// declares for the group's scratch word.
    pub fn container_scalar(&self) -> ValueType {
        match self.size {
            1 => ValueType::U8,
            2 => ValueType::U16,
            4 => ValueType::U32,
            _ => ValueType::U64,
        }
    }

    /// Bit offset of member `index` under the given byte order.
    pub fn bit_offset(&self, index: usize, endian: Endianness) -> u32 {
        self.members[index].shift(self.container_bits(), endian)
    }
}

/// Rounds a content byte count up to the next container size.
fn round_container(bytes: usize) -> usize {
    match bytes {
        0..=1 => 1,
        2 => 2,
        3..=4 => 4,
        _ => 8,
    }
}

/// Replaces runs of bit-fields in `fields` with packed group fields.
///
/// Runs break at any non-bit field and wherever the 64-bit cap would be
/// exceeded; the field that does not fit becomes the first member of the
/// next group.
pub(crate) fn pack_groups(struct_name: &str, fields: Vec<Field>) -> Result<Vec<Field>> {
    let mut out = Vec::with_capacity(fields.len());
    let mut open: Vec<BitMember> = Vec::new();
    let mut open_bits = 0u32;

    for field in fields {
        match field.kind {
            FieldKind::Bits(decl) => {
                if !open.is_empty() && open_bits + decl.width > 64 {
                    out.push(close_group(struct_name, std::mem::take(&mut open))?);
                    open_bits = 0;
                }
                open_bits += decl.width;
                open.push(BitMember {
                    name: field.name,
                    scalar: decl.scalar,
                    width: decl.width,
                    offset_bits: 0,
                    adapter: decl.adapter,
                });
            }
            _ => {
                if !open.is_empty() {
                    out.push(close_group(struct_name, std::mem::take(&mut open))?);
                    open_bits = 0;
                }
                out.push(field);
            }
        }
    }
    if !open.is_empty() {
        out.push(close_group(struct_name, open)?);
    }
    Ok(out)
}

fn close_group(struct_name: &str, members: Vec<BitMember>) -> Result<Field> {
    let path = format!("{}.{}", struct_name, members[0].name);
    let group = BitGroup::build(&path, members)?;
    let size = group.size();
    let mut field = Field::anonymous(FieldKind::Group(Arc::new(group)));
    field.size = size;
    Ok(field)
}

/// Mask covering the low `width` bits. `width` is 1..=64.
pub(crate) fn mask(width: u32) -> u64 {
    u64::MAX >> (64 - width)
}

/// Two's-complement sign extension of the low `width` bits of `value`:
/// shift into the sign position, arithmetic-shift back.
pub(crate) fn sign_extend(value: u64, width: u32) -> i64 {
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

/// The alternative formula: flip the sign bit, then subtract it. Kept to
/// prove the two are bit-identical; the executor uses [`sign_extend`].
#[cfg(test)]
pub(crate) fn sign_extend_xor(value: u64, width: u32) -> i64 {
    let masked = value & mask(width);
    let sign = 1u64 << (width - 1);
    (masked ^ sign).wrapping_sub(sign) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::{bits, field};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn widths_to_fields(widths: &[u32]) -> Vec<Field> {
        widths
            .iter()
            .enumerate()
            .map(|(i, w)| field(&format!("f{}", i), bits(ValueType::I64, *w)))
            .collect()
    }

    fn group_of(field: &Field) -> &BitGroup {
        match &field.kind {
            FieldKind::Group(group) => group,
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_grouping_splits_at_64_bits() {
        let packed = pack_groups("t", widths_to_fields(&[4, 10, 20, 30, 4, 1, 3])).unwrap();
        assert_eq!(packed.len(), 2);
        let first = group_of(&packed[0]);
        let second = group_of(&packed[1]);
        assert_eq!(first.members().len(), 4);
        assert_eq!(first.size(), 8);
        assert_eq!(second.members().len(), 3);
        assert_eq!(second.size(), 1);
        // The overflowing field opens the next group instead of vanishing.
        assert_eq!(second.members()[0].name(), "f4");
    }

    #[test]
    fn test_grouping_breaks_at_plain_fields() {
        let mut fields = widths_to_fields(&[3, 5]);
        fields.insert(1, field("mid", ValueType::U8));
        let packed = pack_groups("t", fields).unwrap();
        assert_eq!(packed.len(), 3);
        assert_eq!(group_of(&packed[0]).members().len(), 1);
        assert_eq!(packed[1].name(), "mid");
        assert_eq!(group_of(&packed[2]).members().len(), 1);
    }

    #[test]
    fn test_container_rounds_to_power_of_two_sizes() {
        let cases: Vec<(Vec<u32>, usize)> = vec![
            (vec![1], 1),
            (vec![4, 4], 1),
            (vec![4, 5], 2),
            (vec![8, 8, 1], 4),
            (vec![30, 3], 8),
            (vec![32, 32], 8),
        ];
        for (widths, expected) in cases {
            let packed = pack_groups("t", widths_to_fields(&widths)).unwrap();
            assert_eq!(packed.len(), 1, "{:?}", widths);
            assert_eq!(group_of(&packed[0]).size(), expected, "{:?}", widths);
        }
    }

    #[test]
    fn test_bit_offsets_per_endianness() {
        let packed = pack_groups("t", widths_to_fields(&[4, 10, 20, 30])).unwrap();
        let group = group_of(&packed[0]);
        let le: Vec<u32> = (0..4).map(|i| group.bit_offset(i, Endianness::Little)).collect();
        let be: Vec<u32> = (0..4).map(|i| group.bit_offset(i, Endianness::Big)).collect();
        assert_eq!(le, vec![0, 4, 14, 34]);
        assert_eq!(be, vec![60, 50, 30, 0]);
    }

    #[test]
    fn test_group_too_wide_is_reported() {
        let members = vec![
            BitMember {
                name: "a".into(),
                scalar: ValueType::U64,
                width: 64,
                offset_bits: 0,
                adapter: None,
            },
            BitMember {
                name: "b".into(),
                scalar: ValueType::U8,
                width: 1,
                offset_bits: 0,
                adapter: None,
            },
        ];
        match BitGroup::build("t.a", members) {
            Err(SchemaError::GroupTooWide { path, bits }) => {
                assert_eq!(path, "t.a");
                assert_eq!(bits, 65);
            }
            other => panic!("expected group-too-wide, got {:?}", other),
        }
    }

    #[test]
    fn test_mask_bounds() {
        assert_eq!(mask(1), 1);
        assert_eq!(mask(3), 0b111);
        assert_eq!(mask(64), u64::MAX);
    }

    #[test]
    fn test_sign_extension_values() {
        assert_eq!(sign_extend(0b111, 3), -1);
        assert_eq!(sign_extend(0b011, 3), 3);
        assert_eq!(sign_extend(0b100, 3), -4);
        assert_eq!(sign_extend(0x3FFE792E, 30), -100050);
        assert_eq!(sign_extend(mask(64), 64), -1);
    }

    #[test]
    fn test_sign_extension_formulas_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        for width in 1..=64u32 {
            let edges = [
                0u64,
                1,
                mask(width),
                mask(width) >> 1,
                1u64 << (width - 1),
            ];
            for v in edges {
                assert_eq!(sign_extend(v, width), sign_extend_xor(v, width), "w={}", width);
            }
            for _ in 0..200 {
                let v: u64 = rng.gen::<u64>() & mask(width);
                assert_eq!(sign_extend(v, width), sign_extend_xor(v, width), "w={}", width);
            }
        }
    }
}

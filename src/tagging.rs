//! Object model and tag decoding: primary tags, address regions, object
//! headers, and object-size derivation.
//!
//! Every managed value is a 64-bit tagged word. The low 3 bits are the
//! primary tag; for pointer tags the remaining 61 bits (low 3 bits masked
//! off) are the address. Within an address, two high bits select a region
//! and one bit records which half of a copying region (newspace/oldspace)
//! the address belongs to this cycle.

use crate::error::GcPanic;

pub const TAG_BITS: u32 = 3;
pub const TAG_MASK: u64 = 0b111;

/// Primary tag occupying the low 3 bits of every tagged word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryTag {
    Fixnum0 = 0,
    Cons = 1,
    Fixnum1 = 2,
    Object = 3,
    Character = 4,
    SingleFloat = 5,
    GcForward = 6,
    DxRootObject = 7,
}

impl PrimaryTag {
    pub fn from_bits(bits: u64) -> Self {
        match bits & TAG_MASK {
            0 => PrimaryTag::Fixnum0,
            1 => PrimaryTag::Cons,
            2 => PrimaryTag::Fixnum1,
            3 => PrimaryTag::Object,
            4 => PrimaryTag::Character,
            5 => PrimaryTag::SingleFloat,
            6 => PrimaryTag::GcForward,
            7 => PrimaryTag::DxRootObject,
            _ => unreachable!("3-bit mask yields 0..=7"),
        }
    }

    pub fn bits(self) -> u64 {
        self as u64
    }

    /// True iff this tag never denotes a pointer (fixnum, character, float).
    pub fn is_immediate(self) -> bool {
        matches!(
            self,
            PrimaryTag::Fixnum0 | PrimaryTag::Fixnum1 | PrimaryTag::Character | PrimaryTag::SingleFloat
        )
    }
}

/// A 64-bit managed value. Newtype so tag decoding can't be confused with
/// raw address arithmetic by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedWord(pub u64);

impl TaggedWord {
    pub fn new(bits: u64) -> Self {
        TaggedWord(bits)
    }

    pub fn tag(self) -> PrimaryTag {
        PrimaryTag::from_bits(self.0)
    }

    /// §4.1 `immediatep`.
    pub fn is_immediate(self) -> bool {
        self.tag().is_immediate()
    }

    /// §4.1 `pointer_field` — the address with the tag bits masked off.
    pub fn pointer_field(self) -> usize {
        (self.0 & !TAG_MASK) as usize
    }

    /// Rebuild a tagged word from an address and a primary tag.
    pub fn from_address(addr: usize, tag: PrimaryTag) -> Self {
        TaggedWord((addr as u64 & !TAG_MASK) | tag.bits())
    }
}

/// Which logical region an address falls in. General/Cons are classified
/// by range against the reserved copying windows; Pinned covers both the
/// wired and pinned mark-sweep areas (the object header's pinned mark bit
/// applies uniformly to both, per §3); anything else is assumed to be a
/// raw stack address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRegion {
    General,
    Cons,
    Pinned,
    Stack,
}

fn within(addr: usize, base: usize, size: usize) -> bool {
    addr >= base && addr < base + size
}

/// §4.1 `address_tag` — classify an address by which reserved region
/// contains it.
pub fn address_tag(addr: usize, config: &crate::config::GcConfig) -> AddressRegion {
    if within(addr, config.general_base, config.general_area_limit * 2) {
        AddressRegion::General
    } else if within(addr, config.cons_base, config.cons_area_limit * 2) {
        AddressRegion::Cons
    } else if within(addr, config.wired_base, config.wired_size)
        || within(addr, config.pinned_base, config.pinned_size)
    {
        AddressRegion::Pinned
    } else {
        AddressRegion::Stack
    }
}

/// §3 "One bit of the address is the newspace/oldspace flag": which half
/// of a `region_base`-relative, `area_limit`-sized copying window `offset`
/// falls in, compared against the current `dynamic_mark_bit`.
pub fn is_newspace_offset(offset: usize, area_limit: usize, dynamic_mark_bit: u8) -> bool {
    ((offset / area_limit) & 1) as u8 == dynamic_mark_bit
}

/// Base address of the newspace half of a copying window this cycle.
pub fn newspace_base(region_base: usize, area_limit: usize, dynamic_mark_bit: u8) -> usize {
    region_base + dynamic_mark_bit as usize * area_limit
}

/// Base address of the oldspace half of a copying window this cycle.
pub fn oldspace_base(region_base: usize, area_limit: usize, dynamic_mark_bit: u8) -> usize {
    region_base + (1 - dynamic_mark_bit as usize % 2) * area_limit
}

// --- Object header -------------------------------------------------------

const OBJ_TYPE_BITS: u32 = 6;
const OBJ_TYPE_MASK: u64 = (1 << OBJ_TYPE_BITS) - 1;
const PINNED_MARK_BIT_POS: u32 = 6;
const PINNED_MARK_MASK: u64 = 1 << PINNED_MARK_BIT_POS;
const DATA_SHIFT: u32 = 7;
const DATA_BITS: u32 = 56;
const DATA_MASK: u64 = ((1u64 << DATA_BITS) - 1) << DATA_SHIFT;

/// §4.1 `object_tag` — the 6-bit object-type tag of a header word.
pub fn object_tag(header: u64) -> u8 {
    (header & OBJ_TYPE_MASK) as u8
}

/// §4.1 `object_header_data` — the 56-bit data field of a header word.
pub fn object_header_data(header: u64) -> u64 {
    (header & DATA_MASK) >> DATA_SHIFT
}

pub fn with_header_data(header: u64, data: u64) -> u64 {
    (header & !DATA_MASK) | ((data << DATA_SHIFT) & DATA_MASK)
}

/// §3 "pinned mark bit alternates each cycle ... header bit equals current
/// global".
pub fn pinned_mark_bit(header: u64) -> u8 {
    ((header & PINNED_MARK_MASK) >> PINNED_MARK_BIT_POS) as u8
}

pub fn with_pinned_mark_bit(header: u64, bit: u8) -> u64 {
    if bit & 1 != 0 {
        header | PINNED_MARK_MASK
    } else {
        header & !PINNED_MARK_MASK
    }
}

/// The 6-bit object-type tag, named per spec.md §3's type list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    ReferenceArray = 0,
    NumericArray = 1,
    SimpleArray = 2,
    SimpleString = 3,
    Symbol = 4,
    StructureInstance = 5,
    StandardInstance = 6,
    FunctionReference = 7,
    Function = 8,
    Bignum = 9,
    DoubleFloat = 10,
    Complex = 11,
    Ratio = 12,
    SimdVector = 13,
    Thread = 14,
    WeakPointer = 15,
    FreelistEntry = 16,
    UnboundValue = 17,
    /// Header type for a pinned-area cons cell (§4.6: "For a cons, the
    /// header is at `addr - 16`"). Never appears under the `cons` primary
    /// tag in the copying heap, where conses have no header at all.
    PinnedCons = 18,
}

impl ObjectType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        use ObjectType::*;
        Some(match tag {
            0 => ReferenceArray,
            1 => NumericArray,
            2 => SimpleArray,
            3 => SimpleString,
            4 => Symbol,
            5 => StructureInstance,
            6 => StandardInstance,
            7 => FunctionReference,
            8 => Function,
            9 => Bignum,
            10 => DoubleFloat,
            11 => Complex,
            12 => Ratio,
            13 => SimdVector,
            14 => Thread,
            15 => WeakPointer,
            16 => FreelistEntry,
            17 => UnboundValue,
            18 => PinnedCons,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Leaf types carry no reference slots (§4.3's last bullet). `SimpleArray`
    /// is not a leaf: its 4 metadata slots (e.g. a displaced-to base array)
    /// are scanned.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            ObjectType::NumericArray
                | ObjectType::Bignum
                | ObjectType::DoubleFloat
                | ObjectType::SimdVector
                | ObjectType::UnboundValue
        )
    }
}

/// Numeric-array element width, packed into the low 8 bits of the header
/// data field (the remaining 48 bits hold the element count). This sub-field
/// split is an implementation choice: spec.md says only that the data field
/// "depends on the type"; see DESIGN.md for the layout decision record.
#[derive(Debug, Clone, Copy)]
pub struct NumericArrayData {
    pub element_bits: u32,
    pub length: u64,
}

pub fn decode_numeric_array(data: u64) -> NumericArrayData {
    const WIDTHS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];
    let code = (data & 0xFF) as usize;
    let element_bits = WIDTHS[code.min(WIDTHS.len() - 1)];
    NumericArrayData {
        element_bits,
        length: data >> 8,
    }
}

pub fn encode_numeric_array(element_bits: u32, length: u64) -> u64 {
    const WIDTHS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];
    let code = WIDTHS.iter().position(|&w| w == element_bits).unwrap_or(6) as u64;
    (length << 8) | code
}

/// Function header sub-fields packed into the 56-bit data field: machine
/// code size in bytes (24 bits), constant-pool length in words (16 bits),
/// gc-info size in bytes (16 bits). 24 + 16 + 16 = 56.
#[derive(Debug, Clone, Copy)]
pub struct FunctionHeaderData {
    pub mc_size_bytes: u32,
    pub pool_length_words: u32,
    pub gc_info_size_bytes: u32,
}

pub fn decode_function_header(data: u64) -> FunctionHeaderData {
    FunctionHeaderData {
        mc_size_bytes: (data & 0xFF_FFFF) as u32,
        pool_length_words: ((data >> 24) & 0xFFFF) as u32,
        gc_info_size_bytes: ((data >> 40) & 0xFFFF) as u32,
    }
}

/// §3 "Size derivation" + §4.3's slot counts (used to reconcile fixed-size
/// types: the parenthetical numbers in spec.md §3 are read as the object's
/// data-slot count, consistent with the slot counts of §4.3 for the same
/// types; total size is 1 (header) + that count). See DESIGN.md.
pub fn object_size(object_type: ObjectType, header_data: u64) -> usize {
    use ObjectType::*;
    match object_type {
        ReferenceArray | StructureInstance => 1 + header_data as usize,
        NumericArray => {
            let d = decode_numeric_array(header_data);
            let total_bits = d.length * d.element_bits as u64;
            1 + ((total_bits + 63) / 64) as usize
        }
        Bignum => 1 + header_data as usize,
        SimpleString => 1 + header_data as usize,
        Symbol => 1 + 6,
        StandardInstance | FunctionReference => 1 + 4,
        Complex | Ratio => 1 + 3,
        SimpleArray => 1 + 4,
        Function => {
            let f = decode_function_header(header_data);
            let total_bytes =
                f.mc_size_bytes as u64 + (f.pool_length_words as u64 * 8) + f.gc_info_size_bytes as u64;
            ((total_bytes + 7) / 8) as usize
        }
        DoubleFloat => 1 + 1,
        SimdVector => 1 + 2,
        Thread => 1 + 512,
        WeakPointer => 1 + 6,
        UnboundValue => 1 + 2,
        FreelistEntry => header_data as usize,
        // header(1) + pad(1) + car(1) + cdr(1), per §4.6's `addr - 16`.
        PinnedCons => 4,
    }
}

/// Reads an object's header and computes its size, panicking per §4.1's
/// "Errors: transport-error / scan-error on an unrecognized object tag
/// (fatal, triggers panic)".
///
/// # Safety
/// `header_addr` must point to a valid, live header word.
pub unsafe fn object_size_at(header_addr: usize) -> usize {
    let header = *(header_addr as *const u64);
    let tag = object_tag(header);
    let ty = ObjectType::from_tag(tag).unwrap_or_else(|| {
        GcPanic::unrecognized_object_tag(tag, header_addr);
    });
    object_size(ty, object_header_data(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for t in [
            PrimaryTag::Fixnum0,
            PrimaryTag::Cons,
            PrimaryTag::Fixnum1,
            PrimaryTag::Object,
            PrimaryTag::Character,
            PrimaryTag::SingleFloat,
            PrimaryTag::GcForward,
            PrimaryTag::DxRootObject,
        ] {
            let w = TaggedWord::from_address(0x1000, t);
            assert_eq!(w.tag(), t);
            assert_eq!(w.pointer_field(), 0x1000);
        }
    }

    #[test]
    fn immediates() {
        assert!(PrimaryTag::Fixnum0.is_immediate());
        assert!(PrimaryTag::Fixnum1.is_immediate());
        assert!(PrimaryTag::Character.is_immediate());
        assert!(PrimaryTag::SingleFloat.is_immediate());
        assert!(!PrimaryTag::Cons.is_immediate());
        assert!(!PrimaryTag::Object.is_immediate());
    }

    #[test]
    fn newspace_half_flip() {
        let limit = 0x1000;
        assert!(is_newspace_offset(0x500, limit, 0));
        assert!(!is_newspace_offset(0x500, limit, 1));
        assert!(is_newspace_offset(0x1500, limit, 1));
        assert!(!is_newspace_offset(0x1500, limit, 0));
    }

    #[test]
    fn address_region_classification() {
        let config = crate::config::GcConfig::default();
        assert_eq!(address_tag(config.general_base, &config), AddressRegion::General);
        assert_eq!(address_tag(config.cons_base, &config), AddressRegion::Cons);
        assert_eq!(address_tag(config.wired_base, &config), AddressRegion::Pinned);
        assert_eq!(address_tag(config.pinned_base, &config), AddressRegion::Pinned);
        assert_eq!(address_tag(0xdead_0000, &config), AddressRegion::Stack);
    }

    #[test]
    fn header_data_roundtrip() {
        let h = with_header_data(0, 0xABCDE);
        assert_eq!(object_header_data(h), 0xABCDE);
        let h2 = with_pinned_mark_bit(h, 1);
        assert_eq!(pinned_mark_bit(h2), 1);
        assert_eq!(object_header_data(h2), 0xABCDE);
    }

    #[test]
    fn sizes() {
        assert_eq!(object_size(ObjectType::ReferenceArray, 4), 5);
        assert_eq!(object_size(ObjectType::Symbol, 0), 7);
        assert_eq!(object_size(ObjectType::Thread, 0), 513);
        assert_eq!(object_size(ObjectType::UnboundValue, 0), 3);
        let na = encode_numeric_array(8, 10);
        assert_eq!(object_size(ObjectType::NumericArray, na), 1 + 2);
    }
}

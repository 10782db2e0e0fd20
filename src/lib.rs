//! A dual-representation library for JSON-compatible structured data.
//!
//! Values live in one of two forms:
//!
//! - the **heap form**: a mutable, reference-counted tree, used while
//!   building and editing;
//! - the **flat form**: an immutable, alignment-correct, little-endian byte
//!   buffer that supports keyed lookup, indexing, and iteration directly on
//!   the bytes, with no parsing step and no allocation.
//!
//! [Packet] is the user-facing handle and can hold either form;
//! [Packet::finalize] turns a heap tree into a flat buffer and
//! [Packet::lift] goes the other way. Finalization is canonical: two equal
//! trees produce byte-identical buffers, whatever order their keys were
//! inserted in.
//!
//! # Examples
//!
//! Build a message, flatten it, and read it back without parsing:
//!
//! ```
//! use wirepack::Packet;
//!
//! let mut msg = Packet::object();
//! msg.insert("hello", "world").unwrap();
//! msg.insert("pi", 3.14159).unwrap();
//!
//! // One contiguous allocation; readable in place.
//! let flat = msg.finalize().unwrap();
//! assert!(flat.is_finalized());
//! assert_eq!(flat.get("hello").unwrap().as_str().unwrap(), "world");
//! assert_eq!(flat.get("pi").unwrap().as_decimal().unwrap(), 3.14159);
//!
//! // The bytes interoperate with any conforming implementation.
//! let wire = flat.bytes().unwrap().to_vec();
//! let received = Packet::from_bytes(&wire).unwrap();
//! assert_eq!(received, msg);
//! ```
use std::cmp::Ordering;
use std::fmt;

use strum_macros::EnumIter;

mod buffer;
mod error;
mod finalize;
mod heap;
mod iter;
mod json;
mod lift;
mod packet;
mod rc;
mod validate;

pub use error::{Error, Result};
pub use iter::{Entries, Keys, Members};
pub use packet::{
    Arg, ArrayBuilder, BasicArrayBuilder, BasicObjectBuilder, BasicPacket, LocalPacket,
    ObjectBuilder, Packet,
};
pub use rc::{RcKind, ThreadLocal, ThreadSafe};
pub use validate::{validate_bytes, validate_bytes_as};

/// The user-visible kind of a value.
///
/// Every value is exactly one of these seven kinds, whichever form it is
/// in. The wire encoding internally distinguishes more granular
/// [raw types](RawType), but those only encode precision and size; they all
/// map back onto one of these kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum Kind {
    Object,
    Array,
    String,
    Integer,
    Decimal,
    Boolean,
    Null,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Decimal => "decimal",
            Kind::Boolean => "boolean",
            Kind::Null => "null",
        };
        write!(f, "{}", name)
    }
}

/// The layout-level type of a value in the flat form.
///
/// Raw types carry the information the wire needs beyond the [Kind]:
/// integer width, decimal precision, and which string length encoding is in
/// use. The finalizer always picks the narrowest raw type that losslessly
/// represents the value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum RawType {
    /// Aggregate of (key, value) pairs; see the object layout
    Object,
    /// Aggregate of positional elements; see the array layout
    Array,
    /// String with a 16-bit length
    String,
    /// String with an 8-bit length (≤ 255 bytes)
    SmallString,
    /// String with a 32-bit length (> 65 535 bytes)
    BigString,
    /// i16
    ShortInteger,
    /// i32
    Integer,
    /// i64
    LongInteger,
    /// f32
    Decimal,
    /// f64
    LongDecimal,
    /// One byte, 0 or 1
    Boolean,
    /// No payload at all
    Null,
}

impl RawType {
    /// The tag byte used for this raw type in vtable entries.
    pub fn tag_byte(&self) -> u8 {
        match self {
            RawType::Object => 0,
            RawType::Array => 1,
            RawType::String => 2,
            RawType::SmallString => 3,
            RawType::BigString => 4,
            RawType::ShortInteger => 5,
            RawType::Integer => 6,
            RawType::LongInteger => 7,
            RawType::Decimal => 8,
            RawType::LongDecimal => 9,
            RawType::Boolean => 10,
            RawType::Null => 11,
        }
    }

    /// Decode a tag byte; `None` for tags no raw type uses.
    pub fn from_tag_byte(tag: u8) -> Option<RawType> {
        let raw = match tag {
            0 => RawType::Object,
            1 => RawType::Array,
            2 => RawType::String,
            3 => RawType::SmallString,
            4 => RawType::BigString,
            5 => RawType::ShortInteger,
            6 => RawType::Integer,
            7 => RawType::LongInteger,
            8 => RawType::Decimal,
            9 => RawType::LongDecimal,
            10 => RawType::Boolean,
            11 => RawType::Null,
            _ => return None,
        };
        Some(raw)
    }

    /// The natural alignment of this raw type's payload. Every payload in a
    /// flat buffer starts on a multiple of its raw type's alignment.
    pub fn alignment(&self) -> usize {
        match self {
            RawType::Object | RawType::Array => 8,
            RawType::String => 2,
            RawType::SmallString => 1,
            RawType::BigString => 4,
            RawType::ShortInteger => 2,
            RawType::Integer => 4,
            RawType::LongInteger => 8,
            RawType::Decimal => 4,
            RawType::LongDecimal => 8,
            RawType::Boolean | RawType::Null => 1,
        }
    }

    /// Collapse the layout-level type back to the user-visible kind.
    pub fn kind(&self) -> Kind {
        match self {
            RawType::Object => Kind::Object,
            RawType::Array => Kind::Array,
            RawType::String | RawType::SmallString | RawType::BigString => Kind::String,
            RawType::ShortInteger | RawType::Integer | RawType::LongInteger => Kind::Integer,
            RawType::Decimal | RawType::LongDecimal => Kind::Decimal,
            RawType::Boolean => Kind::Boolean,
            RawType::Null => Kind::Null,
        }
    }

    /// The narrowest integer raw type that holds `val`.
    pub fn for_integer(val: i64) -> RawType {
        if val >= i16::min_value() as i64 && val <= i16::max_value() as i64 {
            RawType::ShortInteger
        } else if val >= i32::min_value() as i64 && val <= i32::max_value() as i64 {
            RawType::Integer
        } else {
            RawType::LongInteger
        }
    }

    /// `Decimal` when `val` survives a round trip through f32 bit-exactly
    /// (NaN never does), `LongDecimal` otherwise.
    pub fn for_decimal(val: f64) -> RawType {
        if (val as f32) as f64 == val {
            RawType::Decimal
        } else {
            RawType::LongDecimal
        }
    }

    /// The string raw type for a payload of `len` bytes. A pure function of
    /// the length, so re-finalizing a lifted buffer reproduces it exactly.
    pub fn for_string(len: usize) -> RawType {
        if len > u16::max_value() as usize {
            RawType::BigString
        } else if len > u8::max_value() as usize {
            RawType::String
        } else {
            RawType::SmallString
        }
    }
}

/// The total order object keys are stored and searched in: shorter keys
/// sort first; keys of equal length compare bytewise.
///
/// Flat-form objects keep their vtables sorted by this order so lookups can
/// binary search, and the heap form stores fields in the same order so the
/// two forms iterate identically.
pub fn canonical_cmp(lhs: &str, rhs: &str) -> Ordering {
    lhs.len()
        .cmp(&rhs.len())
        .then_with(|| lhs.as_bytes().cmp(rhs.as_bytes()))
}

/// Allow iterating over enum variants for enums that have `#[derive(EnumIter)]`.
///
/// Wrapper around `strum`'s `IntoEnumIter` so that users don't need to know about `strum`
pub trait EnumIterable {
    type Iterator: Iterator<Item = Self>;

    fn iter() -> Self::Iterator;
}

impl<T: strum::IntoEnumIterator> EnumIterable for T {
    type Iterator = T::Iterator;

    fn iter() -> Self::Iterator {
        T::iter()
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;

    #[test]
    fn tag_bytes_round_trip() {
        for raw in <RawType as EnumIterable>::iter() {
            assert_eq!(RawType::from_tag_byte(raw.tag_byte()), Some(raw));
        }
        assert_eq!(RawType::from_tag_byte(12), None);
        assert_eq!(RawType::from_tag_byte(0xFF), None);
    }

    #[test]
    fn canonical_order_is_length_then_bytes() {
        assert_eq!(canonical_cmp("pi", "hello"), Ordering::Less);
        assert_eq!(canonical_cmp("b", "aa"), Ordering::Less);
        assert_eq!(canonical_cmp("abc", "abd"), Ordering::Less);
        assert_eq!(canonical_cmp("same", "same"), Ordering::Equal);
        assert_eq!(canonical_cmp("zz", "z"), Ordering::Greater);
        assert_eq!(canonical_cmp("", "a"), Ordering::Less);
    }

    #[test]
    fn scalars_identify_minimal_raw_types() {
        assert_eq!(RawType::for_integer(0), RawType::ShortInteger);
        assert_eq!(
            RawType::for_integer(i64::from(i16::max_value())),
            RawType::ShortInteger
        );
        assert_eq!(
            RawType::for_integer(i64::from(i16::max_value()) + 1),
            RawType::Integer
        );
        assert_eq!(
            RawType::for_integer(i64::from(i32::min_value())),
            RawType::Integer
        );
        assert_eq!(
            RawType::for_integer(i64::from(i32::min_value()) - 1),
            RawType::LongInteger
        );

        assert_eq!(RawType::for_decimal(1.5), RawType::Decimal);
        assert_eq!(RawType::for_decimal(0.1), RawType::LongDecimal);
        assert_eq!(RawType::for_decimal(f64::NAN), RawType::LongDecimal);

        assert_eq!(RawType::for_string(0), RawType::SmallString);
        assert_eq!(RawType::for_string(255), RawType::SmallString);
        assert_eq!(RawType::for_string(256), RawType::String);
        assert_eq!(RawType::for_string(65_535), RawType::String);
        assert_eq!(RawType::for_string(65_536), RawType::BigString);
    }
}

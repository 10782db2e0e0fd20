//! Vtable entry codecs.
//!
//! Every flat aggregate starts with an 8-byte header followed by one 8-byte
//! vtable entry per child. Array entries carry `(offset, raw type)`; object
//! entries additionally carry the first bytes of the key so lookups can
//! usually decide a comparison without touching the key itself.

use std::cmp::Ordering;
use std::marker;

use nom::number::complete as number;

use crate::RawType;

/// Size of the `total_bytes` + `count` header of an aggregate.
pub(crate) const HEADER_BYTES: usize = 8;

/// Size of one vtable entry, object or array alike.
pub(crate) const ENTRY_BYTES: usize = 8;

/// Common shape of the two vtable entry layouts.
pub(crate) trait TableEntry: Sized {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self>;
}

fn raw_type(input: &[u8]) -> nom::IResult<&[u8], RawType> {
    let (input, tag) = number::le_u8(input)?;
    match RawType::from_tag_byte(tag) {
        Some(raw) => Ok((input, raw)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

/// `[ u32 offset ][ u8 raw_type ][ 3 reserved bytes ]`
#[derive(Copy, Clone, Debug)]
pub(crate) struct ArrayEntry {
    /// Offset of the element payload from the array start.
    pub offset: u32,
    /// Raw type of the element.
    pub raw: RawType,
}

impl TableEntry for ArrayEntry {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], ArrayEntry> {
        let (input, offset) = number::le_u32(input)?;
        let (input, raw) = raw_type(input)?;
        let (input, _reserved) = nom::bytes::complete::take(3_usize)(input)?;

        Ok((input, ArrayEntry { offset, raw }))
    }
}

/// `[ u32 offset ][ u8 raw_type ][ u8 prefix_len ][ 2 prefix bytes ]`
///
/// `offset` points at the pair's key string; the value sits at the first
/// properly aligned offset past the key. `prefix` holds the first
/// `prefix_len` (≤ 2) bytes of the key, stored first-byte-first.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ObjectEntry {
    pub offset: u32,
    /// Raw type of the pair's value.
    pub raw: RawType,
    pub prefix_len: u8,
    pub prefix: [u8; 2],
}

impl TableEntry for ObjectEntry {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], ObjectEntry> {
        let (input, offset) = number::le_u32(input)?;
        let (input, raw) = raw_type(input)?;
        let (input, prefix_len) = number::le_u8(input)?;
        let (input, prefix) = nom::bytes::complete::take(2_usize)(input)?;

        Ok((
            input,
            ObjectEntry {
                offset,
                raw,
                prefix_len,
                prefix: [prefix[0], prefix[1]],
            },
        ))
    }
}

impl ObjectEntry {
    /// Compare the stored prefix against the needle's leading bytes.
    ///
    /// Only meaningful once the key lengths are known to be equal; the
    /// result is definitive for keys of ≤ 2 bytes, otherwise `Equal` just
    /// means the full key has to be consulted.
    pub fn prefix_cmp(&self, needle: &[u8]) -> Ordering {
        let shared = (self.prefix_len as usize).min(needle.len());
        self.prefix[..shared].cmp(&needle[..shared])
    }
}

pub(crate) fn encode_array_entry(offset: u32, raw: RawType) -> [u8; ENTRY_BYTES] {
    let mut out = [0_u8; ENTRY_BYTES];
    out[..4].copy_from_slice(&offset.to_le_bytes());
    out[4] = raw.tag_byte();
    out
}

pub(crate) fn encode_object_entry(offset: u32, raw: RawType, key: &str) -> [u8; ENTRY_BYTES] {
    let key = key.as_bytes();
    let prefix_len = key.len().min(2);

    let mut out = [0_u8; ENTRY_BYTES];
    out[..4].copy_from_slice(&offset.to_le_bytes());
    out[4] = raw.tag_byte();
    out[5] = prefix_len as u8;
    out[6..6 + prefix_len].copy_from_slice(&key[..prefix_len]);
    out
}

/// Common "iterate over n vtable entries" pattern.
pub(crate) struct Entries<'a, E: TableEntry> {
    remaining: &'a [u8],
    num_remaining: u32,
    phantom: marker::PhantomData<E>,
}

impl<'a, E: TableEntry> Entries<'a, E> {
    pub fn new(remaining: &'a [u8], num_remaining: u32) -> Entries<'a, E> {
        Entries {
            remaining,
            num_remaining,
            phantom: marker::PhantomData,
        }
    }
}

impl<'a, E: TableEntry> Iterator for Entries<'a, E> {
    type Item = Result<E, nom::Err<nom::error::Error<&'a [u8]>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_remaining == 0 {
            return None;
        }

        match E::parse(self.remaining) {
            Ok((input, entry)) => {
                self.remaining = input;
                self.num_remaining -= 1;
                Some(Ok(entry))
            }
            Err(e) => {
                self.num_remaining = 0;
                Some(Err(e))
            }
        }
    }
}

//! Heap → flat conversion.
//!
//! A single sizing pass computes an upper bound on the bytes required
//! (assuming worst-case padding everywhere), one aligned region of that
//! bound is allocated, and a recursive layout pass writes the canonical
//! encoding into it. The output is deterministic: equal trees produce
//! byte-identical buffers, because object fields are already held in
//! canonical key order and every scalar gets its minimal raw type.

use crate::buffer::table::{encode_array_entry, encode_object_entry, ENTRY_BYTES, HEADER_BYTES};
use crate::buffer::{align_up, Region};
use crate::error::{Error, Result};
use crate::heap::Node;
use crate::rc::RcKind;
use crate::RawType;

/// Serialize `root` into a fresh 8-aligned region trimmed to the bytes
/// actually written.
pub(crate) fn finalize<K: RcKind>(root: &Node<K>) -> Result<Region> {
    let bound = max_bytes(root);
    if bound > u32::max_value() as usize {
        return Err(Error::Runtime(format!(
            "value needs up to {} bytes, more than the wire format can address",
            bound
        )));
    }

    let mut region = Region::try_zeroed(bound)?;
    let total = lay_out(region.bytes_mut(), 0, root);
    region.truncate(total);
    Ok(region)
}

/// Worst-case padding in front of any value.
const PAD_SLACK: usize = 7;

/// Upper bound on the bytes `node` can occupy, padding included.
fn max_bytes<K: RcKind>(node: &Node<K>) -> usize {
    match node {
        Node::Null => 0,
        Node::Boolean(_) => 1,
        Node::Integer(_) | Node::Decimal(_) => 8,
        Node::String(s) => 4 + s.len() + 1,
        Node::Array(elems) => {
            let mut bound = HEADER_BYTES + elems.len() * ENTRY_BYTES;
            for child in elems {
                bound += PAD_SLACK + max_bytes(&**child);
            }
            bound
        }
        Node::Object(fields) => {
            let mut bound = HEADER_BYTES + fields.len() * ENTRY_BYTES;
            for (key, child) in fields {
                bound += 1 + 2 + key.as_str().len() + 1;
                bound += PAD_SLACK + max_bytes(&**child);
            }
            bound
        }
    }
}

/// Write `node` at `at` (already aligned for its raw type) and return the
/// number of payload bytes written.
fn lay_out<K: RcKind>(buf: &mut [u8], at: usize, node: &Node<K>) -> usize {
    match node {
        Node::Null => 0,
        Node::Boolean(val) => {
            buf[at] = *val as u8;
            1
        }
        Node::Integer(val) => match RawType::for_integer(*val) {
            RawType::ShortInteger => {
                buf[at..at + 2].copy_from_slice(&(*val as i16).to_le_bytes());
                2
            }
            RawType::Integer => {
                buf[at..at + 4].copy_from_slice(&(*val as i32).to_le_bytes());
                4
            }
            _ => {
                buf[at..at + 8].copy_from_slice(&val.to_le_bytes());
                8
            }
        },
        Node::Decimal(val) => match RawType::for_decimal(*val) {
            RawType::Decimal => {
                buf[at..at + 4].copy_from_slice(&(*val as f32).to_le_bytes());
                4
            }
            _ => {
                buf[at..at + 8].copy_from_slice(&val.to_le_bytes());
                8
            }
        },
        Node::String(s) => write_string(buf, at, s.as_str()),
        Node::Array(elems) => {
            let count = elems.len();
            let vtable = at + HEADER_BYTES;
            let mut cursor = at + HEADER_BYTES + count * ENTRY_BYTES;

            for (idx, child) in elems.iter().enumerate() {
                let raw = child.raw_type();
                cursor = align_up(cursor, raw.alignment());

                let entry = encode_array_entry((cursor - at) as u32, raw);
                buf[vtable + idx * ENTRY_BYTES..vtable + (idx + 1) * ENTRY_BYTES]
                    .copy_from_slice(&entry);

                cursor += lay_out(buf, cursor, &**child);
            }

            patch_header(buf, at, cursor - at, count);
            cursor - at
        }
        Node::Object(fields) => {
            let count = fields.len();
            let vtable = at + HEADER_BYTES;
            let mut cursor = at + HEADER_BYTES + count * ENTRY_BYTES;

            // BTreeMap iteration is already the canonical key order.
            for (idx, (key, child)) in fields.iter().enumerate() {
                cursor = align_up(cursor, RawType::String.alignment());
                let key_offset = (cursor - at) as u32;
                cursor += write_key(buf, cursor, key.as_str());

                let raw = child.raw_type();
                cursor = align_up(cursor, raw.alignment());

                let entry = encode_object_entry(key_offset, raw, key.as_str());
                buf[vtable + idx * ENTRY_BYTES..vtable + (idx + 1) * ENTRY_BYTES]
                    .copy_from_slice(&entry);

                cursor += lay_out(buf, cursor, &**child);
            }

            patch_header(buf, at, cursor - at, count);
            cursor - at
        }
    }
}

fn patch_header(buf: &mut [u8], at: usize, total: usize, count: usize) {
    buf[at..at + 4].copy_from_slice(&(total as u32).to_le_bytes());
    buf[at + 4..at + 8].copy_from_slice(&(count as u32).to_le_bytes());
}

/// Write a leaf string value with its length-chosen encoding.
fn write_string(buf: &mut [u8], at: usize, s: &str) -> usize {
    let len = s.len();
    let header = match RawType::for_string(len) {
        RawType::SmallString => {
            buf[at] = len as u8;
            1
        }
        RawType::String => {
            buf[at..at + 2].copy_from_slice(&(len as u16).to_le_bytes());
            2
        }
        _ => {
            buf[at..at + 4].copy_from_slice(&(len as u32).to_le_bytes());
            4
        }
    };

    buf[at + header..at + header + len].copy_from_slice(s.as_bytes());
    buf[at + header + len] = 0;
    header + len + 1
}

/// Object keys are always 16-bit-length strings.
fn write_key(buf: &mut [u8], at: usize, key: &str) -> usize {
    let len = key.len();
    buf[at..at + 2].copy_from_slice(&(len as u16).to_le_bytes());
    buf[at + 2..at + 2 + len].copy_from_slice(key.as_bytes());
    buf[at + 2 + len] = 0;
    2 + len + 1
}

//! Validation of untrusted buffers.
//!
//! [validate_bytes] decides whether a byte slice can be traversed by the
//! flat-form readers without any out-of-bounds access. Everything the
//! readers take for granted is checked here, recursively: bounds,
//! alignment, vtable consistency, string termination and UTF-8, canonical
//! key order (binary search is unsound without it), and prefix agreement.
//! Failures cite the offending offset.

use nom::number::complete as number;

use crate::buffer::align_up;
use crate::buffer::table::{ArrayEntry, Entries, ObjectEntry, ENTRY_BYTES, HEADER_BYTES};
use crate::error::{Error, Result};
use crate::{canonical_cmp, RawType};

/// Aggregates nested deeper than this are rejected outright so a crafted
/// buffer cannot blow the stack during validation or lifting.
const MAX_DEPTH: usize = 512;

/// Validate `bytes` as a flat buffer with an object root and return the
/// root's total size in bytes.
pub fn validate_bytes(bytes: &[u8]) -> Result<usize> {
    validate_bytes_as(RawType::Object, bytes)
}

/// Validate `bytes` as a flat buffer whose root has the declared raw type
/// and return the root's total size in bytes.
///
/// The wire format carries no root tag; whoever transports a buffer
/// transports its root type alongside.
pub fn validate_bytes_as(raw: RawType, bytes: &[u8]) -> Result<usize> {
    validate_value(bytes, 0, raw, bytes.len(), 0)
}

fn need(buf_at: usize, wanted: usize, limit: usize, what: &str) -> Result<()> {
    if buf_at + wanted > limit {
        return Err(Error::malformed(
            buf_at,
            format!(
                "{} needs {} bytes but only {} remain",
                what,
                wanted,
                limit.saturating_sub(buf_at)
            ),
        ));
    }
    Ok(())
}

/// Check the value of type `raw` at `at`, staying inside `limit`, and
/// return its size.
fn validate_value(buf: &[u8], at: usize, raw: RawType, limit: usize, depth: usize) -> Result<usize> {
    match raw {
        RawType::Null => Ok(0),
        RawType::Boolean => {
            need(at, 1, limit, "boolean")?;
            if buf[at] > 1 {
                return Err(Error::malformed(at, "boolean byte is neither 0 nor 1"));
            }
            Ok(1)
        }
        RawType::ShortInteger => need(at, 2, limit, "short integer").map(|_| 2),
        RawType::Integer => need(at, 4, limit, "integer").map(|_| 4),
        RawType::LongInteger => need(at, 8, limit, "long integer").map(|_| 8),
        RawType::Decimal => need(at, 4, limit, "decimal").map(|_| 4),
        RawType::LongDecimal => need(at, 8, limit, "long decimal").map(|_| 8),
        RawType::SmallString | RawType::String | RawType::BigString => {
            validate_string(buf, at, raw, limit)
        }
        RawType::Array => validate_array(buf, at, limit, depth),
        RawType::Object => validate_object(buf, at, limit, depth),
    }
}

fn validate_string(buf: &[u8], at: usize, raw: RawType, limit: usize) -> Result<usize> {
    let header = match raw {
        RawType::SmallString => 1,
        RawType::String => 2,
        RawType::BigString => 4,
        _ => unreachable!("not a string raw type"),
    };
    need(at, header, limit, "string length")?;

    let len = match raw {
        RawType::SmallString => buf[at] as usize,
        RawType::String => {
            let (_, len) = number::le_u16::<_, nom::error::Error<&[u8]>>(&buf[at..])
                .expect("length availability just checked");
            len as usize
        }
        _ => {
            let (_, len) = number::le_u32::<_, nom::error::Error<&[u8]>>(&buf[at..])
                .expect("length availability just checked");
            len as usize
        }
    };

    need(at, header + len + 1, limit, "string payload")?;
    if buf[at + header + len] != 0 {
        return Err(Error::malformed(
            at + header + len,
            "string payload is not NUL-terminated",
        ));
    }
    if std::str::from_utf8(&buf[at + header..at + header + len]).is_err() {
        return Err(Error::malformed(at + header, "string payload is not UTF-8"));
    }

    Ok(header + len + 1)
}

/// Read and sanity-check an aggregate header; returns `(total, count)`.
fn aggregate_header(buf: &[u8], at: usize, limit: usize) -> Result<(usize, usize)> {
    need(at, HEADER_BYTES, limit, "aggregate header")?;
    let (_, (total, count)) = header_fields(&buf[at..]).expect("header availability just checked");
    let (total, count) = (total as usize, count as usize);

    let vtable_end = count
        .checked_mul(ENTRY_BYTES)
        .and_then(|v| v.checked_add(HEADER_BYTES))
        .ok_or_else(|| Error::malformed(at + 4, "element count overflows the vtable size"))?;
    if vtable_end > total {
        return Err(Error::malformed(
            at + 4,
            format!(
                "vtable of {} entries does not fit the declared {} total bytes",
                count, total
            ),
        ));
    }
    need(at, total, limit, "aggregate payload")?;

    Ok((total, count))
}

fn header_fields(input: &[u8]) -> nom::IResult<&[u8], (u32, u32)> {
    let (input, total) = number::le_u32(input)?;
    let (input, count) = number::le_u32(input)?;
    Ok((input, (total, count)))
}

/// Check a child offset against its aggregate's extent and alignment.
fn check_offset(at: usize, offset: usize, raw: RawType, vtable_end: usize, total: usize) -> Result<()> {
    // null payloads are empty, so a trailing null may sit exactly at the end
    let end_ok = if raw == RawType::Null {
        offset <= total
    } else {
        offset < total
    };
    if offset < vtable_end || !end_ok {
        return Err(Error::malformed(
            at,
            format!(
                "vtable offset {} is outside the aggregate's payload range [{}, {})",
                offset, vtable_end, total
            ),
        ));
    }
    if offset % raw.alignment() != 0 {
        return Err(Error::malformed(
            at,
            format!(
                "vtable offset {} is misaligned for a value of alignment {}",
                offset,
                raw.alignment()
            ),
        ));
    }
    Ok(())
}

fn validate_array(buf: &[u8], at: usize, limit: usize, depth: usize) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(Error::malformed(at, "aggregates nested too deeply"));
    }
    let (total, count) = aggregate_header(buf, at, limit)?;
    let vtable_end = HEADER_BYTES + count * ENTRY_BYTES;

    let vtable = &buf[at + HEADER_BYTES..at + vtable_end];
    for (idx, parsed) in Entries::<ArrayEntry>::new(vtable, count as u32).enumerate() {
        let entry_at = at + HEADER_BYTES + idx * ENTRY_BYTES;
        let entry = parsed
            .map_err(|_| Error::malformed(entry_at, "vtable entry has an unknown raw type tag"))?;

        let offset = entry.offset as usize;
        check_offset(entry_at, offset, entry.raw, vtable_end, total)?;
        validate_value(buf, at + offset, entry.raw, at + total, depth + 1)?;
    }

    Ok(total)
}

fn validate_object(buf: &[u8], at: usize, limit: usize, depth: usize) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(Error::malformed(at, "aggregates nested too deeply"));
    }
    let (total, count) = aggregate_header(buf, at, limit)?;
    let vtable_end = HEADER_BYTES + count * ENTRY_BYTES;

    let vtable = &buf[at + HEADER_BYTES..at + vtable_end];
    let mut prev_key: Option<&str> = None;

    for (idx, parsed) in Entries::<ObjectEntry>::new(vtable, count as u32).enumerate() {
        let entry_at = at + HEADER_BYTES + idx * ENTRY_BYTES;
        let entry = parsed
            .map_err(|_| Error::malformed(entry_at, "vtable entry has an unknown raw type tag"))?;

        // the offset names the key, which is always a 16-bit-length string
        let offset = entry.offset as usize;
        check_offset(entry_at, offset, RawType::String, vtable_end, total)?;

        let key_at = at + offset;
        let key_size = validate_string(buf, key_at, RawType::String, at + total)?;
        let key_len = key_size - 2 - 1;
        let key = std::str::from_utf8(&buf[key_at + 2..key_at + 2 + key_len])
            .expect("key was validated as UTF-8");

        let prefix_len = key.len().min(2);
        if entry.prefix_len as usize != prefix_len
            || entry.prefix[..prefix_len] != key.as_bytes()[..prefix_len]
        {
            return Err(Error::malformed(
                entry_at,
                format!("vtable key prefix disagrees with key {:?}", key),
            ));
        }

        if let Some(prev) = prev_key {
            if canonical_cmp(prev, key) != std::cmp::Ordering::Less {
                return Err(Error::malformed(
                    key_at,
                    format!(
                        "keys {:?} and {:?} are out of canonical order; lookups would be unsound",
                        prev, key
                    ),
                ));
            }
        }
        prev_key = Some(key);

        let value_at = align_up(key_at + key_size, entry.raw.alignment());
        let value_offset = value_at - at;
        let end_ok = if entry.raw == RawType::Null {
            value_offset <= total
        } else {
            value_offset < total
        };
        if !end_ok {
            return Err(Error::malformed(
                entry_at,
                format!("value offset {} is past the aggregate's end", value_offset),
            ));
        }
        validate_value(buf, value_at, entry.raw, at + total, depth + 1)?;
    }

    Ok(total)
}

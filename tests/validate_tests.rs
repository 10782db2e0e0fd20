//! Tests for the untrusted-buffer validator: every corruption must be
//! rejected with a parse error before any reader touches the bytes.

use pretty_assertions::assert_eq;
use wirepack::{validate_bytes, validate_bytes_as, Error, Packet, RawType};

/// `{"hi": true}`, as laid out by the finalizer.
fn tiny_object() -> Vec<u8> {
    let mut obj = Packet::object();
    obj.insert("hi", true).unwrap();
    obj.finalize().unwrap().dup_bytes().unwrap()
}

fn assert_rejected(bytes: &[u8]) -> Error {
    let err = validate_bytes(bytes).expect_err("corrupted buffer must fail validation");
    assert!(
        matches!(err, Error::Parse { .. }),
        "validator failures are parse errors, got {:?}",
        err
    );
    err
}

#[test]
fn intact_buffers_pass() {
    let wire = tiny_object();
    assert_eq!(validate_bytes(&wire).unwrap(), wire.len());
}

#[test]
fn vtable_offset_past_the_end_is_rejected() {
    let mut wire = tiny_object();
    // the lone vtable entry's offset lives at byte 8
    wire[8..12].copy_from_slice(&100_u32.to_le_bytes());
    let err = assert_rejected(&wire);
    match err {
        Error::Parse { offset, .. } => assert_eq!(offset, 8, "error cites the bad entry"),
        _ => unreachable!(),
    }
}

#[test]
fn truncated_buffers_are_rejected() {
    let wire = tiny_object();
    assert_rejected(&wire[..wire.len() - 1]);
    assert_rejected(&wire[..7]);
    assert_rejected(&[]);
}

#[test]
fn total_bytes_larger_than_the_slice_is_rejected() {
    let mut wire = tiny_object();
    let lying = wire.len() as u32 + 1;
    wire[0..4].copy_from_slice(&lying.to_le_bytes());
    assert_rejected(&wire);
}

#[test]
fn missing_nul_terminator_is_rejected() {
    let mut wire = tiny_object();
    // the key's NUL sits between "hi" and the boolean payload
    assert_eq!(wire[20], 0);
    wire[20] = b'x';
    assert_rejected(&wire);
}

#[test]
fn keys_out_of_canonical_order_are_rejected() {
    let mut obj = Packet::object();
    obj.insert("b", 1).unwrap();
    obj.insert("aa", 2).unwrap();
    let mut wire = obj.finalize().unwrap().dup_bytes().unwrap();

    // swapping the two vtable entries leaves every pointer valid but breaks
    // the order binary search depends on
    let (head, tail) = wire.split_at_mut(16);
    head[8..16].swap_with_slice(&mut tail[..8]);
    assert_rejected(&wire);
}

#[test]
fn prefix_disagreement_is_rejected() {
    let mut wire = tiny_object();
    // first prefix byte of the entry
    assert_eq!(wire[14], b'h');
    wire[14] = b'z';
    assert_rejected(&wire);

    let mut wire = tiny_object();
    // prefix length claims one byte for the two-byte key
    wire[13] = 1;
    assert_rejected(&wire);
}

#[test]
fn unknown_raw_type_tags_are_rejected() {
    let mut wire = tiny_object();
    wire[12] = 0xFF;
    assert_rejected(&wire);
}

#[test]
fn out_of_domain_boolean_is_rejected() {
    let mut wire = tiny_object();
    let last = wire.len() - 1;
    assert_eq!(wire[last], 1);
    wire[last] = 2;
    assert_rejected(&wire);
}

#[test]
fn misaligned_offsets_are_rejected() {
    let mut arr = Packet::array();
    arr.push(3.14159).unwrap();
    let mut wire = arr.finalize().unwrap().dup_bytes().unwrap();

    // the f64 sits at offset 16; pointing the entry one byte in breaks the
    // natural alignment of the payload
    assert_eq!(u32::from_le_bytes([wire[8], wire[9], wire[10], wire[11]]), 16);
    wire[8..12].copy_from_slice(&17_u32.to_le_bytes());

    let err = validate_bytes_as(RawType::Array, &wire)
        .expect_err("misaligned payload must fail validation");
    assert!(matches!(err, Error::Parse { .. }));
}

#[test]
fn absurd_element_counts_are_rejected() {
    let mut wire = tiny_object();
    wire[4..8].copy_from_slice(&u32::max_value().to_le_bytes());
    assert_rejected(&wire);
}

#[test]
fn non_utf8_strings_are_rejected() {
    let flat = Packet::string("é").finalize().unwrap();
    let mut wire = flat.dup_bytes().unwrap();
    // a two-byte utf-8 sequence with its continuation byte clobbered
    wire[1] = 0xFF;
    let err = validate_bytes_as(RawType::SmallString, &wire)
        .expect_err("invalid utf-8 must fail validation");
    assert!(matches!(err, Error::Parse { .. }));
}

#[test]
fn scalar_roots_validate_by_declared_type() {
    assert_eq!(validate_bytes_as(RawType::LongInteger, &[0; 8]).unwrap(), 8);
    assert!(validate_bytes_as(RawType::LongInteger, &[0; 7]).is_err());
    assert_eq!(validate_bytes_as(RawType::Null, &[]).unwrap(), 0);
    assert_eq!(validate_bytes_as(RawType::Boolean, &[1]).unwrap(), 1);
    assert!(validate_bytes_as(RawType::Boolean, &[2]).is_err());
}

#[test]
fn from_bytes_refuses_invalid_buffers() {
    let mut wire = tiny_object();
    wire[8..12].copy_from_slice(&100_u32.to_le_bytes());
    assert!(matches!(
        Packet::from_bytes(&wire),
        Err(Error::Parse { .. })
    ));
    assert!(matches!(
        Packet::take_bytes(wire),
        Err(Error::Parse { .. })
    ));
}

#[test]
fn trailing_slack_is_tolerated_and_trimmed() {
    let mut padded = tiny_object();
    let len = padded.len();
    padded.extend_from_slice(&[0xAB; 6]);

    assert_eq!(validate_bytes(&padded).unwrap(), len);
    let packet = Packet::from_bytes(&padded).unwrap();
    assert_eq!(packet.bytes().unwrap().len(), len);
    assert_eq!(packet.get("hi").unwrap().as_boolean().unwrap(), true);
}

#[test]
fn deeply_nested_hostile_buffers_are_bounded() {
    // a legitimate deep tree stays within the validator's depth limit
    let mut packet = Packet::string("leaf");
    for _ in 0..64 {
        let mut wrap = Packet::array();
        wrap.push(packet).unwrap();
        packet = wrap;
    }
    let wire = packet.finalize().unwrap().dup_bytes().unwrap();
    validate_bytes_as(RawType::Array, &wire).unwrap();
}

#[test]
fn object_value_reads_match_heap_after_validation() {
    let mut obj = Packet::object();
    for (key, val) in &[("one", 1_i64), ("two", 2), ("three", 3), ("four", 4)] {
        obj.insert(key, *val).unwrap();
    }
    let wire = obj.finalize().unwrap().dup_bytes().unwrap();
    let flat = Packet::from_bytes(&wire).unwrap();

    for key in &["one", "two", "three", "four", "absent"] {
        assert_eq!(
            flat.get(key).unwrap(),
            obj.get(key).unwrap(),
            "lookup of {:?} must agree across forms",
            key
        );
    }
}

//! Tests for the JSON bridge.

use pretty_assertions::assert_eq;
use wirepack::{Error, Kind, Packet};

#[test]
fn parse_basic_document() {
    let packet = Packet::from_json(
        r#"{"name":"wirepack","count":3,"ratio":0.5,"on":true,"none":null,"list":[1,"two"]}"#,
    )
    .unwrap();

    assert!(!packet.is_finalized());
    assert_eq!(packet.size().unwrap(), 6);
    assert_eq!(packet.get("name").unwrap().as_str().unwrap(), "wirepack");
    assert_eq!(packet.get("count").unwrap().as_integer().unwrap(), 3);
    assert_eq!(packet.get("ratio").unwrap().as_decimal().unwrap(), 0.5);
    assert_eq!(packet.get("on").unwrap().as_boolean().unwrap(), true);
    assert!(packet.get("none").unwrap().is_null());
    assert_eq!(packet.get("list").unwrap().size().unwrap(), 2);
}

#[test]
fn render_and_reparse_round_trip() {
    let mut obj = Packet::object();
    obj.insert("s", "text with \"quotes\" and \u{2603}").unwrap();
    obj.insert("i", -40_000).unwrap();
    obj.insert("d", 2.25).unwrap();
    obj.insert("flag", false).unwrap();
    obj.insert("nothing", ()).unwrap();
    obj.insert("nested", {
        let mut arr = Packet::array();
        arr.push(1).unwrap();
        arr.push(Packet::object()).unwrap();
        arr
    })
    .unwrap();

    let text = obj.to_json().unwrap();
    let back = Packet::from_json(&text).unwrap();
    assert_eq!(back, obj);
}

#[test]
fn flat_values_render_without_lifting() {
    let mut obj = Packet::object();
    obj.insert("k", "v").unwrap();
    obj.insert("n", 7).unwrap();

    let flat = obj.finalize().unwrap();
    assert_eq!(flat.to_json().unwrap(), obj.to_json().unwrap());
}

#[test]
fn json_then_finalize_then_lift() {
    let packet = Packet::from_json(r#"{"a":{"b":{"c":"deep"}},"arr":["last"]}"#).unwrap();
    let flat = packet.finalize().unwrap();

    assert_eq!(flat.get_nested("a.b.c").as_str().unwrap(), "deep");
    assert_eq!(flat.definalize().unwrap(), packet);
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert!(matches!(Packet::from_json("{"), Err(Error::Parse { .. })));
    assert!(matches!(
        Packet::from_json("{\"k\": nope}"),
        Err(Error::Parse { .. })
    ));
    assert!(matches!(Packet::from_json(""), Err(Error::Parse { .. })));
}

#[test]
fn integers_and_fractions_keep_their_kinds() {
    let packet = Packet::from_json(r#"[1, 1.0, -9223372036854775808, 9223372036854775807]"#).unwrap();
    assert_eq!(packet.get_index(0).unwrap().kind(), Kind::Integer);
    // a fraction stays a decimal even when it is mathematically integral
    assert_eq!(packet.get_index(1).unwrap().kind(), Kind::Decimal);
    assert_eq!(
        packet.get_index(2).unwrap().as_integer().unwrap(),
        i64::min_value()
    );
    assert_eq!(
        packet.get_index(3).unwrap().as_integer().unwrap(),
        i64::max_value()
    );

    // beyond the i64 range, numbers degrade to decimals
    let big = Packet::from_json("18446744073709551615").unwrap();
    assert_eq!(big.kind(), Kind::Decimal);
}

#[test]
fn non_finite_decimals_cannot_render() {
    assert!(matches!(
        Packet::decimal(f64::NAN).to_json(),
        Err(Error::Runtime(_))
    ));
    assert!(matches!(
        Packet::decimal(f64::INFINITY).to_json(),
        Err(Error::Runtime(_))
    ));
}

#[test]
fn json_round_trip_survives_the_wire() {
    let source = r#"{"levels":[{"id":1,"name":"one"},{"id":2,"name":"two"}],"meta":{"ok":true}}"#;
    let packet = Packet::from_json(source).unwrap();

    let wire = packet.finalize().unwrap().dup_bytes().unwrap();
    let received = Packet::from_bytes(&wire).unwrap();

    let reparsed = Packet::from_json(&received.to_json().unwrap()).unwrap();
    assert_eq!(reparsed, packet);
}

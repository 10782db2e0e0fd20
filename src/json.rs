//! JSON bridge.
//!
//! Parsing goes through `serde_json` into the heap form; rendering walks
//! either form through the packet accessors, so a finalized value can be
//! printed without lifting it first.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::heap::{Fields, Key, Node, Str};
use crate::packet::{BasicPacket, MAX_KEY_BYTES};
use crate::rc::RcKind;
use crate::Kind;

/// Parse JSON bytes into a heap tree.
pub(crate) fn parse<K: RcKind>(bytes: &[u8]) -> Result<Node<K>> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| Error::Parse {
        offset: e.column().saturating_sub(1),
        reason: e.to_string(),
    })?;
    decode::<K>(&value)
}

fn decode<K: RcKind>(value: &Value) -> Result<Node<K>> {
    let node = match value {
        Value::Null => Node::Null,
        Value::Bool(val) => Node::Boolean(*val),
        Value::Number(num) => {
            if let Some(val) = num.as_i64() {
                Node::Integer(val)
            } else {
                // u64 beyond the i64 range, or a fraction
                Node::Decimal(num.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Node::String(Str::new(s)),
        Value::Array(elems) => {
            let mut children = Vec::with_capacity(elems.len());
            for elem in elems {
                children.push(K::new(decode::<K>(elem)?));
            }
            Node::Array(children)
        }
        Value::Object(fields) => {
            let mut out = Fields::<K>::new();
            for (key, val) in fields {
                if key.len() > MAX_KEY_BYTES {
                    return Err(Error::Parse {
                        offset: 0,
                        reason: format!("object key of {} bytes exceeds the 65535-byte limit", key.len()),
                    });
                }
                out.insert(Key::new(key), K::new(decode::<K>(val)?));
            }
            Node::Object(out)
        }
    };
    Ok(node)
}

/// Render any packet as a `serde_json` value.
pub(crate) fn render<K: RcKind>(packet: &BasicPacket<K>) -> Result<Value> {
    let value = match packet.kind() {
        Kind::Null => Value::Null,
        Kind::Boolean => Value::Bool(packet.as_boolean()?),
        Kind::Integer => Value::Number(packet.as_integer()?.into()),
        Kind::Decimal => {
            let val = packet.as_decimal()?;
            match Number::from_f64(val) {
                Some(num) => Value::Number(num),
                None => {
                    return Err(Error::Runtime(format!(
                        "decimal {} has no JSON representation",
                        val
                    )))
                }
            }
        }
        Kind::String => Value::String(packet.as_str()?.to_owned()),
        Kind::Array => {
            let mut elems = Vec::with_capacity(packet.size()?);
            for child in packet.values()? {
                elems.push(render(&child)?);
            }
            Value::Array(elems)
        }
        Kind::Object => {
            let mut fields = Map::new();
            for (key, child) in packet.entries()? {
                fields.insert(key.as_str()?.to_owned(), render(&child)?);
            }
            Value::Object(fields)
        }
    };
    Ok(value)
}

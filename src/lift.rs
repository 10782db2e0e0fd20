//! Flat → heap conversion.
//!
//! A recursive walk over the buffer readers that produces a freshly owned
//! heap tree. The result compares equal to the buffer it came from, and
//! re-finalizing it reproduces the buffer bit for bit.

use crate::buffer::{boolean_value, decimal_value, integer_value, string_value, ArrayRaw, ObjectRaw};
use crate::heap::{Fields, Key, Node, Str};
use crate::rc::RcKind;
use crate::RawType;

/// Rebuild the heap form of the value of type `raw` at `at`.
pub(crate) fn lift<K: RcKind>(buf: &[u8], at: usize, raw: RawType) -> Node<K> {
    match raw {
        RawType::Null => Node::Null,
        RawType::Boolean => Node::Boolean(boolean_value(buf, at)),
        RawType::ShortInteger | RawType::Integer | RawType::LongInteger => {
            Node::Integer(integer_value(buf, at, raw))
        }
        RawType::Decimal | RawType::LongDecimal => Node::Decimal(decimal_value(buf, at, raw)),
        RawType::SmallString | RawType::String | RawType::BigString => {
            Node::String(Str::new(string_value(buf, at, raw)))
        }
        RawType::Array => {
            let arr = ArrayRaw::new(buf, at);
            let mut elems = Vec::with_capacity(arr.count());
            for idx in 0..arr.count() {
                let (child_raw, child_at) = arr.element_at(idx);
                elems.push(K::new(lift::<K>(buf, child_at, child_raw)));
            }
            Node::Array(elems)
        }
        RawType::Object => {
            let obj = ObjectRaw::new(buf, at);
            let mut fields = Fields::<K>::new();
            for idx in 0..obj.count() {
                let (child_raw, child_at) = obj.value_at(idx);
                fields.insert(
                    Key::new(obj.key_at(idx)),
                    K::new(lift::<K>(buf, child_at, child_raw)),
                );
            }
            Node::Object(fields)
        }
    }
}

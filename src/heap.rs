//! The mutable heap form: a reference-counted tagged-union tree.
//!
//! Nodes are shared by handle; mutation goes through the copy-on-write
//! primitive of the reference-counter flavor, so a shared node is cloned
//! (shallowly, children stay shared) the first time it is written to.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str;

use crate::rc::RcKind;
use crate::{canonical_cmp, Kind, RawType};

/// A counted handle to a heap node.
pub(crate) type Handle<K> = <K as RcKind>::Ptr<Node<K>>;

/// Object storage: fields ordered by the canonical key order, which gives
/// O(log n) lookup and makes heap iteration match flat iteration.
pub(crate) type Fields<K> = BTreeMap<Key, Handle<K>>;

/// Longest string stored inline in the node itself; anything longer goes
/// behind a shared allocation. Storage tuning only, invisible on the wire.
pub(crate) const SMALL_STRING_MAX: usize = 23;

/// An object key. Ordered canonically: shorter first, then bytewise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Key(Box<str>);

impl Key {
    pub fn new(key: &str) -> Key {
        Key(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// String storage with the small-string optimization.
pub(crate) enum Str<K: RcKind> {
    Small { len: u8, bytes: [u8; SMALL_STRING_MAX] },
    Shared(K::Ptr<String>),
}

impl<K: RcKind> Str<K> {
    pub fn new(s: &str) -> Str<K> {
        if s.len() <= SMALL_STRING_MAX {
            let mut bytes = [0u8; SMALL_STRING_MAX];
            bytes[..s.len()].copy_from_slice(s.as_bytes());
            Str::Small {
                len: s.len() as u8,
                bytes,
            }
        } else {
            Str::Shared(K::new(s.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Str::Small { len, bytes } => {
                // `new` only ever copies a whole &str in here.
                str::from_utf8(&bytes[..*len as usize]).expect("inline string is valid utf-8")
            }
            Str::Shared(s) => s.as_str(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Str::Small { len, .. } => *len as usize,
            Str::Shared(s) => s.len(),
        }
    }
}

impl<K: RcKind> Clone for Str<K> {
    fn clone(&self) -> Self {
        match self {
            Str::Small { len, bytes } => Str::Small {
                len: *len,
                bytes: *bytes,
            },
            Str::Shared(s) => Str::Shared(s.clone()),
        }
    }
}

impl<K: RcKind> PartialEq for Str<K> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// A heap-form value.
pub(crate) enum Node<K: RcKind> {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(Str<K>),
    Array(Vec<Handle<K>>),
    Object(Fields<K>),
}

impl<K: RcKind> Node<K> {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Null => Kind::Null,
            Node::Boolean(_) => Kind::Boolean,
            Node::Integer(_) => Kind::Integer,
            Node::Decimal(_) => Kind::Decimal,
            Node::String(_) => Kind::String,
            Node::Array(_) => Kind::Array,
            Node::Object(_) => Kind::Object,
        }
    }

    /// The minimal raw type this value will take on the wire.
    pub fn raw_type(&self) -> RawType {
        match self {
            Node::Null => RawType::Null,
            Node::Boolean(_) => RawType::Boolean,
            Node::Integer(val) => RawType::for_integer(*val),
            Node::Decimal(val) => RawType::for_decimal(*val),
            Node::String(s) => RawType::for_string(s.len()),
            Node::Array(_) => RawType::Array,
            Node::Object(_) => RawType::Object,
        }
    }

}

impl<K: RcKind> Clone for Node<K> {
    fn clone(&self) -> Self {
        match self {
            Node::Null => Node::Null,
            Node::Boolean(val) => Node::Boolean(*val),
            Node::Integer(val) => Node::Integer(*val),
            Node::Decimal(val) => Node::Decimal(*val),
            Node::String(s) => Node::String(s.clone()),
            // Aggregates clone shallowly: children stay shared.
            Node::Array(elems) => Node::Array(elems.clone()),
            Node::Object(fields) => Node::Object(fields.clone()),
        }
    }
}

impl<K: RcKind> PartialEq for Node<K> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Boolean(lhs), Node::Boolean(rhs)) => lhs == rhs,
            (Node::Integer(lhs), Node::Integer(rhs)) => lhs == rhs,
            (Node::Decimal(lhs), Node::Decimal(rhs)) => lhs == rhs,
            (Node::String(lhs), Node::String(rhs)) => lhs == rhs,
            (Node::Array(lhs), Node::Array(rhs)) => {
                lhs.len() == rhs.len()
                    && lhs.iter().zip(rhs.iter()).all(|(l, r)| **l == **r)
            }
            (Node::Object(lhs), Node::Object(rhs)) => {
                lhs.len() == rhs.len()
                    && lhs
                        .iter()
                        .zip(rhs.iter())
                        .all(|((lk, lv), (rk, rv))| lk == rk && **lv == **rv)
            }
            _ => false,
        }
    }
}

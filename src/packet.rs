//! The user-facing packet type.
//!
//! A [Packet] is a counted handle to a value in either form. Heap-form
//! packets are mutable through the copy-on-write machinery; flat-form
//! packets are immutable views into a shared byte region. Most accessors
//! work on both forms; mutators require the heap form and report a state
//! error otherwise.

use std::fmt;

use crate::buffer::{self, ArrayRaw, Flat, ObjectRaw, Region};
use crate::error::{Error, Result};
use crate::finalize::finalize as finalize_node;
use crate::heap::{Handle, Key, Node, Str};
use crate::iter::{Entries, Keys, Members};
use crate::json;
use crate::lift::lift as lift_node;
use crate::rc::{RcKind, ThreadLocal, ThreadSafe};
use crate::validate::validate_bytes_as;
use crate::{Kind, RawType};

/// Longest permitted object key; the wire encodes key lengths in 16 bits.
pub(crate) const MAX_KEY_BYTES: usize = u16::max_value() as usize;

/// A dynamically-typed value in either the heap or the flat form.
///
/// The type parameter selects the reference-counter flavor; packets of
/// different flavors are distinct types and do not mix. [Packet] and
/// [LocalPacket] are the two concrete flavors.
pub struct BasicPacket<K: RcKind> {
    form: Form<K>,
}

/// A packet whose handles use atomic reference counting and may be shared
/// freely across threads.
pub type Packet = BasicPacket<ThreadSafe>;

/// A packet whose handles use non-atomic reference counting and must stay
/// on one thread.
pub type LocalPacket = BasicPacket<ThreadLocal>;

enum Form<K: RcKind> {
    Heap(Handle<K>),
    Flat(Flat<K>),
}

impl<K: RcKind> Clone for BasicPacket<K> {
    fn clone(&self) -> Self {
        let form = match &self.form {
            Form::Heap(handle) => Form::Heap(handle.clone()),
            Form::Flat(flat) => Form::Flat(flat.clone()),
        };
        BasicPacket { form }
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_BYTES {
        return Err(Error::Logic(format!(
            "object key of {} bytes exceeds the 65535-byte limit",
            key.len()
        )));
    }
    Ok(())
}

/*----- Constructors -----*/

impl<K: RcKind> BasicPacket<K> {
    fn from_node(node: Node<K>) -> BasicPacket<K> {
        BasicPacket {
            form: Form::Heap(K::new(node)),
        }
    }

    pub(crate) fn from_handle(handle: Handle<K>) -> BasicPacket<K> {
        BasicPacket {
            form: Form::Heap(handle),
        }
    }

    pub(crate) fn from_flat(flat: Flat<K>) -> BasicPacket<K> {
        BasicPacket {
            form: Form::Flat(flat),
        }
    }

    /// An empty object.
    pub fn object() -> BasicPacket<K> {
        BasicPacket::from_node(Node::Object(Default::default()))
    }

    /// An empty array.
    pub fn array() -> BasicPacket<K> {
        BasicPacket::from_node(Node::Array(Vec::new()))
    }

    pub fn string(val: &str) -> BasicPacket<K> {
        BasicPacket::from_node(Node::String(Str::new(val)))
    }

    pub fn integer(val: i64) -> BasicPacket<K> {
        BasicPacket::from_node(Node::Integer(val))
    }

    pub fn decimal(val: f64) -> BasicPacket<K> {
        BasicPacket::from_node(Node::Decimal(val))
    }

    pub fn boolean(val: bool) -> BasicPacket<K> {
        BasicPacket::from_node(Node::Boolean(val))
    }

    pub fn null() -> BasicPacket<K> {
        BasicPacket::from_node(Node::Null)
    }
}

/*----- Inspection -----*/

impl<K: RcKind> BasicPacket<K> {
    pub fn kind(&self) -> Kind {
        match &self.form {
            Form::Heap(handle) => handle.kind(),
            Form::Flat(flat) => flat.kind(),
        }
    }

    pub fn is_object(&self) -> bool {
        self.kind() == Kind::Object
    }

    pub fn is_array(&self) -> bool {
        self.kind() == Kind::Array
    }

    pub fn is_string(&self) -> bool {
        self.kind() == Kind::String
    }

    pub fn is_integer(&self) -> bool {
        self.kind() == Kind::Integer
    }

    pub fn is_decimal(&self) -> bool {
        self.kind() == Kind::Decimal
    }

    pub fn is_boolean(&self) -> bool {
        self.kind() == Kind::Boolean
    }

    pub fn is_null(&self) -> bool {
        self.kind() == Kind::Null
    }

    /// Whether this value is in the flat form.
    pub fn is_finalized(&self) -> bool {
        matches!(self.form, Form::Flat(_))
    }

    /// Element count for aggregates, byte length for strings; a type error
    /// for scalars.
    pub fn size(&self) -> Result<usize> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Object(fields) => Ok(fields.len()),
                Node::Array(elems) => Ok(elems.len()),
                Node::String(s) => Ok(s.len()),
                other => Err(Error::wrong_kind("object, array, or string", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Object => Ok(ObjectRaw::new(flat.buf(), flat.offset()).count()),
                RawType::Array => Ok(ArrayRaw::new(flat.buf(), flat.offset()).count()),
                raw if raw.kind() == Kind::String => {
                    Ok(buffer::string_len(flat.buf(), flat.offset(), raw))
                }
                raw => Err(Error::wrong_kind("object, array, or string", raw.kind())),
            },
        }
    }

    /// Look a key up in an object. Returns a null value when the key is
    /// absent; use [Packet::has_key] to tell an absent key from a key
    /// mapped to null, or [Packet::at_key] to make absence an error.
    pub fn get(&self, key: &str) -> Result<BasicPacket<K>> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Object(fields) => Ok(fields
                    .get(&Key::new(key))
                    .map(|child| BasicPacket::from_handle(child.clone()))
                    .unwrap_or_else(BasicPacket::null)),
                other => Err(Error::wrong_kind("object", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Object => {
                    let obj = ObjectRaw::new(flat.buf(), flat.offset());
                    Ok(match obj.find(key) {
                        Some(idx) => {
                            let (raw, at) = obj.value_at(idx);
                            BasicPacket::from_flat(flat.child(raw, at))
                        }
                        None => BasicPacket::from_flat(flat.child(RawType::Null, flat.offset())),
                    })
                }
                raw => Err(Error::wrong_kind("object", raw.kind())),
            },
        }
    }

    /// Index into an array. Returns a null value when the index is out of
    /// range; [Packet::at] is the strict variant.
    pub fn get_index(&self, index: usize) -> Result<BasicPacket<K>> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Array(elems) => Ok(elems
                    .get(index)
                    .map(|child| BasicPacket::from_handle(child.clone()))
                    .unwrap_or_else(BasicPacket::null)),
                other => Err(Error::wrong_kind("array", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Array => {
                    let arr = ArrayRaw::new(flat.buf(), flat.offset());
                    Ok(if index < arr.count() {
                        let (raw, at) = arr.element_at(index);
                        BasicPacket::from_flat(flat.child(raw, at))
                    } else {
                        BasicPacket::from_flat(flat.child(RawType::Null, flat.offset()))
                    })
                }
                raw => Err(Error::wrong_kind("array", raw.kind())),
            },
        }
    }

    /// Like [Packet::get_index], but out-of-range indices are a range error.
    pub fn at(&self, index: usize) -> Result<BasicPacket<K>> {
        let len = match self.kind() {
            Kind::Array => self.size()?,
            actual => return Err(Error::wrong_kind("array", actual)),
        };
        if index >= len {
            return Err(Error::out_of_range(index, len));
        }
        self.get_index(index)
    }

    /// Like [Packet::get], but an absent key is a range error.
    pub fn at_key(&self, key: &str) -> Result<BasicPacket<K>> {
        if !self.has_key(key) {
            if !self.is_object() {
                return Err(Error::wrong_kind("object", self.kind()));
            }
            return Err(Error::Range(format!("key {:?} is absent", key)));
        }
        self.get(key)
    }

    /// Whether an object has `key` at all, distinguishing an absent key
    /// from a key mapped to null. `false` for non-objects.
    pub fn has_key(&self, key: &str) -> bool {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Object(fields) => fields.contains_key(&Key::new(key)),
                _ => false,
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Object => ObjectRaw::new(flat.buf(), flat.offset()).find(key).is_some(),
                _ => false,
            },
        }
    }

    /// Walk a `.`-separated path of keys through nested objects. Returns a
    /// null value as soon as the path leaves object territory.
    pub fn get_nested(&self, path: &str) -> BasicPacket<K> {
        if path.is_empty() {
            return self.clone();
        }

        let mut current = self.clone();
        for segment in path.split('.') {
            match current.get(segment) {
                Ok(next) => current = next,
                Err(_) => return BasicPacket::null(),
            }
        }
        current
    }

    pub fn as_str(&self) -> Result<&str> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::String(s) => Ok(s.as_str()),
                other => Err(Error::wrong_kind("string", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                raw if raw.kind() == Kind::String => {
                    Ok(buffer::string_value(flat.buf(), flat.offset(), raw))
                }
                raw => Err(Error::wrong_kind("string", raw.kind())),
            },
        }
    }

    pub fn as_integer(&self) -> Result<i64> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Integer(val) => Ok(*val),
                other => Err(Error::wrong_kind("integer", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                raw if raw.kind() == Kind::Integer => {
                    Ok(buffer::integer_value(flat.buf(), flat.offset(), raw))
                }
                raw => Err(Error::wrong_kind("integer", raw.kind())),
            },
        }
    }

    pub fn as_decimal(&self) -> Result<f64> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Decimal(val) => Ok(*val),
                other => Err(Error::wrong_kind("decimal", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                raw if raw.kind() == Kind::Decimal => {
                    Ok(buffer::decimal_value(flat.buf(), flat.offset(), raw))
                }
                raw => Err(Error::wrong_kind("decimal", raw.kind())),
            },
        }
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Boolean(val) => Ok(*val),
                other => Err(Error::wrong_kind("boolean", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Boolean => Ok(buffer::boolean_value(flat.buf(), flat.offset())),
                raw => Err(Error::wrong_kind("boolean", raw.kind())),
            },
        }
    }

    /// The integer value, or `default` if this is not an integer.
    pub fn integer_or(&self, default: i64) -> i64 {
        self.as_integer().unwrap_or(default)
    }

    /// The decimal value, or `default` if this is not a decimal.
    pub fn decimal_or(&self, default: f64) -> f64 {
        self.as_decimal().unwrap_or(default)
    }

    /// The boolean value, or `default` if this is not a boolean.
    pub fn boolean_or(&self, default: bool) -> bool {
        self.as_boolean().unwrap_or(default)
    }

    /// The string value, or `default` if this is not a string.
    pub fn str_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.as_str().unwrap_or(default)
    }
}

/*----- Combination -----*/

impl<K: RcKind> BasicPacket<K> {
    /// A copy of this object with every field of `other` added on top;
    /// `other` wins where keys collide. If both inputs are finalized the
    /// result is finalized too, otherwise it stays in the heap form.
    pub fn inject(&self, other: &BasicPacket<K>) -> Result<BasicPacket<K>> {
        let mut merged = BasicPacket::<K>::object();
        for (key, value) in self.entries()? {
            merged.set(key.as_str()?, value)?;
        }
        for (key, value) in other.entries()? {
            merged.set(key.as_str()?, value)?;
        }

        if self.is_finalized() && other.is_finalized() {
            merged.finalize()
        } else {
            Ok(merged)
        }
    }

    /// The sub-object of this object restricted to `keys`; keys that are
    /// absent are skipped. Finalized input produces finalized output.
    pub fn project(&self, keys: &[&str]) -> Result<BasicPacket<K>> {
        if !self.is_object() {
            return Err(Error::wrong_kind("object", self.kind()));
        }

        let mut projected = BasicPacket::<K>::object();
        for key in keys {
            if self.has_key(key) {
                projected.set(key, self.get(key)?)?;
            }
        }

        if self.is_finalized() {
            projected.finalize()
        } else {
            Ok(projected)
        }
    }
}

/*----- Iteration -----*/

impl<K: RcKind> BasicPacket<K> {
    /// Iterate the values of an object (canonical key order) or array
    /// (insertion order).
    pub fn values(&self) -> Result<Members<K>> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Object(fields) => Ok(Members::heap(fields.values().cloned().collect())),
                Node::Array(elems) => Ok(Members::heap(elems.to_vec())),
                other => Err(Error::wrong_kind("object or array", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Object => {
                    let count = ObjectRaw::new(flat.buf(), flat.offset()).count();
                    Ok(Members::flat(flat.clone(), count))
                }
                RawType::Array => {
                    let count = ArrayRaw::new(flat.buf(), flat.offset()).count();
                    Ok(Members::flat(flat.clone(), count))
                }
                raw => Err(Error::wrong_kind("object or array", raw.kind())),
            },
        }
    }

    /// Iterate the keys of an object in canonical order.
    pub fn keys(&self) -> Result<Keys<K>> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Object(fields) => Ok(Keys::heap(fields.keys().cloned().collect())),
                other => Err(Error::wrong_kind("object", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Object => {
                    let count = ObjectRaw::new(flat.buf(), flat.offset()).count();
                    Ok(Keys::flat(flat.clone(), count))
                }
                raw => Err(Error::wrong_kind("object", raw.kind())),
            },
        }
    }

    /// Iterate the (key, value) pairs of an object in canonical order.
    pub fn entries(&self) -> Result<Entries<K>> {
        match &self.form {
            Form::Heap(handle) => match &**handle {
                Node::Object(fields) => Ok(Entries::heap(
                    fields
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                )),
                other => Err(Error::wrong_kind("object", other.kind())),
            },
            Form::Flat(flat) => match flat.raw() {
                RawType::Object => {
                    let count = ObjectRaw::new(flat.buf(), flat.offset()).count();
                    Ok(Entries::flat(flat.clone(), count))
                }
                raw => Err(Error::wrong_kind("object", raw.kind())),
            },
        }
    }
}

/*----- Mutation -----*/

impl<K: RcKind> BasicPacket<K> {
    /// Unique access to the heap node, cloning it first if it is shared.
    fn node_mut(&mut self) -> Result<&mut Node<K>> {
        match &mut self.form {
            Form::Heap(handle) => Ok(K::make_mut(handle)),
            Form::Flat(_) => Err(Error::State("cannot mutate a finalized value")),
        }
    }

    fn into_heap_handle(self) -> Handle<K> {
        match self.form {
            Form::Heap(handle) => handle,
            // a finalized subtree is lifted on its way into a heap tree
            Form::Flat(flat) => K::new(lift_node::<K>(flat.buf(), flat.offset(), flat.raw())),
        }
    }

    /// Add a field to an object. Inserting a key that is already present
    /// is a logic error; [Packet::set] overwrites instead.
    pub fn insert(&mut self, key: &str, value: impl Into<BasicPacket<K>>) -> Result<()> {
        check_key(key)?;
        let child = value.into().into_heap_handle();
        match self.node_mut()? {
            Node::Object(fields) => {
                if fields.contains_key(&Key::new(key)) {
                    return Err(Error::Logic(format!("key {:?} is already present", key)));
                }
                fields.insert(Key::new(key), child);
                Ok(())
            }
            other => Err(Error::wrong_kind("object", other.kind())),
        }
    }

    /// Add or replace a field of an object.
    pub fn set(&mut self, key: &str, value: impl Into<BasicPacket<K>>) -> Result<()> {
        check_key(key)?;
        let child = value.into().into_heap_handle();
        match self.node_mut()? {
            Node::Object(fields) => {
                fields.insert(Key::new(key), child);
                Ok(())
            }
            other => Err(Error::wrong_kind("object", other.kind())),
        }
    }

    /// Remove a field from an object; `false` if the key was absent.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        match self.node_mut()? {
            Node::Object(fields) => Ok(fields.remove(&Key::new(key)).is_some()),
            other => Err(Error::wrong_kind("object", other.kind())),
        }
    }

    /// Empty out an object or array.
    pub fn clear(&mut self) -> Result<()> {
        match self.node_mut()? {
            Node::Object(fields) => {
                fields.clear();
                Ok(())
            }
            Node::Array(elems) => {
                elems.clear();
                Ok(())
            }
            other => Err(Error::wrong_kind("object or array", other.kind())),
        }
    }

    /// Append to an array.
    pub fn push(&mut self, value: impl Into<BasicPacket<K>>) -> Result<()> {
        let child = value.into().into_heap_handle();
        match self.node_mut()? {
            Node::Array(elems) => {
                elems.push(child);
                Ok(())
            }
            other => Err(Error::wrong_kind("array", other.kind())),
        }
    }

    /// Insert into an array before `index`, shifting the rest; `index` may
    /// equal the length to append.
    pub fn insert_index(&mut self, index: usize, value: impl Into<BasicPacket<K>>) -> Result<()> {
        let child = value.into().into_heap_handle();
        match self.node_mut()? {
            Node::Array(elems) => {
                if index > elems.len() {
                    return Err(Error::out_of_range(index, elems.len()));
                }
                elems.insert(index, child);
                Ok(())
            }
            other => Err(Error::wrong_kind("array", other.kind())),
        }
    }

    /// Replace an existing array element.
    pub fn set_index(&mut self, index: usize, value: impl Into<BasicPacket<K>>) -> Result<()> {
        let child = value.into().into_heap_handle();
        match self.node_mut()? {
            Node::Array(elems) => {
                if index >= elems.len() {
                    return Err(Error::out_of_range(index, elems.len()));
                }
                elems[index] = child;
                Ok(())
            }
            other => Err(Error::wrong_kind("array", other.kind())),
        }
    }

    /// Remove an array element, shifting the rest down.
    pub fn remove_index(&mut self, index: usize) -> Result<()> {
        match self.node_mut()? {
            Node::Array(elems) => {
                if index >= elems.len() {
                    return Err(Error::out_of_range(index, elems.len()));
                }
                elems.remove(index);
                Ok(())
            }
            other => Err(Error::wrong_kind("array", other.kind())),
        }
    }

    /// Grow (with nulls) or shrink an array to `len` elements.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        match self.node_mut()? {
            Node::Array(elems) => {
                if len <= elems.len() {
                    elems.truncate(len);
                } else {
                    let fill = K::new(Node::Null);
                    elems.resize_with(len, || fill.clone());
                }
                Ok(())
            }
            other => Err(Error::wrong_kind("array", other.kind())),
        }
    }

    /// Pre-allocate space for `additional` more array elements.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        match self.node_mut()? {
            Node::Array(elems) => {
                elems.reserve(additional);
                Ok(())
            }
            other => Err(Error::wrong_kind("array", other.kind())),
        }
    }
}

/*----- Form transitions -----*/

impl<K: RcKind> BasicPacket<K> {
    /// Encode a heap value into a fresh flat buffer. The encoding is
    /// canonical: equal values produce byte-identical buffers.
    pub fn finalize(&self) -> Result<BasicPacket<K>> {
        match &self.form {
            Form::Heap(handle) => {
                let raw = handle.raw_type();
                let region = finalize_node(&**handle)?;
                Ok(BasicPacket::from_flat(Flat::root(K::new(region), raw)))
            }
            Form::Flat(_) => Err(Error::State("value is already finalized")),
        }
    }

    /// Rebuild a mutable heap tree from a flat value.
    pub fn lift(&self) -> Result<BasicPacket<K>> {
        match &self.form {
            Form::Flat(flat) => Ok(BasicPacket::from_node(lift_node::<K>(
                flat.buf(),
                flat.offset(),
                flat.raw(),
            ))),
            Form::Heap(_) => Err(Error::State("value is not finalized")),
        }
    }

    /// Alias for [Packet::lift].
    pub fn definalize(&self) -> Result<BasicPacket<K>> {
        self.lift()
    }

    /// This value in the flat form; already-flat values are handed back
    /// as-is.
    pub fn to_buffer(&self) -> Result<BasicPacket<K>> {
        match &self.form {
            Form::Heap(_) => self.finalize(),
            Form::Flat(_) => Ok(self.clone()),
        }
    }

    /// This value in the heap form; already-heap values are handed back
    /// as-is.
    pub fn to_heap(&self) -> BasicPacket<K> {
        match &self.form {
            Form::Heap(_) => self.clone(),
            Form::Flat(flat) => {
                BasicPacket::from_node(lift_node::<K>(flat.buf(), flat.offset(), flat.raw()))
            }
        }
    }
}

/*----- Byte access -----*/

impl<K: RcKind> BasicPacket<K> {
    /// Borrow the wire bytes of a finalized value. Child views hand out
    /// their own slice, which is itself a complete buffer (offsets are
    /// relative to the enclosing aggregate).
    pub fn bytes(&self) -> Result<&[u8]> {
        match &self.form {
            Form::Flat(flat) => Ok(flat.value_bytes()),
            Form::Heap(_) => Err(Error::State("value is not finalized")),
        }
    }

    /// An owning copy of the wire bytes.
    pub fn dup_bytes(&self) -> Result<Vec<u8>> {
        self.bytes().map(<[u8]>::to_vec)
    }

    /// Validate borrowed bytes as an object-rooted buffer and wrap them in
    /// an owned, aligned region.
    pub fn from_bytes(bytes: &[u8]) -> Result<BasicPacket<K>> {
        BasicPacket::from_bytes_as(RawType::Object, bytes)
    }

    /// Validate borrowed bytes as a buffer with the declared root raw type
    /// and wrap them in an owned, aligned region.
    pub fn from_bytes_as(raw: RawType, bytes: &[u8]) -> Result<BasicPacket<K>> {
        let size = validate_bytes_as(raw, bytes)?;
        let region = Region::copy_from(&bytes[..size])?;
        Ok(BasicPacket::from_flat(Flat::root(K::new(region), raw)))
    }

    /// Validate caller-owned bytes as an object-rooted buffer and adopt the
    /// allocation instead of copying it.
    pub fn take_bytes(bytes: Vec<u8>) -> Result<BasicPacket<K>> {
        BasicPacket::take_bytes_as(RawType::Object, bytes)
    }

    /// Validate caller-owned bytes against the declared root raw type and
    /// adopt the allocation instead of copying it.
    pub fn take_bytes_as(raw: RawType, bytes: Vec<u8>) -> Result<BasicPacket<K>> {
        let size = validate_bytes_as(raw, &bytes)?;
        let mut region = Region::adopt(bytes);
        region.truncate(size);
        Ok(BasicPacket::from_flat(Flat::root(K::new(region), raw)))
    }
}

/*----- JSON -----*/

impl<K: RcKind> BasicPacket<K> {
    /// Parse JSON into a heap-form value.
    pub fn from_json(bytes: impl AsRef<[u8]>) -> Result<BasicPacket<K>> {
        json::parse::<K>(bytes.as_ref()).map(BasicPacket::from_node)
    }

    /// Render this value (either form) as JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let value = json::render(self)?;
        serde_json::to_vec(&value).map_err(|e| Error::Runtime(e.to_string()))
    }
}

/*----- Structured construction -----*/

/// One argument to the [Packet::object_spec] / [Packet::array_spec]
/// format mini-language.
#[derive(Copy, Clone, Debug)]
pub enum Arg<'a> {
    Str(&'a str),
    Int(i64),
    Dec(f64),
    Bool(bool),
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(val: &'a str) -> Arg<'a> {
        Arg::Str(val)
    }
}

impl<'a> From<i64> for Arg<'a> {
    fn from(val: i64) -> Self {
        Arg::Int(val)
    }
}

impl<'a> From<i32> for Arg<'a> {
    fn from(val: i32) -> Self {
        Arg::Int(val as i64)
    }
}

impl<'a> From<f64> for Arg<'a> {
    fn from(val: f64) -> Self {
        Arg::Dec(val)
    }
}

impl<'a> From<bool> for Arg<'a> {
    fn from(val: bool) -> Self {
        Arg::Bool(val)
    }
}

impl<K: RcKind> BasicPacket<K> {
    /// Build an object from a terse format string and a matched argument
    /// slice.
    ///
    /// Each format character describes one value and consumes a key
    /// argument followed by the value's own arguments: `s`/`S` a string,
    /// `i`/`l` an integer, `d` a decimal, `b` a boolean, `n` or a space a
    /// null (no value argument), `o` and `a` open a nested object or array
    /// whose members follow until a closing `,`.
    ///
    /// ```
    /// use wirepack::{Arg, Packet};
    ///
    /// let obj = Packet::object_spec(
    ///     "sios,",
    ///     &[
    ///         Arg::Str("name"), Arg::Str("wirepack"),
    ///         Arg::Str("answer"), Arg::Int(42),
    ///         Arg::Str("nested"), Arg::Str("deep"), Arg::Str("yes"),
    ///     ],
    /// )
    /// .unwrap();
    /// assert_eq!(obj.size().unwrap(), 3);
    /// assert_eq!(obj.get_nested("nested.deep").as_str().unwrap(), "yes");
    /// ```
    pub fn object_spec(format: &str, args: &[Arg]) -> Result<BasicPacket<K>> {
        let mut letters = format.chars();
        let mut args = args.iter();
        let packet = spec_object::<K>(&mut letters, &mut args)?;
        spec_finish(&mut letters, &mut args)?;
        Ok(packet)
    }

    /// Build an array from a format string; like [Packet::object_spec] but
    /// positional, with no key arguments.
    pub fn array_spec(format: &str, args: &[Arg]) -> Result<BasicPacket<K>> {
        let mut letters = format.chars();
        let mut args = args.iter();
        let packet = spec_array::<K>(&mut letters, &mut args)?;
        spec_finish(&mut letters, &mut args)?;
        Ok(packet)
    }
}

fn spec_finish(letters: &mut std::str::Chars, args: &mut std::slice::Iter<Arg>) -> Result<()> {
    if letters.next().is_some() {
        return Err(Error::Logic(
            "spec format continues past the closed top-level aggregate".into(),
        ));
    }
    if args.next().is_some() {
        return Err(Error::Logic(
            "more arguments than the spec format consumes".into(),
        ));
    }
    Ok(())
}

fn spec_str_arg<'a>(args: &mut std::slice::Iter<Arg<'a>>, what: &str) -> Result<&'a str> {
    match args.next() {
        Some(Arg::Str(s)) => Ok(*s),
        Some(other) => Err(Error::Logic(format!(
            "spec format expects a string argument for {}, got {:?}",
            what, other
        ))),
        None => Err(Error::Logic(format!(
            "spec format ran out of arguments looking for {}",
            what
        ))),
    }
}

fn spec_object<K: RcKind>(
    letters: &mut std::str::Chars,
    args: &mut std::slice::Iter<Arg>,
) -> Result<BasicPacket<K>> {
    let mut obj = BasicPacket::<K>::object();
    while let Some(letter) = letters.next() {
        if letter == ',' {
            break;
        }
        let key = spec_str_arg(args, "an object key")?;
        let value = spec_value::<K>(letter, letters, args)?;
        obj.insert(key, value)?;
    }
    Ok(obj)
}

fn spec_array<K: RcKind>(
    letters: &mut std::str::Chars,
    args: &mut std::slice::Iter<Arg>,
) -> Result<BasicPacket<K>> {
    let mut arr = BasicPacket::<K>::array();
    while let Some(letter) = letters.next() {
        if letter == ',' {
            break;
        }
        let value = spec_value::<K>(letter, letters, args)?;
        arr.push(value)?;
    }
    Ok(arr)
}

fn spec_value<K: RcKind>(
    letter: char,
    letters: &mut std::str::Chars,
    args: &mut std::slice::Iter<Arg>,
) -> Result<BasicPacket<K>> {
    match letter {
        's' | 'S' => Ok(BasicPacket::string(spec_str_arg(args, "a string value")?)),
        'i' | 'l' => match args.next() {
            Some(Arg::Int(val)) => Ok(BasicPacket::integer(*val)),
            other => Err(Error::Logic(format!(
                "spec format expects an integer argument, got {:?}",
                other
            ))),
        },
        'd' => match args.next() {
            Some(Arg::Dec(val)) => Ok(BasicPacket::decimal(*val)),
            other => Err(Error::Logic(format!(
                "spec format expects a decimal argument, got {:?}",
                other
            ))),
        },
        'b' => match args.next() {
            Some(Arg::Bool(val)) => Ok(BasicPacket::boolean(*val)),
            other => Err(Error::Logic(format!(
                "spec format expects a boolean argument, got {:?}",
                other
            ))),
        },
        'n' | ' ' => Ok(BasicPacket::null()),
        'o' => spec_object::<K>(letters, args),
        'a' => spec_array::<K>(letters, args),
        other => Err(Error::Logic(format!(
            "unknown spec format character {:?}",
            other
        ))),
    }
}

/*----- Builders -----*/

impl<K: RcKind> BasicPacket<K> {
    /// Start building an object fluently.
    pub fn build_object() -> BasicObjectBuilder<K> {
        BasicObjectBuilder::new()
    }

    /// Start building an array fluently.
    pub fn build_array() -> BasicArrayBuilder<K> {
        BasicArrayBuilder::new()
    }
}

/// Fluent construction of an object; errors are deferred to `build`.
pub struct BasicObjectBuilder<K: RcKind> {
    packet: BasicPacket<K>,
    error: Option<Error>,
}

/// Thread-safe flavor of [BasicObjectBuilder].
pub type ObjectBuilder = BasicObjectBuilder<ThreadSafe>;

impl<K: RcKind> BasicObjectBuilder<K> {
    pub fn new() -> BasicObjectBuilder<K> {
        BasicObjectBuilder {
            packet: BasicPacket::object(),
            error: None,
        }
    }

    /// Add or replace a field.
    pub fn field(mut self, key: &str, value: impl Into<BasicPacket<K>>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.packet.set(key, value) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(self) -> Result<BasicPacket<K>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.packet),
        }
    }
}

impl<K: RcKind> Default for BasicObjectBuilder<K> {
    fn default() -> Self {
        BasicObjectBuilder::new()
    }
}

/// Fluent construction of an array; errors are deferred to `build`.
pub struct BasicArrayBuilder<K: RcKind> {
    packet: BasicPacket<K>,
    error: Option<Error>,
}

/// Thread-safe flavor of [BasicArrayBuilder].
pub type ArrayBuilder = BasicArrayBuilder<ThreadSafe>;

impl<K: RcKind> BasicArrayBuilder<K> {
    pub fn new() -> BasicArrayBuilder<K> {
        BasicArrayBuilder {
            packet: BasicPacket::array(),
            error: None,
        }
    }

    pub fn push(mut self, value: impl Into<BasicPacket<K>>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.packet.push(value) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(self) -> Result<BasicPacket<K>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.packet),
        }
    }
}

impl<K: RcKind> Default for BasicArrayBuilder<K> {
    fn default() -> Self {
        BasicArrayBuilder::new()
    }
}

/*----- Conversions -----*/

impl<K: RcKind> From<&str> for BasicPacket<K> {
    fn from(val: &str) -> Self {
        BasicPacket::string(val)
    }
}

impl<K: RcKind> From<String> for BasicPacket<K> {
    fn from(val: String) -> Self {
        BasicPacket::string(&val)
    }
}

impl<K: RcKind> From<i32> for BasicPacket<K> {
    fn from(val: i32) -> Self {
        BasicPacket::integer(val as i64)
    }
}

impl<K: RcKind> From<i64> for BasicPacket<K> {
    fn from(val: i64) -> Self {
        BasicPacket::integer(val)
    }
}

impl<K: RcKind> From<u32> for BasicPacket<K> {
    fn from(val: u32) -> Self {
        BasicPacket::integer(val as i64)
    }
}

impl<K: RcKind> From<f32> for BasicPacket<K> {
    fn from(val: f32) -> Self {
        BasicPacket::decimal(val as f64)
    }
}

impl<K: RcKind> From<f64> for BasicPacket<K> {
    fn from(val: f64) -> Self {
        BasicPacket::decimal(val)
    }
}

impl<K: RcKind> From<bool> for BasicPacket<K> {
    fn from(val: bool) -> Self {
        BasicPacket::boolean(val)
    }
}

impl<K: RcKind> From<()> for BasicPacket<K> {
    fn from(_: ()) -> Self {
        BasicPacket::null()
    }
}

impl<K: RcKind> Default for BasicPacket<K> {
    fn default() -> Self {
        BasicPacket::null()
    }
}

/*----- Equality and formatting -----*/

impl<K: RcKind> PartialEq for BasicPacket<K> {
    /// Structural, kind-sensitive equality across both forms. Integers and
    /// decimals never compare equal, even for the same mathematical value:
    /// the wire keeps the two apart and round-tripping must preserve them.
    fn eq(&self, other: &Self) -> bool {
        match (&self.form, &other.form) {
            (Form::Heap(lhs), Form::Heap(rhs)) => K::ptr_eq(lhs, rhs) || **lhs == **rhs,
            (Form::Flat(lhs), Form::Flat(rhs)) => {
                // canonical buffers of equal values are bit-identical, so
                // the byte compare usually decides; the structural walk
                // covers foreign buffers with non-minimal encodings
                (lhs.raw() == rhs.raw() && lhs.value_bytes() == rhs.value_bytes())
                    || structural_eq(self, other)
            }
            _ => structural_eq(self, other),
        }
    }
}

fn structural_eq<K: RcKind>(lhs: &BasicPacket<K>, rhs: &BasicPacket<K>) -> bool {
    let kind = lhs.kind();
    if kind != rhs.kind() {
        return false;
    }
    match kind {
        Kind::Null => true,
        Kind::Boolean => lhs.as_boolean().ok() == rhs.as_boolean().ok(),
        Kind::Integer => lhs.as_integer().ok() == rhs.as_integer().ok(),
        Kind::Decimal => lhs.as_decimal().ok() == rhs.as_decimal().ok(),
        Kind::String => lhs.as_str().ok() == rhs.as_str().ok(),
        Kind::Array => {
            lhs.size().ok() == rhs.size().ok()
                && match (lhs.values(), rhs.values()) {
                    (Ok(lhs), Ok(rhs)) => lhs.zip(rhs).all(|(l, r)| l == r),
                    _ => false,
                }
        }
        Kind::Object => {
            lhs.size().ok() == rhs.size().ok()
                && match (lhs.entries(), rhs.entries()) {
                    (Ok(lhs), Ok(rhs)) => lhs
                        .zip(rhs)
                        .all(|((lk, lv), (rk, rv))| lk.as_str().ok() == rk.as_str().ok() && lv == rv),
                    _ => false,
                }
        }
    }
}

impl<K: RcKind> fmt::Display for BasicPacket<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match json::render(self) {
            Ok(value) => write!(f, "{}", value),
            Err(_) => write!(f, "<{} value>", self.kind()),
        }
    }
}

impl<K: RcKind> fmt::Debug for BasicPacket<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let form = if self.is_finalized() { "flat" } else { "heap" };
        write!(f, "Packet[{}]({})", form, self)
    }
}

//! Iterators over aggregates.
//!
//! Flat-form iterators are just a base offset and a vtable index; heap-form
//! iterators walk a snapshot of cheap handle clones taken when the iterator
//! was constructed, so later mutation of the aggregate is not observed.
//! Object iteration visits pairs in the canonical key order in both forms.

use crate::buffer::{ArrayRaw, Flat, ObjectRaw};
use crate::heap::{Handle, Key};
use crate::packet::BasicPacket;
use crate::rc::RcKind;
use crate::RawType;

/// Iterator over the values of an object or array.
pub struct Members<K: RcKind> {
    inner: MembersInner<K>,
}

enum MembersInner<K: RcKind> {
    Heap(std::vec::IntoIter<Handle<K>>),
    Flat {
        flat: Flat<K>,
        next: usize,
        count: usize,
    },
}

impl<K: RcKind> Members<K> {
    pub(crate) fn heap(handles: Vec<Handle<K>>) -> Members<K> {
        Members {
            inner: MembersInner::Heap(handles.into_iter()),
        }
    }

    pub(crate) fn flat(flat: Flat<K>, count: usize) -> Members<K> {
        Members {
            inner: MembersInner::Flat {
                flat,
                next: 0,
                count,
            },
        }
    }
}

impl<K: RcKind> Iterator for Members<K> {
    type Item = BasicPacket<K>;

    fn next(&mut self) -> Option<BasicPacket<K>> {
        match &mut self.inner {
            MembersInner::Heap(handles) => handles.next().map(BasicPacket::from_handle),
            MembersInner::Flat { flat, next, count } => {
                if next >= count {
                    return None;
                }
                let (raw, at) = match flat.raw() {
                    RawType::Array => ArrayRaw::new(flat.buf(), flat.offset()).element_at(*next),
                    _ => ObjectRaw::new(flat.buf(), flat.offset()).value_at(*next),
                };
                *next += 1;
                Some(BasicPacket::from_flat(flat.child(raw, at)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match &self.inner {
            MembersInner::Heap(handles) => handles.len(),
            MembersInner::Flat { next, count, .. } => count - next,
        };
        (remaining, Some(remaining))
    }
}

impl<K: RcKind> ExactSizeIterator for Members<K> {}

/// Iterator over the keys of an object, in canonical order.
pub struct Keys<K: RcKind> {
    inner: KeysInner<K>,
}

enum KeysInner<K: RcKind> {
    Heap(std::vec::IntoIter<Key>),
    Flat {
        flat: Flat<K>,
        next: usize,
        count: usize,
    },
}

impl<K: RcKind> Keys<K> {
    pub(crate) fn heap(keys: Vec<Key>) -> Keys<K> {
        Keys {
            inner: KeysInner::Heap(keys.into_iter()),
        }
    }

    pub(crate) fn flat(flat: Flat<K>, count: usize) -> Keys<K> {
        Keys {
            inner: KeysInner::Flat {
                flat,
                next: 0,
                count,
            },
        }
    }
}

impl<K: RcKind> Iterator for Keys<K> {
    type Item = BasicPacket<K>;

    fn next(&mut self) -> Option<BasicPacket<K>> {
        match &mut self.inner {
            KeysInner::Heap(keys) => keys.next().map(|key| BasicPacket::string(key.as_str())),
            KeysInner::Flat { flat, next, count } => {
                if next >= count {
                    return None;
                }
                let key_at = ObjectRaw::new(flat.buf(), flat.offset()).key_view(*next);
                *next += 1;
                // keys are stored as 16-bit-length strings
                Some(BasicPacket::from_flat(flat.child(RawType::String, key_at)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match &self.inner {
            KeysInner::Heap(keys) => keys.len(),
            KeysInner::Flat { next, count, .. } => count - next,
        };
        (remaining, Some(remaining))
    }
}

impl<K: RcKind> ExactSizeIterator for Keys<K> {}

/// Iterator over the (key, value) pairs of an object, in canonical order.
pub struct Entries<K: RcKind> {
    inner: EntriesInner<K>,
}

enum EntriesInner<K: RcKind> {
    Heap(std::vec::IntoIter<(Key, Handle<K>)>),
    Flat {
        flat: Flat<K>,
        next: usize,
        count: usize,
    },
}

impl<K: RcKind> Entries<K> {
    pub(crate) fn heap(pairs: Vec<(Key, Handle<K>)>) -> Entries<K> {
        Entries {
            inner: EntriesInner::Heap(pairs.into_iter()),
        }
    }

    pub(crate) fn flat(flat: Flat<K>, count: usize) -> Entries<K> {
        Entries {
            inner: EntriesInner::Flat {
                flat,
                next: 0,
                count,
            },
        }
    }
}

impl<K: RcKind> Iterator for Entries<K> {
    type Item = (BasicPacket<K>, BasicPacket<K>);

    fn next(&mut self) -> Option<(BasicPacket<K>, BasicPacket<K>)> {
        match &mut self.inner {
            EntriesInner::Heap(pairs) => pairs
                .next()
                .map(|(key, value)| (BasicPacket::string(key.as_str()), BasicPacket::from_handle(value))),
            EntriesInner::Flat { flat, next, count } => {
                if next >= count {
                    return None;
                }
                let obj = ObjectRaw::new(flat.buf(), flat.offset());
                let key_at = obj.key_view(*next);
                let (raw, value_at) = obj.value_at(*next);
                *next += 1;
                Some((
                    BasicPacket::from_flat(flat.child(RawType::String, key_at)),
                    BasicPacket::from_flat(flat.child(raw, value_at)),
                ))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match &self.inner {
            EntriesInner::Heap(pairs) => pairs.len(),
            EntriesInner::Flat { next, count, .. } => count - next,
        };
        (remaining, Some(remaining))
    }
}

impl<K: RcKind> ExactSizeIterator for Entries<K> {}

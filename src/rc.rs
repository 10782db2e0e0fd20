//! Reference-counter flavors.
//!
//! Every owning type in the crate is parameterized by a [RcKind], which
//! decides whether handles use atomic ([ThreadSafe], the default) or
//! non-atomic ([ThreadLocal]) reference counting. A value built with one
//! flavor cannot interoperate with a value built with the other; the
//! distinction lives entirely in the type system and costs nothing at
//! runtime.

use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

/// Capability set a reference-counted pointer must provide.
///
/// The associated `Ptr` type is the actual smart pointer; `make_mut` is the
/// copy-on-write primitive: it hands out unique mutable access, cloning the
/// pointee first if the pointer is shared.
pub trait RcKind: Sized + 'static {
    /// The pointer type of this flavor.
    type Ptr<T>: Deref<Target = T> + Clone;

    /// Wrap a value in a freshly counted pointer.
    fn new<T>(value: T) -> Self::Ptr<T>;

    /// Unique mutable access, cloning the pointee if it is shared.
    fn make_mut<T: Clone>(ptr: &mut Self::Ptr<T>) -> &mut T;

    /// Whether two pointers refer to the same allocation.
    fn ptr_eq<T>(lhs: &Self::Ptr<T>, rhs: &Self::Ptr<T>) -> bool;
}

/// Atomic reference counting ([Arc]); handles may be cloned and dropped
/// from any thread.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadSafe;

impl RcKind for ThreadSafe {
    type Ptr<T> = Arc<T>;

    fn new<T>(value: T) -> Arc<T> {
        Arc::new(value)
    }

    fn make_mut<T: Clone>(ptr: &mut Arc<T>) -> &mut T {
        Arc::make_mut(ptr)
    }

    fn ptr_eq<T>(lhs: &Arc<T>, rhs: &Arc<T>) -> bool {
        Arc::ptr_eq(lhs, rhs)
    }
}

/// Non-atomic reference counting ([Rc]); cheaper, but handles must stay on
/// the thread that created them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadLocal;

impl RcKind for ThreadLocal {
    type Ptr<T> = Rc<T>;

    fn new<T>(value: T) -> Rc<T> {
        Rc::new(value)
    }

    fn make_mut<T: Clone>(ptr: &mut Rc<T>) -> &mut T {
        Rc::make_mut(ptr)
    }

    fn ptr_eq<T>(lhs: &Rc<T>, rhs: &Rc<T>) -> bool {
        Rc::ptr_eq(lhs, rhs)
    }
}

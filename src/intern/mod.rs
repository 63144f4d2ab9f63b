// RibCore: routing daemon RIB core written in Rust
// Copyright 2022-2024 Tibor Schneider <sctibor@ethz.ch>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reference-counted, hash-interned object store.
//!
//! Routing attributes are shared by many route entries but take only few
//! distinct values, so they are deduplicated: a [`Store`] keeps at most one
//! cached object per equivalence class (as defined by [`InternPayload::same`])
//! and hands out counted [`Handle`]s to it. Objects start out as [`Floating`]
//! values that are freely mutable; [`Store::intern`] either installs the value
//! in the cache or coalesces it with an equal cached object and returns a
//! handle to the survivor.
//!
//! Two invariants hold at every quiescent point:
//!
//! * an object is cached if and only if its refcount is at least one, and
//! * any two handles to equal payloads point at the same object.
//!
//! Shared payloads are never mutated in place. Edits go through
//! [`Store::update`], which duplicates the payload, applies the closure and
//! re-interns the result, replacing the handle in the caller's slot.
//!
//! The store is single-threaded, like the rest of the daemon. Create one
//! store per payload type at startup and drop it at shutdown; handles that
//! outlive their store stay valid but are no longer part of any cache.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// A payload type that can live in a [`Store`].
///
/// The associated functions mirror the lifecycle of a stored object: it is
/// born with [`fresh`](InternPayload::fresh), deep-copied with
/// [`duplicate`](InternPayload::duplicate) and destroyed by `Drop`.
/// [`cache_key`](InternPayload::cache_key) may be weak; the store resolves
/// collisions with [`same`](InternPayload::same).
pub trait InternPayload: Sized + std::fmt::Debug + 'static {
    /// Whether objects of this type are deduplicated at all. When `false`,
    /// interning only counts references and [`Store::num_cached`] stays zero.
    const CACHED: bool;

    /// A new, empty payload.
    fn fresh() -> Self;

    /// Deep copy of the payload, or `None` when the type does not support
    /// duplication (such types cannot be edited through [`Store::update`]).
    fn duplicate(&self) -> Option<Self> {
        None
    }

    /// Cache key. Payloads for which [`same`](InternPayload::same) holds must
    /// produce equal keys.
    fn cache_key(&self) -> u32;

    /// Semantic equality. Payloads equal in this way are fully
    /// interchangeable and will share one cached object.
    fn same(&self, other: &Self) -> bool;
}

/// Error returned when editing a payload type without duplication support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payload type does not support duplication")]
pub struct DupUnsupported;

#[derive(Debug)]
struct Slot<T> {
    refcnt: Cell<u64>,
    data: T,
}

#[derive(Debug)]
struct Buckets<T> {
    map: HashMap<u32, Vec<Rc<Slot<T>>>>,
    count: u64,
}

impl<T> Buckets<T> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            count: 0,
        }
    }
}

/// Process-wide cache for one payload type. Cloning a `Store` yields another
/// handle to the *same* cache.
#[derive(Debug)]
pub struct Store<T: InternPayload> {
    inner: Rc<RefCell<Buckets<T>>>,
}

impl<T: InternPayload> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: InternPayload> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An uncached object with refcount zero. Freely mutable through `DerefMut`;
/// becomes shared (and immutable) once passed to [`Store::intern`].
#[derive(Debug)]
pub struct Floating<T: InternPayload>(T);

impl<T: InternPayload> Floating<T> {
    /// Wrap an already-built payload.
    pub fn from_value(value: T) -> Self {
        Self(value)
    }

    /// Unwrap the payload without interning it.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: InternPayload> From<T> for Floating<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T: InternPayload> std::ops::Deref for Floating<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: InternPayload> std::ops::DerefMut for Floating<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// A counted reference to a cached object. `Clone` takes another reference;
/// dropping the last handle removes the object from the cache and destroys
/// it. Replacing a handle stored in a slot is plain assignment.
pub struct Handle<T: InternPayload> {
    slot: Rc<Slot<T>>,
    store: Weak<RefCell<Buckets<T>>>,
}

impl<T: InternPayload> Store<T> {
    /// Create an empty store. One store per payload type, created at daemon
    /// initialization.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Buckets::new())),
        }
    }

    /// A new floating object, initialized to the payload's empty value.
    pub fn fresh(&self) -> Floating<T> {
        Floating(T::fresh())
    }

    /// Intern a floating object and return a counted handle.
    ///
    /// If an equal object is already cached, the argument is destroyed and
    /// the handle refers to the cached survivor; otherwise the argument
    /// itself is installed. Either way the survivor's refcount is
    /// incremented only after the cache lookup, so "cached ⇔ refcount ≥ 1"
    /// holds throughout.
    pub fn intern(&self, obj: Floating<T>) -> Handle<T> {
        if !T::CACHED {
            return Handle {
                slot: Rc::new(Slot {
                    refcnt: Cell::new(1),
                    data: obj.0,
                }),
                store: Rc::downgrade(&self.inner),
            };
        }

        let key = obj.0.cache_key();
        let mut inner = self.inner.borrow_mut();
        let bucket = inner.map.entry(key).or_default();

        if let Some(existing) = bucket.iter().find(|s| s.data.same(&obj.0)) {
            let slot = Rc::clone(existing);
            slot.refcnt.set(slot.refcnt.get() + 1);
            // the caller's equal duplicate is dropped here
            return Handle {
                slot,
                store: Rc::downgrade(&self.inner),
            };
        }

        let slot = Rc::new(Slot {
            refcnt: Cell::new(1),
            data: obj.0,
        });
        bucket.push(Rc::clone(&slot));
        inner.count += 1;
        Handle {
            slot,
            store: Rc::downgrade(&self.inner),
        }
    }

    /// A floating deep copy of a cached object, or `None` when the payload
    /// type has no duplication support.
    pub fn dup(&self, handle: &Handle<T>) -> Option<Floating<T>> {
        handle.slot.data.duplicate().map(Floating)
    }

    /// Edit a shared object copy-on-write: duplicate the payload, apply `f`,
    /// re-intern the result and replace `handle` with the new reference. The
    /// old reference is released. No caller ever holds a mutable reference
    /// into a shared payload.
    pub fn update<F>(&self, handle: &mut Handle<T>, f: F) -> Result<(), DupUnsupported>
    where
        F: FnOnce(&mut T),
    {
        let mut copy = self.dup(handle).ok_or(DupUnsupported)?;
        f(&mut copy);
        *handle = self.intern(copy);
        Ok(())
    }

    /// Number of distinct cached objects.
    pub fn num_cached(&self) -> u64 {
        self.inner.borrow().count
    }

    /// Visit every cached object in unspecified order. `f` receives the
    /// payload and its current refcount; the cache must not be mutated from
    /// within `f` (attempting to do so panics).
    pub fn for_each<F: FnMut(&T, u64)>(&self, mut f: F) {
        let inner = self.inner.borrow();
        for bucket in inner.map.values() {
            for slot in bucket {
                f(&slot.data, slot.refcnt.get());
            }
        }
    }
}

impl<T: InternPayload> Handle<T> {
    /// Current reference count of the underlying object.
    pub fn refcnt(&self) -> u64 {
        self.slot.refcnt.get()
    }

    /// Whether two handles refer to the same underlying object.
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: InternPayload> Clone for Handle<T> {
    fn clone(&self) -> Self {
        self.slot.refcnt.set(self.slot.refcnt.get() + 1);
        Self {
            slot: Rc::clone(&self.slot),
            store: Weak::clone(&self.store),
        }
    }
}

impl<T: InternPayload> std::ops::Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.data
    }
}

impl<T: InternPayload> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("refcnt", &self.slot.refcnt.get())
            .field("data", &self.slot.data)
            .finish()
    }
}

impl<T: InternPayload> Drop for Handle<T> {
    fn drop(&mut self) {
        let rc = self.slot.refcnt.get();
        assert!(rc > 0, "dropping a handle with refcount 0");
        self.slot.refcnt.set(rc - 1);
        if rc > 1 || !T::CACHED {
            return;
        }

        // last reference: remove from the cache (the store may already be
        // gone during shutdown, in which case there is nothing to decache)
        if let Some(store) = self.store.upgrade() {
            let mut inner = store.borrow_mut();
            let key = self.slot.data.cache_key();
            let mut removed = false;
            let mut empty = false;
            if let Some(bucket) = inner.map.get_mut(&key) {
                let before = bucket.len();
                bucket.retain(|s| !Rc::ptr_eq(s, &self.slot));
                removed = bucket.len() < before;
                empty = bucket.is_empty();
            }
            if empty {
                inner.map.remove(&key);
            }
            if removed {
                inner.count -= 1;
            }
        }
    }
}

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

use crate::community::Community;
use crate::intern::{DupUnsupported, InternPayload, Store};

use pretty_assertions::assert_eq;

fn com(s: &str) -> Community {
    s.parse().unwrap()
}

#[test]
fn intern_dedups_equal_payloads() {
    let store: Store<Community> = Store::new();
    let a = store.intern(com("100 200").into());
    let b = store.intern(com("100 200").into());

    assert!(a.ptr_eq(&b));
    assert_eq!(store.num_cached(), 1);
    assert_eq!(a.refcnt(), 2);
}

#[test]
fn distinct_payloads_stay_distinct() {
    let store: Store<Community> = Store::new();
    let a = store.intern(com("100").into());
    let b = store.intern(com("200").into());

    assert!(!a.ptr_eq(&b));
    assert_eq!(store.num_cached(), 2);
    assert_eq!(a.refcnt(), 1);
    assert_eq!(b.refcnt(), 1);
}

#[test]
fn clone_counts_references() {
    let store: Store<Community> = Store::new();
    let a = store.intern(com("100").into());
    let b = a.clone();
    let c = b.clone();

    assert_eq!(a.refcnt(), 3);
    drop(b);
    assert_eq!(a.refcnt(), 2);
    drop(c);
    assert_eq!(a.refcnt(), 1);
    assert_eq!(store.num_cached(), 1);
}

#[test]
fn last_deref_decaches() {
    let store: Store<Community> = Store::new();
    let a = store.intern(com("100").into());
    let b = a.clone();

    drop(a);
    assert_eq!(store.num_cached(), 1);
    drop(b);
    assert_eq!(store.num_cached(), 0);

    // re-interning after the cache emptied produces a fresh object
    let c = store.intern(com("100").into());
    assert_eq!(store.num_cached(), 1);
    assert_eq!(c.refcnt(), 1);
}

#[test]
fn empty_community_is_a_valid_cached_object() {
    let store: Store<Community> = Store::new();
    let empty = store.intern(store.fresh());

    assert_eq!(store.num_cached(), 1);
    assert_eq!(empty.str(), "");
    assert!(empty.is_empty());

    // and it is distinct from any non-empty value
    let other = store.intern(com("100").into());
    assert!(!empty.ptr_eq(&other));
    assert_eq!(store.num_cached(), 2);
}

#[test]
fn update_is_copy_on_write() {
    let store: Store<Community> = Store::new();
    let a = store.intern(com("100").into());
    let mut b = a.clone();

    store.update(&mut b, |c| c.merge(&com("200"))).unwrap();

    // the shared original is untouched, the edited handle points elsewhere
    assert_eq!(a.str(), "0:100");
    assert_eq!(b.str(), "0:100 0:200");
    assert!(!a.ptr_eq(&b));
    assert_eq!(a.refcnt(), 1);
    assert_eq!(store.num_cached(), 2);
}

#[test]
fn update_coalesces_with_existing_value() {
    let store: Store<Community> = Store::new();
    let full = store.intern(com("100 200").into());
    let mut partial = store.intern(com("100").into());
    assert_eq!(store.num_cached(), 2);

    store.update(&mut partial, |c| c.merge(&com("200"))).unwrap();

    assert!(partial.ptr_eq(&full));
    assert_eq!(full.refcnt(), 2);
    // the old "0:100" object lost its last reference and fell out
    assert_eq!(store.num_cached(), 1);
}

#[test]
fn for_each_sees_every_cached_object() {
    let store: Store<Community> = Store::new();
    let _a = store.intern(com("100").into());
    let b = store.intern(com("200").into());
    let _b2 = b.clone();

    let mut seen = Vec::new();
    store.for_each(|c, refcnt| seen.push((c.str().to_string(), refcnt)));
    seen.sort();
    assert_eq!(seen, vec![("0:100".to_string(), 1), ("0:200".to_string(), 2)]);
}

#[test]
fn handles_outlive_their_store() {
    let store: Store<Community> = Store::new();
    let a = store.intern(com("100").into());
    drop(store);

    // still usable, just no longer cached anywhere
    assert_eq!(a.str(), "0:100");
    drop(a);
}

/// Payload without duplication support: a bare tag.
#[derive(Debug, PartialEq)]
struct Tag(u32);

impl InternPayload for Tag {
    const CACHED: bool = false;

    fn fresh() -> Self {
        Tag(0)
    }

    fn cache_key(&self) -> u32 {
        self.0
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

#[test]
fn uncached_type_only_counts() {
    let store: Store<Tag> = Store::new();
    let a = store.intern(Tag(7).into());
    let b = store.intern(Tag(7).into());

    assert!(!a.ptr_eq(&b));
    assert_eq!(store.num_cached(), 0);
    assert_eq!(a.refcnt(), 1);
}

#[test]
fn update_requires_duplication_support() {
    let store: Store<Tag> = Store::new();
    let mut a = store.intern(Tag(7).into());
    assert_eq!(store.update(&mut a, |t| t.0 = 8), Err(DupUnsupported));
    assert_eq!(a.0, 7);
}

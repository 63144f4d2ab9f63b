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

use super::assert_sorted;
use crate::community::{Community, CommunityError, INTERNET, LOCAL_AS, NO_ADVERTISE, NO_EXPORT};

use pretty_assertions::assert_eq;

fn com(s: &str) -> Community {
    s.parse().unwrap()
}

#[test]
fn parse_empty_buffer_yields_empty_community() {
    let c = Community::parse(&[]).unwrap();
    assert!(c.is_empty());
    assert_eq!(c.len(), 0);
    assert_eq!(c.str(), "");
    assert_eq!(c.to_wire(), Vec::<u8>::new());
}

#[test]
fn parse_rejects_misaligned_length() {
    assert_eq!(
        Community::parse(&[0x00, 0x00, 0x01]),
        Err(CommunityError::MalformedLength(3))
    );
}

#[test]
fn parse_sorts_and_dedups() {
    // 2:1, 1:2, 2:1 on the wire
    let buf = [
        0x00, 0x02, 0x00, 0x01, //
        0x00, 0x01, 0x00, 0x02, //
        0x00, 0x02, 0x00, 0x01,
    ];
    let c = Community::parse(&buf).unwrap();
    assert_eq!(c.values().collect::<Vec<_>>(), vec![0x0001_0002, 0x0002_0001]);
    assert_sorted(&c);
}

#[test]
fn parse_well_known_mix() {
    // no-export-ish bytes and the zero value, unsorted on the wire
    let buf = [0x00, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, 0x00];
    let c = Community::parse(&buf).unwrap();
    assert_eq!(c.values().collect::<Vec<_>>(), vec![0x0000_0000, 0x00FF_FF01]);
    assert_sorted(&c);
    assert_eq!(c.str(), "internet 255:65281");
}

#[test]
fn wire_round_trip() {
    let c = com("no-export 65001:100 1:1");
    let again = Community::parse(&c.to_wire()).unwrap();
    assert_eq!(c, again);
}

#[test]
fn str2com_well_known_and_duplicates() {
    let c = com("no-export 65001:100 internet 65001:100");
    assert_eq!(
        c.values().collect::<Vec<_>>(),
        vec![0x0000_0000, 0xFDE9_0064, 0xFFFF_FF01]
    );
    assert_sorted(&c);
    assert_eq!(c.str(), "internet 65001:100 no-export");
}

#[test]
fn str2com_numeric_order() {
    let c = com("1:2 2:1");
    assert_eq!(c.values().collect::<Vec<_>>(), vec![0x0001_0002, 0x0002_0001]);
}

#[test]
fn str2com_bare_low_component() {
    let c = com("100");
    assert_eq!(c.values().collect::<Vec<_>>(), vec![100]);
    assert_eq!(c.str(), "0:100");
}

#[test]
fn str2com_errors() {
    assert_eq!(
        "frobnicate".parse::<Community>(),
        Err(CommunityError::UnknownToken("frobnicate".to_string()))
    );
    assert_eq!(
        "1:2:3".parse::<Community>(),
        Err(CommunityError::UnknownToken("1:2:3".to_string()))
    );
    assert_eq!(
        "100:".parse::<Community>(),
        Err(CommunityError::UnknownToken("100:".to_string()))
    );
    assert_eq!(
        "70000".parse::<Community>(),
        Err(CommunityError::OutOfRange("70000".to_string()))
    );
    assert_eq!(
        "1:70000".parse::<Community>(),
        Err(CommunityError::OutOfRange("1:70000".to_string()))
    );
    assert_eq!("".parse::<Community>(), Err(CommunityError::Empty));
    // one bad token fails the whole parse
    assert!("100 bogus".parse::<Community>().is_err());
}

#[test]
fn well_known_values() {
    let c = com("internet no-export no-advertise local-AS");
    assert_eq!(
        c.values().collect::<Vec<_>>(),
        vec![INTERNET, NO_EXPORT, NO_ADVERTISE, LOCAL_AS]
    );
    // stringifies without any numeric token
    assert!(!c.str().contains(':'));
    assert_eq!(c.str(), "internet no-export no-advertise local-AS");
}

#[test]
fn canonical_string_is_idempotent() {
    for s in [
        "no-export 65001:100 internet 65001:100",
        "3:3 2:2 1:1 1:1",
        "internet",
        "100 200",
    ] {
        let once = com(s).str().to_string();
        let twice = com(&once).str().to_string();
        assert_eq!(once, twice);
    }
}

#[test]
fn hash_key_agrees_with_equality() {
    let a = com("no-export 1:1");
    let b = Community::parse(&a.to_wire()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.byte_sum(), b.byte_sum());
}

#[test]
fn includes_is_linear_membership() {
    let c = com("no-export 65001:100");
    assert!(c.includes(NO_EXPORT));
    assert!(c.includes(0xFDE9_0064));
    assert!(!c.includes(INTERNET));
}

#[test]
fn matches_is_subset() {
    assert!(com("100 200 300").matches(&com("200 300")));
    assert!(!com("100 300").matches(&com("200 300")));
    // every set contains the empty set, including the empty one
    assert!(com("100").matches(&Community::new()));
    assert!(Community::new().matches(&Community::new()));
    // and the subset test is reflexive
    let c = com("1:1 2:2");
    assert!(c.matches(&c.clone()));
}

#[test]
fn merge_sorts_and_dedups() {
    let mut a = com("100");
    a.merge(&com("200"));
    assert_eq!(a.str(), "0:100 0:200");
    a.merge(&com("100 50"));
    assert_eq!(a.str(), "0:50 0:100 0:200");
    assert_sorted(&a);
}

#[test]
fn delete_removes_first_match_in_order() {
    let mut a = com("1:1 2:2 3:3");
    a.delete(&com("2:2"));
    assert_eq!(a.str(), "1:1 3:3");
    // deleting a value that is not present changes nothing
    a.delete(&com("9:9"));
    assert_eq!(a.str(), "1:1 3:3");
}

#[test]
fn cmp_is_size_and_byte_equality() {
    assert_eq!(com("1:1 2:2"), com("2:2 1:1"));
    assert_ne!(com("1:1"), com("1:1 2:2"));
    assert_ne!(com("1:1"), com("1:2"));
}

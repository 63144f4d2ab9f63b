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

//! The BGP communities attribute.
//!
//! A community is a 32-bit tag carried in BGP updates; a route carries a set
//! of them. Two representation invariants are pinned here and relied upon by
//! everything else:
//!
//! * the payload is stored in **network byte order**, so emitting and parsing
//!   the wire format is a plain copy, and
//! * the values, read as host-order integers, are **strictly ascending**
//!   (sorted and unique).
//!
//! Communities are deduplicated through the [`Store`](crate::intern::Store):
//! route entries hold counted handles, and edits go through the store's
//! copy-on-write API.

use crate::intern::InternPayload;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::hash::Hash;
use thiserror::Error;

/// Well-known community, defined by [RFC 1997](https://www.rfc-editor.org/rfc/rfc1997.html).
/// The all-zero value; routes carrying it are ordinary internet routes.
pub const INTERNET: u32 = 0x00000000;
/// Well-known community, defined by [RFC 1997](https://www.rfc-editor.org/rfc/rfc1997.html).
/// Routes carrying this value MUST NOT be advertised outside a BGP
/// confederation boundary.
pub const NO_EXPORT: u32 = 0xFFFFFF01;
/// Well-known community, defined by [RFC 1997](https://www.rfc-editor.org/rfc/rfc1997.html).
/// Routes carrying this value MUST NOT be advertised to other BGP peers.
pub const NO_ADVERTISE: u32 = 0xFFFFFF02;
/// Well-known community, defined by [RFC 1997](https://www.rfc-editor.org/rfc/rfc1997.html).
/// Routes carrying this value MUST NOT be advertised to external BGP peers,
/// including peers in other member autonomous systems of a confederation.
pub const LOCAL_AS: u32 = 0xFFFFFF03;

/// Error returned when parsing a communities attribute, from the wire or from
/// text. The partial result is torn down before the error is returned.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommunityError {
    /// Wire attribute length is not a multiple of four octets.
    #[error("malformed community attribute length {0}")]
    MalformedLength(usize),
    /// A text token is neither a community value nor a well-known mnemonic.
    #[error("`{0}` is not a community value or a well-known community")]
    UnknownToken(String),
    /// A numeric component does not fit in 16 bits.
    #[error("community value `{0}` is out of range")]
    OutOfRange(String),
    /// The community string contains no tokens at all.
    #[error("empty community string")]
    Empty,
}

/// A sorted, uniqued set of community values.
///
/// The canonical textual form is cached on first use and returned verbatim
/// afterwards (see [`Community::str`]).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Community {
    /// Community values, each in network byte order.
    val: Vec<[u8; 4]>,
    /// Lazily computed canonical textual form.
    #[serde(skip)]
    str: OnceCell<String>,
}

impl Community {
    /// A new, empty community. An empty community is a valid attribute,
    /// distinct from "no attribute".
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire representation: a sequence of 4-octet values in
    /// big-endian order. Fails when the length is not a multiple of four.
    /// The result is sorted and uniqued; a zero-length buffer yields a valid
    /// empty community.
    pub fn parse(buf: &[u8]) -> Result<Self, CommunityError> {
        if buf.len() % 4 != 0 {
            return Err(CommunityError::MalformedLength(buf.len()));
        }
        let mut com = Community::new();
        com.val = buf
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        com.uniq_sort();
        Ok(com)
    }

    /// Emit the wire representation. `Community::parse(c.to_wire())` is `c`.
    pub fn to_wire(&self) -> Vec<u8> {
        self.val.iter().flatten().copied().collect()
    }

    /// Number of community values.
    pub fn len(&self) -> usize {
        self.val.len()
    }

    /// Whether the community holds no values.
    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }

    /// Iterate over the values in host byte order (ascending).
    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        self.val.iter().map(|w| u32::from_be_bytes(*w))
    }

    /// Append one value (converted to network byte order). The caller is
    /// responsible for re-establishing the sort order afterwards.
    fn add_val(&mut self, val: u32) {
        self.val.push(val.to_be_bytes());
        self.str = OnceCell::new();
    }

    /// Sort the values by their host-order interpretation and drop
    /// duplicates. The storage stays in network byte order.
    fn uniq_sort(&mut self) {
        self.val.sort_unstable_by_key(|w| u32::from_be_bytes(*w));
        self.val.dedup();
        self.str = OnceCell::new();
    }

    /// Membership test for a single (host-order) value.
    pub fn includes(&self, val: u32) -> bool {
        let needle = val.to_be_bytes();
        self.val.iter().any(|w| *w == needle)
    }

    /// Whether every value of `other` is also present in `self`
    /// (`other ⊆ self`). Both sides are sorted, so a single two-pointer pass
    /// suffices.
    pub fn matches(&self, other: &Community) -> bool {
        if self.len() < other.len() {
            return false;
        }
        let mut j = 0;
        for w in &self.val {
            if j == other.val.len() {
                break;
            }
            if *w == other.val[j] {
                j += 1;
            }
        }
        j == other.val.len()
    }

    /// Append all values of `other` and re-establish the sorted, uniqued
    /// form. Only ever called on a floating (unshared) community.
    pub fn merge(&mut self, other: &Community) {
        self.val.extend_from_slice(&other.val);
        self.uniq_sort();
    }

    /// Remove, for each value of `other`, the first equal value of `self`
    /// (if any). Order-preserving.
    pub fn delete(&mut self, other: &Community) {
        for w in &other.val {
            if let Some(pos) = self.val.iter().position(|x| x == w) {
                self.val.remove(pos);
            }
        }
        self.str = OnceCell::new();
    }

    /// Sum of all payload bytes. Weak, but stable under sorting (the byte
    /// multiset does not change) and cheap; collisions are resolved by full
    /// equality in the store.
    pub fn byte_sum(&self) -> u32 {
        self.val
            .iter()
            .flatten()
            .fold(0u32, |key, b| key.wrapping_add(*b as u32))
    }

    /// The canonical textual form, computed once and cached. An empty
    /// community stringifies to the empty string.
    pub fn str(&self) -> &str {
        self.str.get_or_init(|| self.render())
    }

    fn render(&self) -> String {
        self.values()
            .map(|v| match v {
                INTERNET => "internet".to_string(),
                NO_EXPORT => "no-export".to_string(),
                NO_ADVERTISE => "no-advertise".to_string(),
                LOCAL_AS => "local-AS".to_string(),
                v => format!("{}:{}", v >> 16, v & 0xFFFF),
            })
            .join(" ")
    }
}

impl PartialEq for Community {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl Eq for Community {}

impl Hash for Community {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.val.hash(state);
    }
}

impl std::fmt::Debug for Community {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Community({})", self.render())
    }
}

impl std::fmt::Display for Community {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.str())
    }
}

/// Parse a single numeric token: `LOW` or `HIGH:LOW`, both components
/// decimal in `[0, 65535]`.
fn parse_numeric(token: &str) -> Result<u32, CommunityError> {
    let mut parts = token.split(':');
    // split always yields at least one part
    let first = parts.next().unwrap_or_default();
    let second = parts.next();
    if parts.next().is_some() {
        // more than one separator
        return Err(CommunityError::UnknownToken(token.to_string()));
    }
    let component = |s: &str| -> Result<u32, CommunityError> {
        let v: u32 = s
            .parse()
            .map_err(|_| CommunityError::UnknownToken(token.to_string()))?;
        if v > 0xFFFF {
            return Err(CommunityError::OutOfRange(token.to_string()));
        }
        Ok(v)
    };
    match second {
        None => component(first),
        Some(low) => Ok((component(first)? << 16) | component(low)?),
    }
}

impl std::str::FromStr for Community {
    type Err = CommunityError;

    /// Parse the textual form: whitespace-separated tokens, each either a
    /// well-known mnemonic or `HIGH:LOW` / `LOW`. Any unknown token fails the
    /// whole parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut com = Community::new();
        let mut seen = false;
        for token in s.split_whitespace() {
            seen = true;
            let val = match token {
                "internet" => INTERNET,
                "no-export" => NO_EXPORT,
                "no-advertise" => NO_ADVERTISE,
                "local-AS" => LOCAL_AS,
                t if t.starts_with(|c: char| c.is_ascii_digit()) => parse_numeric(t)?,
                t => return Err(CommunityError::UnknownToken(t.to_string())),
            };
            com.add_val(val);
        }
        if !seen {
            return Err(CommunityError::Empty);
        }
        com.uniq_sort();
        Ok(com)
    }
}

impl InternPayload for Community {
    const CACHED: bool = true;

    fn fresh() -> Self {
        Community::new()
    }

    fn duplicate(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn cache_key(&self) -> u32 {
        self.byte_sum()
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

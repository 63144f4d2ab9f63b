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

//! Nexthop records and the counted nexthop list.

use crate::types::{Ifindex, RouteType, IFINDEX_INTERNAL};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Where to send packets matching a route: a gateway address, an interface,
/// or a blackhole. A nexthop may additionally carry the result of a recursive
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nexthop {
    /// The nexthop is alive: it resolved against the RIB and its interface
    /// (if any) is up. Only active nexthops are eligible for the FIB.
    pub active: bool,
    /// The nexthop is installed in the FIB.
    pub fib: bool,
    /// The gateway was resolved through another (non-connected) route; the
    /// `r*` fields describe the resolution.
    pub recursive: bool,
    /// Stub nexthop of a blackhole route. Excludes gateway and interface.
    pub blackhole: bool,
    /// Gateway address, when the nexthop routes via a neighbor.
    pub gate: Option<IpAddr>,
    /// Source address to use, if possible.
    pub src: Option<IpAddr>,
    /// Interface index, or [`IFINDEX_INTERNAL`].
    pub ifindex: Ifindex,
    /// Protocol of the route the gateway resolved through.
    pub rtype: Option<RouteType>,
    /// Interface index of the resolving route.
    pub rifindex: Ifindex,
    /// Gateway of the resolving route.
    pub rgate: Option<IpAddr>,
}

impl Default for Nexthop {
    fn default() -> Self {
        Self {
            active: false,
            fib: false,
            recursive: false,
            blackhole: false,
            gate: None,
            src: None,
            ifindex: IFINDEX_INTERNAL,
            rtype: None,
            rifindex: IFINDEX_INTERNAL,
            rgate: None,
        }
    }
}

impl Nexthop {
    /// A new nexthop with no gateway and the internal interface sentinel.
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway nexthop, optionally with a source address and an interface.
    pub fn gateway(gate: IpAddr, src: Option<IpAddr>, ifindex: Ifindex) -> Self {
        Self {
            gate: Some(gate),
            src,
            ifindex,
            ..Self::default()
        }
    }

    /// A directly-attached interface nexthop.
    pub fn interface(ifindex: Ifindex) -> Self {
        Self {
            ifindex,
            ..Self::default()
        }
    }

    /// A blackhole nexthop.
    pub fn blackhole() -> Self {
        Self {
            blackhole: true,
            ..Self::default()
        }
    }

    /// Drop any state derived by nexthop activation, keeping the
    /// configuration (gateway, source, interface) intact.
    pub fn reset_resolution(&mut self) {
        self.active = false;
        self.recursive = false;
        self.rtype = None;
        self.rifindex = IFINDEX_INTERNAL;
        self.rgate = None;
    }

    /// Structural equality between two nexthops.
    ///
    /// If either side is a blackhole, both must be (nothing else matters).
    /// Otherwise interface indices must agree, gateways must agree under the
    /// either-present-then-both rule, and if either side is recursive, both
    /// must be and the resolving interface and gateway must agree too.
    pub fn same(&self, other: &Nexthop) -> bool {
        if self.blackhole || other.blackhole {
            return self.blackhole && other.blackhole;
        }
        if self.ifindex != other.ifindex {
            return false;
        }
        if self.gate.is_some() || other.gate.is_some() {
            match (self.gate, other.gate) {
                (Some(a), Some(b)) if a == b => {}
                _ => return false,
            }
        }
        if self.recursive || other.recursive {
            if !(self.recursive && other.recursive) {
                return false;
            }
            if self.rifindex != other.rifindex {
                return false;
            }
            if self.rgate.is_some() || other.rgate.is_some() {
                match (self.rgate, other.rgate) {
                    (Some(a), Some(b)) if a == b => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

/// An owned list of nexthops whose length *is* the nexthop counter, so the
/// count can never drift from the list content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexthopList(Vec<Nexthop>);

impl NexthopList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a nexthop at the tail.
    pub fn add(&mut self, nexthop: Nexthop) {
        self.0.push(nexthop);
    }

    /// Unlink the first nexthop structurally equal to `nexthop` and return
    /// it, or `None` when the list holds no such nexthop.
    pub fn delete(&mut self, nexthop: &Nexthop) -> Option<Nexthop> {
        let pos = self.0.iter().position(|nh| nh.same(nexthop))?;
        Some(self.0.remove(pos))
    }

    /// Whether the list holds a nexthop structurally equal to `nexthop`.
    pub fn contains_same(&self, nexthop: &Nexthop) -> bool {
        self.0.iter().any(|nh| nh.same(nexthop))
    }

    /// Unlink and return the first nexthop satisfying `pred`.
    pub fn remove_first<F: FnMut(&Nexthop) -> bool>(&mut self, pred: F) -> Option<Nexthop> {
        let pos = self.0.iter().position(pred)?;
        Some(self.0.remove(pos))
    }

    /// Total number of nexthops.
    pub fn num(&self) -> usize {
        self.0.len()
    }

    /// Number of active nexthops.
    pub fn num_active(&self) -> usize {
        self.0.iter().filter(|nh| nh.active).count()
    }

    /// Number of nexthops installed in the FIB.
    pub fn num_fib(&self) -> usize {
        self.0.iter().filter(|nh| nh.fib).count()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the nexthops in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Nexthop> {
        self.0.iter()
    }

    /// Iterate mutably over the nexthops in list order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Nexthop> {
        self.0.iter_mut()
    }
}

impl<'a> IntoIterator for &'a NexthopList {
    type Item = &'a Nexthop;
    type IntoIter = std::slice::Iter<'a, Nexthop>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Nexthop> for NexthopList {
    fn from_iter<I: IntoIterator<Item = Nexthop>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

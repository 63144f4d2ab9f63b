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

//! Module containing all shared type definitions

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Address Family Identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Afi {
    /// IPv4
    Ip,
    /// IPv6
    Ip6,
}

impl std::fmt::Display for Afi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Afi::Ip => write!(f, "ip"),
            Afi::Ip6 => write!(f, "ipv6"),
        }
    }
}

/// Subsequent Address Family Identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Safi {
    /// Unicast routing
    Unicast,
    /// Multicast RPF
    Multicast,
}

impl std::fmt::Display for Safi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Safi::Unicast => write!(f, "unicast"),
            Safi::Multicast => write!(f, "multicast"),
        }
    }
}

/// VRF identifier. The default routing instance is [`VrfId::DEFAULT`].
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VrfId(pub u32);

impl VrfId {
    /// The default routing instance.
    pub const DEFAULT: VrfId = VrfId(0);
}

impl std::fmt::Display for VrfId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vrf{}", self.0)
    }
}

impl From<u32> for VrfId {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

/// Interface index. Index 0 ([`IFINDEX_INTERNAL`]) means "no interface".
pub type Ifindex = u32;

/// Sentinel interface index for nexthops that are not bound to an interface.
pub const IFINDEX_INTERNAL: Ifindex = 0;

/// Administrative distance that makes a route unusable.
pub const DISTANCE_INFINITY: u8 = 255;

/// Protocol that originated a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RouteType {
    /// Route installed by the system itself.
    System,
    /// Route learned from the kernel FIB.
    Kernel,
    /// Directly connected network.
    Connect,
    /// Statically configured route.
    Static,
    /// RIP
    Rip,
    /// RIPng
    Ripng,
    /// OSPFv2
    Ospf,
    /// OSPFv3
    Ospf6,
    /// IS-IS
    Isis,
    /// BGP (iBGP and eBGP)
    Bgp,
}

/// All route types, in protocol order.
pub const ROUTE_TYPES: [RouteType; 10] = [
    RouteType::System,
    RouteType::Kernel,
    RouteType::Connect,
    RouteType::Static,
    RouteType::Rip,
    RouteType::Ripng,
    RouteType::Ospf,
    RouteType::Ospf6,
    RouteType::Isis,
    RouteType::Bgp,
];

lazy_static! {
    static ref ROUTE_TYPE_BY_NAME: HashMap<&'static str, RouteType> =
        ROUTE_TYPES.iter().map(|t| (t.name(), *t)).collect();
}

impl RouteType {
    /// Default administrative distance assigned to routes of this protocol
    /// when the originator does not supply one.
    pub fn default_distance(&self) -> u8 {
        match self {
            RouteType::System => 0,
            RouteType::Kernel => 0,
            RouteType::Connect => 0,
            RouteType::Static => 1,
            RouteType::Rip => 120,
            RouteType::Ripng => 120,
            RouteType::Ospf => 110,
            RouteType::Ospf6 => 110,
            RouteType::Isis => 115,
            RouteType::Bgp => 20,
        }
    }

    /// Meta-queue sub-queue this protocol is processed on. Lower sub-queues
    /// are always drained first.
    pub fn sub_queue(&self) -> usize {
        match self {
            RouteType::Connect | RouteType::Kernel => 0,
            RouteType::Static => 1,
            RouteType::Rip
            | RouteType::Ripng
            | RouteType::Ospf
            | RouteType::Ospf6
            | RouteType::Isis => 2,
            RouteType::Bgp => 3,
            RouteType::System => 4,
        }
    }

    /// Selection preference between protocols at equal distance and metric.
    /// Lower is better; follows the sub-queue order.
    pub fn preference(&self) -> u8 {
        self.sub_queue() as u8
    }

    /// Single-character code used in route listings.
    pub fn route_char(&self) -> char {
        match self {
            RouteType::System => 'X',
            RouteType::Kernel => 'K',
            RouteType::Connect => 'C',
            RouteType::Static => 'S',
            RouteType::Rip | RouteType::Ripng => 'R',
            RouteType::Ospf | RouteType::Ospf6 => 'O',
            RouteType::Isis => 'I',
            RouteType::Bgp => 'B',
        }
    }

    /// Lower-case protocol name, as used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            RouteType::System => "system",
            RouteType::Kernel => "kernel",
            RouteType::Connect => "connected",
            RouteType::Static => "static",
            RouteType::Rip => "rip",
            RouteType::Ripng => "ripng",
            RouteType::Ospf => "ospf",
            RouteType::Ospf6 => "ospf6",
            RouteType::Isis => "isis",
            RouteType::Bgp => "bgp",
        }
    }
}

impl std::fmt::Display for RouteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RouteType {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ROUTE_TYPE_BY_NAME
            .get(s.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}

/// Error returned when a protocol name is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid protocol name \"{0}\"")]
pub struct UnknownProtocol(pub String);

/// Flags carried on a RIB entry. These are visible to clients; the internal
/// REMOVED status is kept separately on the entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFlags {
    /// The entry won best-route selection on its node.
    pub selected: bool,
    /// Matching packets are silently discarded.
    pub blackhole: bool,
    /// Matching packets are answered with ICMP unreachable.
    pub reject: bool,
    /// The route was installed into the kernel by this process. Used to
    /// recognise leftovers of a previous process lifetime.
    pub self_route: bool,
    /// The route changed during the last selection run.
    pub changed: bool,
}

/// Errors returned by the RIB core. The command boundary translates these
/// into diagnostics; the core itself never logs them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RibError {
    /// The VRF does not exist.
    #[error("no VRF with id {0}")]
    UnknownVrf(VrfId),
    /// No table is allocated for this (AFI, SAFI) pair.
    #[error("no {0}/{1} table in {2}")]
    NoTable(Afi, Safi, VrfId),
    /// The gateway family does not match the prefix family.
    #[error("prefix and nexthop address-family mismatch")]
    FamilyMismatch,
}

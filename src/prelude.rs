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

//! Convenience re-export of the things almost every user needs.

pub use crate::cmd::{
    exit_code, ip_protocol, ip_route, ip_route_flags, ipv6_route, ipv6_route_flags,
    ipv6_route_ifname, no_ip_protocol, no_ip_route, no_ip_route_flags, no_ipv6_route,
    no_ipv6_route_flags, no_ipv6_route_ifname, show_route, static_config, CmdResult, CmdWarning,
    ShowFilter, CMD_SUCCESS, CMD_WARNING,
};
pub use crate::community::{Community, CommunityError};
pub use crate::intern::{Floating, Handle, InternPayload, Store};
pub use crate::nexthop::{Nexthop, NexthopList};
pub use crate::rib::{
    FibSink, FibUpdate, NoopFib, RecordingFib, Rib, RibEntry, RouteLookup, RouteNode, StaticRoute,
    Vrf,
};
pub use crate::types::{
    Afi, Ifindex, RibError, RouteFlags, RouteType, Safi, VrfId, DISTANCE_INFINITY,
    IFINDEX_INTERNAL,
};

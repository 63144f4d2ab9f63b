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
use crate::nexthop::Nexthop;
use crate::rib::{FibUpdate, StaticRoute};
use crate::types::{Afi, RouteType, VrfId};

use pretty_assertions::assert_eq;

#[test]
fn community_survives_serde() {
    let c: Community = "no-export 65001:100 internet".parse().unwrap();
    let json = serde_json::to_string(&c).unwrap();
    let back: Community = serde_json::from_str(&json).unwrap();
    assert_eq!(c, back);
    // the cached string is not serialized but recomputed on demand
    assert_eq!(back.str(), "internet 65001:100 no-export");
}

#[test]
fn nexthop_survives_serde() {
    let nh = Nexthop::gateway("192.0.2.1".parse().unwrap(), None, 3);
    let json = serde_json::to_string(&nh).unwrap();
    let back: Nexthop = serde_json::from_str(&json).unwrap();
    assert_eq!(nh, back);
}

#[test]
fn static_route_survives_serde() {
    let si = StaticRoute {
        blackhole: false,
        reject: true,
        distance: 200,
        gate: None,
        ifname: Some("eth0".to_string()),
    };
    let json = serde_json::to_string(&si).unwrap();
    let back: StaticRoute = serde_json::from_str(&json).unwrap();
    assert_eq!(si, back);
}

#[test]
fn fib_update_survives_serde() {
    let update = FibUpdate::Uninstall {
        vrf: VrfId::DEFAULT,
        prefix: "10.0.0.0/8".parse().unwrap(),
        rtype: RouteType::Static,
    };
    let json = serde_json::to_string(&update).unwrap();
    let back: FibUpdate = serde_json::from_str(&json).unwrap();
    assert_eq!(update, back);
}

#[test]
fn plain_enums_survive_serde() {
    for ty in crate::types::ROUTE_TYPES {
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(serde_json::from_str::<RouteType>(&json).unwrap(), ty);
    }
    for afi in [Afi::Ip, Afi::Ip6] {
        let json = serde_json::to_string(&afi).unwrap();
        assert_eq!(serde_json::from_str::<Afi>(&json).unwrap(), afi);
    }
}

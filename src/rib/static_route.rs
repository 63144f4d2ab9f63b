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

//! Static route configuration.
//!
//! Configured static routes live in the per-VRF "stable", a sibling of the
//! route table keyed by the same prefixes. Every stable mutation synthesizes
//! the corresponding RIB change: adding a static route installs (or extends)
//! a [`RouteType::Static`] entry, deleting one withdraws the matching
//! nexthop or the whole entry.

use super::{AfiView, Rib, RibEntry};
use crate::nexthop::Nexthop;
use crate::types::{Afi, RibError, RouteType, Safi, VrfId, IFINDEX_INTERNAL};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One configured static route: a gateway, an interface name, or a
/// blackhole/reject discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Silently discard matching packets. Mutually exclusive with a gateway.
    pub blackhole: bool,
    /// Discard matching packets with ICMP unreachable. Implies a discard
    /// nexthop like [`StaticRoute::blackhole`].
    pub reject: bool,
    /// Administrative distance of the synthesized route.
    pub distance: u8,
    /// Gateway address, when the route points at a neighbor.
    pub gate: Option<IpAddr>,
    /// Outgoing interface name, when the route points at an interface.
    pub ifname: Option<String>,
}

impl StaticRoute {
    /// Whether this configuration entry describes the given gateway and
    /// interface name. Flags and distance are not compared.
    fn same_target(&self, gate: Option<IpAddr>, ifname: Option<&str>) -> bool {
        self.gate == gate && self.ifname.as_deref() == ifname
    }
}

impl Rib {
    /// Configure a static route and synthesize the matching RIB entry.
    ///
    /// Re-adding an identical route is a no-op. Re-adding the same target
    /// with a different distance or different flags replaces the previous
    /// configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn static_add(
        &mut self,
        prefix: IpNet,
        gate: Option<IpAddr>,
        ifname: Option<&str>,
        blackhole: bool,
        reject: bool,
        distance: u8,
        vrf_id: VrfId,
    ) -> Result<(), RibError> {
        if let Some(g) = gate {
            let same_family = matches!(
                (prefix, g),
                (IpNet::V4(_), IpAddr::V4(_)) | (IpNet::V6(_), IpAddr::V6(_))
            );
            if !same_family {
                return Err(RibError::FamilyMismatch);
            }
        }
        let si = StaticRoute {
            blackhole,
            reject,
            distance,
            gate,
            ifname: ifname.map(String::from),
        };
        match prefix.trunc() {
            IpNet::V4(p) => self.static_add_in::<Ipv4Net>(vrf_id, Safi::Unicast, p, si),
            IpNet::V6(p) => self.static_add_in::<Ipv6Net>(vrf_id, Safi::Unicast, p, si),
        }
    }

    /// Remove a static route matching (gateway/interface, distance) and
    /// withdraw the synthesized RIB entry. Deleting a route that is not
    /// configured succeeds silently.
    pub fn static_delete(
        &mut self,
        prefix: IpNet,
        gate: Option<IpAddr>,
        ifname: Option<&str>,
        distance: u8,
        vrf_id: VrfId,
    ) -> Result<(), RibError> {
        match prefix.trunc() {
            IpNet::V4(p) => self.static_delete_in::<Ipv4Net>(vrf_id, Safi::Unicast, p, gate, ifname, distance),
            IpNet::V6(p) => self.static_delete_in::<Ipv6Net>(vrf_id, Safi::Unicast, p, gate, ifname, distance),
        }
    }

    /// All configured static routes of one table, in prefix order.
    pub fn statics(&self, vrf_id: VrfId, afi: Afi, safi: Safi) -> Vec<(IpNet, &StaticRoute)> {
        match afi {
            Afi::Ip => self.statics_in::<Ipv4Net>(vrf_id, safi),
            Afi::Ip6 => self.statics_in::<Ipv6Net>(vrf_id, safi),
        }
    }

    fn statics_in<P: AfiView>(&self, vrf_id: VrfId, safi: Safi) -> Vec<(IpNet, &StaticRoute)> {
        let Some(vrf) = self.vrfs.get(&vrf_id) else {
            return Vec::new();
        };
        let Some(stable) = P::view(vrf).stable.get(&safi) else {
            return Vec::new();
        };
        stable
            .iter()
            .flat_map(|(p, list)| list.iter().map(move |si| (p.to_ipnet(), si)))
            .collect()
    }

    fn static_add_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        si: StaticRoute,
    ) -> Result<(), RibError> {
        let mut replaced = None;
        {
            let vrf = self
                .vrfs
                .get_mut(&vrf_id)
                .ok_or(RibError::UnknownVrf(vrf_id))?;
            let stable = P::view_mut(vrf)
                .stable
                .get_mut(&safi)
                .ok_or(RibError::NoTable(P::AFI, safi, vrf_id))?;
            if stable.get(&prefix).is_none() {
                stable.insert(prefix, Vec::new());
            }
            let Some(list) = stable.get_mut(&prefix) else {
                unreachable!()
            };
            if list.contains(&si) {
                return Ok(());
            }
            if let Some(pos) = list
                .iter()
                .position(|s| s.same_target(si.gate, si.ifname.as_deref()))
            {
                replaced = Some(list.remove(pos));
            }
            list.push(si.clone());
        }
        if let Some(old) = replaced {
            self.static_uninstall_in::<P>(vrf_id, safi, prefix, &old);
        }
        self.static_install_in::<P>(vrf_id, safi, prefix, &si);
        Ok(())
    }

    fn static_delete_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        gate: Option<IpAddr>,
        ifname: Option<&str>,
        distance: u8,
    ) -> Result<(), RibError> {
        let removed = {
            let vrf = self
                .vrfs
                .get_mut(&vrf_id)
                .ok_or(RibError::UnknownVrf(vrf_id))?;
            let stable = P::view_mut(vrf)
                .stable
                .get_mut(&safi)
                .ok_or(RibError::NoTable(P::AFI, safi, vrf_id))?;
            let Some(list) = stable.get_mut(&prefix) else {
                return Ok(());
            };
            let Some(pos) = list
                .iter()
                .position(|s| s.same_target(gate, ifname) && s.distance == distance)
            else {
                return Ok(());
            };
            let si = list.remove(pos);
            if list.is_empty() {
                stable.remove(&prefix);
            }
            si
        };
        self.static_uninstall_in::<P>(vrf_id, safi, prefix, &removed);
        Ok(())
    }

    /// Build the nexthop a static route synthesizes. A blackhole or reject
    /// route gets a discard nexthop without a gateway; an interface route
    /// resolves the name now (an unknown name yields the internal sentinel
    /// and stays inactive until the interface appears and the RIB is
    /// revalidated).
    fn make_static_nexthop(&self, si: &StaticRoute) -> Nexthop {
        if si.blackhole || si.reject {
            return Nexthop::blackhole();
        }
        let ifindex = si
            .ifname
            .as_deref()
            .and_then(|name| self.ifindex_of(name))
            .unwrap_or(IFINDEX_INTERNAL);
        match si.gate {
            Some(gate) => Nexthop::gateway(gate, None, ifindex),
            None => Nexthop::interface(ifindex),
        }
    }

    fn static_nexthop_matches(nh: &Nexthop, si: &StaticRoute, ifindex: u32) -> bool {
        if si.blackhole || si.reject {
            return nh.blackhole;
        }
        if let Some(gate) = si.gate {
            return nh.gate == Some(gate);
        }
        !nh.blackhole && nh.gate.is_none() && (ifindex == IFINDEX_INTERNAL || nh.ifindex == ifindex)
    }

    fn static_install_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        si: &StaticRoute,
    ) {
        let nexthop = self.make_static_nexthop(si);
        let mut appended = false;
        {
            if let Some(vrf) = self.vrfs.get_mut(&vrf_id) {
                if let Some(rt) = P::view_mut(vrf).table.get_mut(&safi) {
                    if let Some(node) = rt.map.get_mut(&prefix) {
                        for e in node.ribs.iter_mut() {
                            if !e.removed
                                && e.rtype == RouteType::Static
                                && e.distance == si.distance
                            {
                                e.nexthops.add(nexthop.clone());
                                e.flags.blackhole |= si.blackhole;
                                e.flags.reject |= si.reject;
                                e.flags.changed = true;
                                appended = true;
                                break;
                            }
                        }
                    }
                }
            }
        }
        if appended {
            self.queue_node_in::<P>(vrf_id, safi, prefix, RouteType::Static.sub_queue());
            return;
        }
        let mut entry = RibEntry::new(RouteType::Static);
        entry.distance = si.distance;
        entry.flags.blackhole = si.blackhole;
        entry.flags.reject = si.reject;
        entry.nexthops.add(nexthop);
        let _ = self.rib_add_in::<P>(vrf_id, safi, prefix, entry);
    }

    fn static_uninstall_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        si: &StaticRoute,
    ) {
        let ifindex = si
            .ifname
            .as_deref()
            .and_then(|name| self.ifindex_of(name))
            .unwrap_or(IFINDEX_INTERNAL);
        let mut queue = false;
        {
            let Some(vrf) = self.vrfs.get_mut(&vrf_id) else {
                return;
            };
            let Some(rt) = P::view_mut(vrf).table.get_mut(&safi) else {
                return;
            };
            let Some(node) = rt.map.get_mut(&prefix) else {
                return;
            };
            for e in node.ribs.iter_mut() {
                if e.removed || e.rtype != RouteType::Static || e.distance != si.distance {
                    continue;
                }
                if e.nexthops.num() > 1 {
                    queue = e
                        .nexthops
                        .remove_first(|nh| Self::static_nexthop_matches(nh, si, ifindex))
                        .is_some();
                    e.flags.changed |= queue;
                } else {
                    e.removed = true;
                    queue = true;
                }
                break;
            }
        }
        if queue {
            self.queue_node_in::<P>(vrf_id, safi, prefix, RouteType::Static.sub_queue());
        }
    }
}

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

//! The Routing Information Base.
//!
//! Routes are kept per (VRF, AFI, SAFI) in radix-style prefix tables. Each
//! route node carries a list of candidate [`RibEntry`] records, one per
//! originating protocol; best-route selection marks exactly one of them
//! selected. All `rib_add` variants implicitly withdraw any prior entry of
//! the same protocol at the same prefix, which makes them idempotent per
//! protocol.
//!
//! Changes never take effect inline: the affected node is appended to the
//! [meta-queue](crate::rib::queue) and reprocessed when the queue is drained.
//! Processing runs nexthop activation and selection, and drives the
//! [`FibSink`] for changed selections.

mod static_route;
pub use static_route::StaticRoute;

pub mod queue;
use queue::{MetaQueue, NodeKey, SubQueueMask};

use crate::community::Community;
use crate::intern::{Handle, Store};
use crate::nexthop::{Nexthop, NexthopList};
use crate::types::{
    Afi, Ifindex, RibError, RouteFlags, RouteType, Safi, VrfId, IFINDEX_INTERNAL,
};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use log::{debug, trace, warn};
use prefix_trie::PrefixMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::time::SystemTime;

/// A prefix type usable as a RIB table key. Implemented for [`Ipv4Net`] and
/// [`Ipv6Net`]; everything generic over the address family is generic over
/// this trait.
pub trait RibPrefix:
    prefix_trie::Prefix + Copy + Ord + Eq + std::hash::Hash + std::fmt::Debug + std::fmt::Display + 'static
{
    /// Address family of this prefix type.
    const AFI: Afi;

    /// Host-length prefix for an address of this family, or `None` on a
    /// family mismatch.
    fn host(addr: IpAddr) -> Option<Self>;

    /// Prefix of the given length containing `addr`, with host bits zeroed.
    fn from_addr_len(addr: IpAddr, len: u8) -> Option<Self>;

    /// The prefix with all host bits zeroed.
    fn apply_mask(self) -> Self;

    /// The (masked) network address.
    fn network_addr(&self) -> IpAddr;

    /// Prefix length.
    fn plen(&self) -> u8;

    /// Longest possible prefix length of this family.
    fn max_plen() -> u8;

    /// Whether this is a host-length prefix.
    fn is_host(&self) -> bool {
        self.plen() == Self::max_plen()
    }

    /// Whether the prefix covers the given address.
    fn contains_addr(&self, addr: IpAddr) -> bool;

    /// Type-erase into an [`IpNet`].
    fn to_ipnet(self) -> IpNet;

    /// Recover from an [`IpNet`] of the matching family.
    fn from_ipnet(net: IpNet) -> Option<Self>;
}

impl RibPrefix for Ipv4Net {
    const AFI: Afi = Afi::Ip;

    fn host(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V4(a) => Ipv4Net::new(a, 32).ok(),
            IpAddr::V6(_) => None,
        }
    }

    fn from_addr_len(addr: IpAddr, len: u8) -> Option<Self> {
        match addr {
            IpAddr::V4(a) => Ipv4Net::new(a, len).ok().map(|p| p.trunc()),
            IpAddr::V6(_) => None,
        }
    }

    fn apply_mask(self) -> Self {
        self.trunc()
    }

    fn network_addr(&self) -> IpAddr {
        IpAddr::V4(self.network())
    }

    fn plen(&self) -> u8 {
        self.prefix_len()
    }

    fn max_plen() -> u8 {
        32
    }

    fn contains_addr(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(a) => self.contains(&a),
            IpAddr::V6(_) => false,
        }
    }

    fn to_ipnet(self) -> IpNet {
        IpNet::V4(self)
    }

    fn from_ipnet(net: IpNet) -> Option<Self> {
        match net {
            IpNet::V4(p) => Some(p),
            IpNet::V6(_) => None,
        }
    }
}

impl RibPrefix for Ipv6Net {
    const AFI: Afi = Afi::Ip6;

    fn host(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V6(a) => Ipv6Net::new(a, 128).ok(),
            IpAddr::V4(_) => None,
        }
    }

    fn from_addr_len(addr: IpAddr, len: u8) -> Option<Self> {
        match addr {
            IpAddr::V6(a) => Ipv6Net::new(a, len).ok().map(|p| p.trunc()),
            IpAddr::V4(_) => None,
        }
    }

    fn apply_mask(self) -> Self {
        self.trunc()
    }

    fn network_addr(&self) -> IpAddr {
        IpAddr::V6(self.network())
    }

    fn plen(&self) -> u8 {
        self.prefix_len()
    }

    fn max_plen() -> u8 {
        128
    }

    fn contains_addr(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V6(a) => self.contains(&a),
            IpAddr::V4(_) => false,
        }
    }

    fn to_ipnet(self) -> IpNet {
        IpNet::V6(self)
    }

    fn from_ipnet(net: IpNet) -> Option<Self> {
        match net {
            IpNet::V6(p) => Some(p),
            IpNet::V4(_) => None,
        }
    }
}

/// Crate-internal: select the per-family tables of a [`Vrf`].
pub(crate) trait AfiView: RibPrefix {
    fn view(vrf: &Vrf) -> &AfiTables<Self>;
    fn view_mut(vrf: &mut Vrf) -> &mut AfiTables<Self>;
}

impl AfiView for Ipv4Net {
    fn view(vrf: &Vrf) -> &AfiTables<Self> {
        &vrf.v4
    }

    fn view_mut(vrf: &mut Vrf) -> &mut AfiTables<Self> {
        &mut vrf.v4
    }
}

impl AfiView for Ipv6Net {
    fn view(vrf: &Vrf) -> &AfiTables<Self> {
        &vrf.v6
    }

    fn view_mut(vrf: &mut Vrf) -> &mut AfiTables<Self> {
        &mut vrf.v6
    }
}

/// One candidate route at a node, originated by one protocol.
#[derive(Debug, Clone)]
pub struct RibEntry {
    /// Protocol that originated this route.
    pub rtype: RouteType,
    /// Kernel table the route belongs to. Entries of foreign tables are
    /// weeded out by [`Rib::rib_weed_tables`].
    pub table: u32,
    /// Metric, compared after administrative distance.
    pub metric: u32,
    /// Administrative distance; the primary selection criterion.
    pub distance: u8,
    /// Client-visible flags.
    pub flags: RouteFlags,
    /// The entry was withdrawn and awaits freeing by the meta-queue.
    pub(crate) removed: bool,
    /// When the entry was inserted.
    pub uptime: SystemTime,
    /// Insertion sequence, used as the final selection tie-breaker (most
    /// recent wins).
    pub(crate) seq: u64,
    /// External references; a removed entry is only freed once this drops to
    /// zero.
    pub(crate) refcnt: u64,
    /// The nexthops of this route.
    pub nexthops: NexthopList,
    /// Shared communities attribute, held as a counted store reference and
    /// released on drop.
    pub community: Option<Handle<Community>>,
}

impl RibEntry {
    /// A new entry with the protocol's default distance and no nexthops.
    pub fn new(rtype: RouteType) -> Self {
        Self {
            rtype,
            table: 0,
            metric: 0,
            distance: rtype.default_distance(),
            flags: RouteFlags::default(),
            removed: false,
            uptime: SystemTime::now(),
            seq: 0,
            refcnt: 0,
            nexthops: NexthopList::new(),
            community: None,
        }
    }

    /// Whether the entry was withdrawn and awaits freeing.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Current external reference count.
    pub fn refcnt(&self) -> u64 {
        self.refcnt
    }

    /// Selection key: smaller wins. Distance, then metric, then protocol
    /// preference (sub-queue order), then recency (most recent first).
    fn selection_key(&self) -> (u8, u32, u8, std::cmp::Reverse<u64>) {
        (
            self.distance,
            self.metric,
            self.rtype.preference(),
            std::cmp::Reverse(self.seq),
        )
    }
}

/// A route node: the candidate entries for one prefix, plus the meta-queue
/// bits of the node.
#[derive(Debug, Default)]
pub struct RouteNode {
    ribs: Vec<RibEntry>,
    pub(crate) queued: SubQueueMask,
}

impl RouteNode {
    /// Iterate over all entries, including removed ones.
    pub fn entries(&self) -> std::slice::Iter<'_, RibEntry> {
        self.ribs.iter()
    }

    /// The currently selected entry, if selection has produced one.
    pub fn selected(&self) -> Option<&RibEntry> {
        self.ribs.iter().find(|e| !e.removed && e.flags.selected)
    }

    /// Number of entries (including removed ones awaiting freeing).
    pub fn len(&self) -> usize {
        self.ribs.len()
    }

    /// Whether the node has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.ribs.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct RouteTable<P: RibPrefix> {
    pub(crate) map: PrefixMap<P, RouteNode>,
}

impl<P: RibPrefix> RouteTable<P> {
    fn new() -> Self {
        Self {
            map: PrefixMap::new(),
        }
    }

    fn node_mut_or_default(&mut self, prefix: P) -> &mut RouteNode {
        if self.map.get(&prefix).is_none() {
            self.map.insert(prefix, RouteNode::default());
        }
        match self.map.get_mut(&prefix) {
            Some(node) => node,
            None => unreachable!(),
        }
    }
}

pub(crate) type StaticTable<P> = PrefixMap<P, Vec<StaticRoute>>;

/// The per-family tables of a VRF. Only the unicast tables are allocated;
/// lookups for other SAFIs report a missing table.
#[derive(Debug)]
pub(crate) struct AfiTables<P: RibPrefix> {
    pub(crate) table: BTreeMap<Safi, RouteTable<P>>,
    pub(crate) stable: BTreeMap<Safi, StaticTable<P>>,
}

impl<P: RibPrefix> AfiTables<P> {
    fn new() -> Self {
        let mut table = BTreeMap::new();
        table.insert(Safi::Unicast, RouteTable::new());
        let mut stable = BTreeMap::new();
        stable.insert(Safi::Unicast, StaticTable::new());
        Self { table, stable }
    }
}

/// A Virtual Routing and Forwarding instance: an independent set of route
/// tables and static-route configuration, keyed by [`VrfId`].
#[derive(Debug)]
pub struct Vrf {
    /// Identifier of this instance.
    pub id: VrfId,
    /// Routing table name.
    pub name: String,
    /// Free-form description.
    pub desc: String,
    /// Kernel FIB table this instance installs into.
    pub fib_id: u32,
    v4: AfiTables<Ipv4Net>,
    v6: AfiTables<Ipv6Net>,
}

impl Vrf {
    /// A new, empty VRF with unicast tables for both address families.
    pub fn new(id: VrfId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            desc: String::new(),
            fib_id: 0,
            v4: AfiTables::new(),
            v6: AfiTables::new(),
        }
    }
}

/// A network interface, as learned from the platform. Interface discovery is
/// external; the RIB only consumes index, name and link state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Kernel interface index.
    pub ifindex: Ifindex,
    /// Interface name.
    pub name: String,
    /// Whether the link is up.
    pub up: bool,
}

#[derive(Debug, Default)]
struct IfTable {
    by_index: BTreeMap<Ifindex, Interface>,
}

/// Consumer of FIB update instructions emitted by the meta-queue for changed
/// selections. Kernel programming is external; tests use [`RecordingFib`].
pub trait FibSink {
    /// A newly selected route must be installed.
    fn install(&mut self, vrf: VrfId, prefix: IpNet, entry: &RibEntry);
    /// A previously selected route must be withdrawn.
    fn uninstall(&mut self, vrf: VrfId, prefix: IpNet, entry: &RibEntry);
}

/// A [`FibSink`] that discards all instructions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFib;

impl FibSink for NoopFib {
    fn install(&mut self, _: VrfId, _: IpNet, _: &RibEntry) {}

    fn uninstall(&mut self, _: VrfId, _: IpNet, _: &RibEntry) {}
}

/// One recorded FIB instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FibUpdate {
    /// Install the given route.
    Install {
        /// VRF of the route.
        vrf: VrfId,
        /// The affected prefix.
        prefix: IpNet,
        /// Originating protocol.
        rtype: RouteType,
        /// Administrative distance.
        distance: u8,
        /// Metric.
        metric: u32,
        /// Snapshot of the nexthops at installation time.
        nexthops: NexthopList,
    },
    /// Withdraw the given route.
    Uninstall {
        /// VRF of the route.
        vrf: VrfId,
        /// The affected prefix.
        prefix: IpNet,
        /// Originating protocol.
        rtype: RouteType,
    },
}

/// A [`FibSink`] that records every instruction, in order.
#[derive(Debug, Default)]
pub struct RecordingFib {
    /// All instructions received so far.
    pub updates: Vec<FibUpdate>,
}

impl FibSink for RecordingFib {
    fn install(&mut self, vrf: VrfId, prefix: IpNet, entry: &RibEntry) {
        self.updates.push(FibUpdate::Install {
            vrf,
            prefix,
            rtype: entry.rtype,
            distance: entry.distance,
            metric: entry.metric,
            nexthops: entry.nexthops.clone(),
        });
    }

    fn uninstall(&mut self, vrf: VrfId, prefix: IpNet, entry: &RibEntry) {
        self.updates.push(FibUpdate::Uninstall {
            vrf,
            prefix,
            rtype: entry.rtype,
        });
    }
}

/// Relation between a gateway and the RIB, as reported by
/// [`Rib::rib_lookup_route`].
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteLookup {
    /// The table for the prefix family does not exist.
    Error = -1,
    /// The selected route carries exactly this gateway.
    FoundExact = 0,
    /// The prefix is known, but not with this gateway.
    FoundNoGate = 1,
    /// The prefix is known as a connected route.
    FoundConnected = 2,
    /// The prefix is not in the RIB.
    NotFound = 3,
}

impl RouteLookup {
    /// Numeric code of this outcome.
    pub fn code(self) -> i8 {
        self as i8
    }
}

/// Result of a recursive gateway resolution.
struct Resolution {
    rtype: RouteType,
    rifindex: Ifindex,
    rgate: Option<IpAddr>,
    connected: bool,
}

/// The RIB core of one daemon process: all VRFs, the meta-queue, the
/// interface view and the process-wide attribute store.
///
/// Everything runs on a single thread; operations are atomic by virtue of
/// non-preemption. The attribute store and the tables are created here and
/// torn down when the `Rib` is dropped, so shutdown is deterministic.
#[derive(Debug)]
pub struct Rib {
    vrfs: BTreeMap<VrfId, Vrf>,
    queue: MetaQueue,
    ifaces: IfTable,
    communities: Store<Community>,
    route_maps: BTreeMap<(Afi, Option<RouteType>), String>,
    seq: u64,
    pending_weed: Option<VecDeque<NodeKey>>,
    pending_sweep: Option<VecDeque<NodeKey>>,
}

impl Default for Rib {
    fn default() -> Self {
        Self::new()
    }
}

impl Rib {
    /// A new RIB with the default VRF and an empty attribute store.
    pub fn new() -> Self {
        let mut vrfs = BTreeMap::new();
        vrfs.insert(VrfId::DEFAULT, Vrf::new(VrfId::DEFAULT, "Default-IP-Routing-Table"));
        Self {
            vrfs,
            queue: MetaQueue::default(),
            ifaces: IfTable::default(),
            communities: Store::new(),
            route_maps: BTreeMap::new(),
            seq: 0,
            pending_weed: None,
            pending_sweep: None,
        }
    }

    /// The process-wide community attribute store.
    pub fn communities(&self) -> &Store<Community> {
        &self.communities
    }

    /// Create a VRF (or return the existing one with this id).
    pub fn vrf_add(&mut self, id: VrfId, name: impl Into<String>) -> &mut Vrf {
        self.vrfs.entry(id).or_insert_with(|| Vrf::new(id, name))
    }

    /// Look up a VRF by id.
    pub fn vrf_lookup(&self, id: VrfId) -> Option<&Vrf> {
        self.vrfs.get(&id)
    }

    /*
     * Interface inputs
     */

    /// Register an interface (or update its name and state).
    pub fn if_add(&mut self, name: impl Into<String>, ifindex: Ifindex, up: bool) {
        self.ifaces.by_index.insert(
            ifindex,
            Interface {
                ifindex,
                name: name.into(),
                up,
            },
        );
    }

    /// Change the link state of an interface and schedule every route node
    /// for revalidation.
    pub fn if_set_state(&mut self, ifindex: Ifindex, up: bool) {
        if let Some(iface) = self.ifaces.by_index.get_mut(&ifindex) {
            if iface.up == up {
                return;
            }
            iface.up = up;
            self.rib_update();
        }
    }

    /// Name of an interface, if known.
    pub fn ifname(&self, ifindex: Ifindex) -> Option<&str> {
        self.ifaces.by_index.get(&ifindex).map(|i| i.name.as_str())
    }

    /// Index of an interface by name, if known.
    pub fn ifindex_of(&self, name: &str) -> Option<Ifindex> {
        self.ifaces
            .by_index
            .values()
            .find(|i| i.name == name)
            .map(|i| i.ifindex)
    }

    fn iface_up(&self, ifindex: Ifindex) -> bool {
        self.ifaces
            .by_index
            .get(&ifindex)
            .map(|i| i.up)
            .unwrap_or(false)
    }

    /*
     * Protocol route-map registry
     */

    /// Attach a route-map name to routes of one protocol (or `None` for
    /// any protocol) of the given family. Evaluation is external.
    pub fn set_protocol_route_map(
        &mut self,
        afi: Afi,
        proto: Option<RouteType>,
        name: impl Into<String>,
    ) {
        self.route_maps.insert((afi, proto), name.into());
    }

    /// The route-map name attached to a protocol, if any.
    pub fn protocol_route_map(&self, afi: Afi, proto: Option<RouteType>) -> Option<&str> {
        self.route_maps.get(&(afi, proto)).map(String::as_str)
    }

    /// Detach the route-map of a protocol. Missing attachment is fine.
    pub fn clear_protocol_route_map(&mut self, afi: Afi, proto: Option<RouteType>) {
        self.route_maps.remove(&(afi, proto));
    }

    /// Iterate over all protocol route-map attachments of one family.
    pub fn protocol_route_maps(
        &self,
        afi: Afi,
    ) -> impl Iterator<Item = (Option<RouteType>, &str)> + '_ {
        self.route_maps
            .iter()
            .filter(move |((a, _), _)| *a == afi)
            .map(|((_, p), name)| (*p, name.as_str()))
    }

    /*
     * Route input
     */

    /// Add a route with a single nexthop built from `gate`, `src` and
    /// `ifindex` (or a blackhole nexthop when `flags` say so).
    ///
    /// Any existing entry of the same protocol at this prefix is implicitly
    /// withdrawn first, so repeating the call is idempotent. The prefix is
    /// normalized (host bits zeroed) before insertion, and the node is
    /// enqueued on the protocol's sub-queue.
    #[allow(clippy::too_many_arguments)]
    pub fn rib_add(
        &mut self,
        rtype: RouteType,
        flags: RouteFlags,
        prefix: IpNet,
        gate: Option<IpAddr>,
        src: Option<IpAddr>,
        ifindex: Ifindex,
        vrf_id: VrfId,
        metric: u32,
        distance: u8,
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

        let mut entry = RibEntry::new(rtype);
        entry.flags = flags;
        entry.metric = metric;
        entry.distance = distance;
        let nexthop = if flags.blackhole || flags.reject {
            Nexthop::blackhole()
        } else {
            match gate {
                Some(g) => Nexthop::gateway(g, src, ifindex),
                None => Nexthop::interface(ifindex),
            }
        };
        entry.nexthops.add(nexthop);
        self.rib_add_multipath(vrf_id, prefix, entry)
    }

    /// Like [`Rib::rib_add`], but the caller supplies a pre-built entry with
    /// a full nexthop list. Same implicit-withdraw rule.
    pub fn rib_add_multipath(
        &mut self,
        vrf_id: VrfId,
        prefix: IpNet,
        entry: RibEntry,
    ) -> Result<(), RibError> {
        match prefix.trunc() {
            IpNet::V4(p) => self.rib_add_in::<Ipv4Net>(vrf_id, Safi::Unicast, p, entry),
            IpNet::V6(p) => self.rib_add_in::<Ipv6Net>(vrf_id, Safi::Unicast, p, entry),
        }
    }

    fn rib_add_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        mut entry: RibEntry,
    ) -> Result<(), RibError> {
        self.seq += 1;
        entry.seq = self.seq;
        let sub = entry.rtype.sub_queue();
        let rtype = entry.rtype;

        let vrf = self.vrfs.get_mut(&vrf_id).ok_or(RibError::UnknownVrf(vrf_id))?;
        if entry.table == 0 {
            entry.table = vrf.fib_id;
        }
        let tables = P::view_mut(vrf);
        let rt = tables
            .table
            .get_mut(&safi)
            .ok_or(RibError::NoTable(P::AFI, safi, vrf_id))?;
        let node = rt.node_mut_or_default(prefix);

        // implicit withdraw of the previous route of this protocol
        for old in node.ribs.iter_mut() {
            if !old.removed && old.rtype == rtype {
                old.removed = true;
                debug!(
                    "{} {}: implicit withdraw of previous {} route",
                    vrf_id, prefix, rtype
                );
            }
        }

        node.ribs.push(entry);
        self.queue_node_in::<P>(vrf_id, safi, prefix, sub);
        Ok(())
    }

    /// Withdraw the route of `rtype` at `prefix`. When `gate` or `ifindex`
    /// are given, the entry must additionally carry a matching nexthop. The
    /// entry is marked removed and the node enqueued; the actual freeing
    /// happens during queue processing. A delete without a matching entry
    /// succeeds silently.
    pub fn rib_delete(
        &mut self,
        rtype: RouteType,
        prefix: IpNet,
        gate: Option<IpAddr>,
        ifindex: Ifindex,
        vrf_id: VrfId,
    ) -> Result<(), RibError> {
        match prefix.trunc() {
            IpNet::V4(p) => self.rib_delete_in::<Ipv4Net>(vrf_id, Safi::Unicast, p, rtype, gate, ifindex),
            IpNet::V6(p) => self.rib_delete_in::<Ipv6Net>(vrf_id, Safi::Unicast, p, rtype, gate, ifindex),
        }
    }

    fn rib_delete_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        rtype: RouteType,
        gate: Option<IpAddr>,
        ifindex: Ifindex,
    ) -> Result<(), RibError> {
        let sub = rtype.sub_queue();
        let vrf = self.vrfs.get_mut(&vrf_id).ok_or(RibError::UnknownVrf(vrf_id))?;
        let tables = P::view_mut(vrf);
        let rt = tables
            .table
            .get_mut(&safi)
            .ok_or(RibError::NoTable(P::AFI, safi, vrf_id))?;
        let Some(node) = rt.map.get_mut(&prefix) else {
            debug!("{} {}: delete without matching node", vrf_id, prefix);
            return Ok(());
        };

        let mut found = false;
        for e in node.ribs.iter_mut() {
            if e.removed || e.rtype != rtype {
                continue;
            }
            let gate_ok = match gate {
                Some(g) => e.nexthops.iter().any(|nh| nh.gate == Some(g)),
                None => true,
            };
            let ifindex_ok =
                ifindex == IFINDEX_INTERNAL || e.nexthops.iter().any(|nh| nh.ifindex == ifindex);
            if gate_ok && ifindex_ok {
                e.removed = true;
                found = true;
                break;
            }
        }

        if found {
            self.queue_node_in::<P>(vrf_id, safi, prefix, sub);
        } else {
            debug!("{} {}: delete without matching {} entry", vrf_id, prefix, rtype);
        }
        Ok(())
    }

    /*
     * Lookups
     */

    /// Longest-prefix match in the default VRF, returning the covering
    /// prefix and its selected entry. Nodes without a selected entry are
    /// transparently skipped in favor of less specific ones.
    pub fn rib_match(&self, addr: IpAddr) -> Option<(IpNet, &RibEntry)> {
        match addr {
            IpAddr::V4(_) => self.rib_match_in::<Ipv4Net>(VrfId::DEFAULT, Safi::Unicast, addr),
            IpAddr::V6(_) => self.rib_match_in::<Ipv6Net>(VrfId::DEFAULT, Safi::Unicast, addr),
        }
    }

    fn rib_match_in<P: AfiView>(
        &self,
        vrf_id: VrfId,
        safi: Safi,
        addr: IpAddr,
    ) -> Option<(IpNet, &RibEntry)> {
        let vrf = self.vrfs.get(&vrf_id)?;
        let rt = P::view(vrf).table.get(&safi)?;
        let mut key = P::host(addr)?;
        loop {
            let (p, node) = rt.map.get_lpm(&key)?;
            if let Some(e) = node.selected() {
                return Some((p.to_ipnet(), e));
            }
            let plen = p.plen();
            if plen == 0 {
                return None;
            }
            key = P::from_addr_len(addr, plen - 1)?;
        }
    }

    /// Exact-prefix lookup in the default VRF, returning the selected entry.
    pub fn rib_lookup(&self, prefix: IpNet) -> Option<&RibEntry> {
        match prefix.trunc() {
            IpNet::V4(p) => self.rib_lookup_in::<Ipv4Net>(VrfId::DEFAULT, Safi::Unicast, p),
            IpNet::V6(p) => self.rib_lookup_in::<Ipv6Net>(VrfId::DEFAULT, Safi::Unicast, p),
        }
    }

    fn rib_lookup_in<P: AfiView>(
        &self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
    ) -> Option<&RibEntry> {
        let vrf = self.vrfs.get(&vrf_id)?;
        let rt = P::view(vrf).table.get(&safi)?;
        rt.map.get(&prefix)?.selected()
    }

    /// Describe the relation between `gate` and the selected route at
    /// `prefix` in the default VRF.
    pub fn rib_lookup_route(&self, prefix: IpNet, gate: Option<IpAddr>) -> RouteLookup {
        match prefix.trunc() {
            IpNet::V4(p) => self.rib_lookup_route_in::<Ipv4Net>(VrfId::DEFAULT, Safi::Unicast, p, gate),
            IpNet::V6(p) => self.rib_lookup_route_in::<Ipv6Net>(VrfId::DEFAULT, Safi::Unicast, p, gate),
        }
    }

    fn rib_lookup_route_in<P: AfiView>(
        &self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        gate: Option<IpAddr>,
    ) -> RouteLookup {
        let Some(vrf) = self.vrfs.get(&vrf_id) else {
            return RouteLookup::Error;
        };
        let Some(rt) = P::view(vrf).table.get(&safi) else {
            return RouteLookup::Error;
        };
        let Some(node) = rt.map.get(&prefix) else {
            return RouteLookup::NotFound;
        };
        let Some(selected) = node.selected() else {
            return RouteLookup::NotFound;
        };
        if selected.rtype == RouteType::Connect {
            return RouteLookup::FoundConnected;
        }
        if let Some(g) = gate {
            if selected.nexthops.iter().any(|nh| nh.gate == Some(g)) {
                return RouteLookup::FoundExact;
            }
        }
        RouteLookup::FoundNoGate
    }

    /// All route nodes of one table, in prefix order.
    pub fn nodes(&self, vrf_id: VrfId, afi: Afi, safi: Safi) -> Vec<(IpNet, &RouteNode)> {
        match afi {
            Afi::Ip => self.nodes_in::<Ipv4Net>(vrf_id, safi),
            Afi::Ip6 => self.nodes_in::<Ipv6Net>(vrf_id, safi),
        }
    }

    fn nodes_in<P: AfiView>(&self, vrf_id: VrfId, safi: Safi) -> Vec<(IpNet, &RouteNode)> {
        let Some(vrf) = self.vrfs.get(&vrf_id) else {
            return Vec::new();
        };
        let Some(rt) = P::view(vrf).table.get(&safi) else {
            return Vec::new();
        };
        rt.map.iter().map(|(p, node)| (p.to_ipnet(), node)).collect()
    }

    /*
     * Meta-queue
     */

    /// Number of route nodes currently enqueued.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drain the meta-queue completely, processing nodes in strict
    /// sub-queue priority. Returns the number of nodes processed.
    pub fn process_queue(&mut self, sink: &mut impl FibSink) -> usize {
        self.process_batch(sink, usize::MAX)
    }

    /// Drain at most `max_nodes` nodes from the meta-queue. Use this to
    /// bound the work done between event-loop iterations.
    pub fn process_batch(&mut self, sink: &mut impl FibSink, max_nodes: usize) -> usize {
        let mut done = 0;
        while done < max_nodes {
            let Some((sub, key)) = self.queue.pop() else {
                break;
            };
            self.process_node(key, sub, sink);
            done += 1;
        }
        done
    }

    fn queue_node_in<P: AfiView>(&mut self, vrf_id: VrfId, safi: Safi, prefix: P, sub: usize) {
        let Some(vrf) = self.vrfs.get_mut(&vrf_id) else {
            return;
        };
        let Some(rt) = P::view_mut(vrf).table.get_mut(&safi) else {
            return;
        };
        let Some(node) = rt.map.get_mut(&prefix) else {
            return;
        };
        if node.queued.is_set(sub) {
            return;
        }
        node.queued.set(sub);
        self.queue.push(sub, (vrf_id, safi, prefix.to_ipnet()));
    }

    fn process_node(&mut self, key: NodeKey, sub: usize, sink: &mut impl FibSink) {
        let (vrf_id, safi, prefix) = key;
        match prefix {
            IpNet::V4(p) => self.process_node_in::<Ipv4Net>(vrf_id, safi, p, sub, sink),
            IpNet::V6(p) => self.process_node_in::<Ipv6Net>(vrf_id, safi, p, sub, sink),
        }
    }

    /// Run nexthop activation, best-route selection and FIB emission for one
    /// route node. One bad node must never wedge the daemon: a node whose
    /// table vanished is logged and skipped.
    fn process_node_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        sub: usize,
        sink: &mut impl FibSink,
    ) {
        // take the candidate list out of the node, so activation can read
        // the table without aliasing it
        let mut ribs = {
            let Some(vrf) = self.vrfs.get_mut(&vrf_id) else {
                warn!("{} vanished while {} was queued", vrf_id, prefix);
                return;
            };
            let Some(rt) = P::view_mut(vrf).table.get_mut(&safi) else {
                warn!("{}/{} table vanished while {} was queued", P::AFI, safi, prefix);
                return;
            };
            let Some(node) = rt.map.get_mut(&prefix) else {
                return;
            };
            node.queued.clear(sub);
            std::mem::take(&mut node.ribs)
        };

        trace!(
            "{} {}: revalidating {} candidates from sub-queue {}",
            vrf_id,
            prefix,
            ribs.len(),
            sub
        );

        let old_selected = ribs.iter().position(|e| e.flags.selected);

        // nexthop activation
        let mut activation_changed = vec![false; ribs.len()];
        for (i, e) in ribs.iter_mut().enumerate() {
            if e.removed {
                continue;
            }
            activation_changed[i] = self.nexthop_active_update_in::<P>(vrf_id, safi, prefix, e);
        }

        // best-route selection
        let new_best = ribs
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.removed && e.nexthops.num_active() > 0)
            .min_by_key(|(_, e)| e.selection_key())
            .map(|(i, _)| i);

        let erased = prefix.to_ipnet();
        match (old_selected, new_best) {
            (Some(o), Some(n)) if o == n => {
                if activation_changed[n] || ribs[n].flags.changed {
                    // same winner, changed nexthops: reprogram it
                    sink.uninstall(vrf_id, erased, &ribs[n]);
                    for nh in ribs[n].nexthops.iter_mut() {
                        nh.fib = nh.active;
                    }
                    sink.install(vrf_id, erased, &ribs[n]);
                }
            }
            (old, new) => {
                if let Some(o) = old {
                    debug!("{} {}: {} is no longer selected", vrf_id, prefix, ribs[o].rtype);
                    ribs[o].flags.selected = false;
                    for nh in ribs[o].nexthops.iter_mut() {
                        nh.fib = false;
                    }
                    sink.uninstall(vrf_id, erased, &ribs[o]);
                }
                if let Some(n) = new {
                    debug!("{} {}: selecting {} route", vrf_id, prefix, ribs[n].rtype);
                    ribs[n].flags.selected = true;
                    for nh in ribs[n].nexthops.iter_mut() {
                        nh.fib = nh.active;
                    }
                    sink.install(vrf_id, erased, &ribs[n]);
                }
            }
        }

        for e in ribs.iter_mut() {
            e.flags.changed = false;
        }

        // free withdrawn entries nobody references anymore
        ribs.retain(|e| !(e.removed && e.refcnt == 0));

        // put the candidate list back, or drop the node entirely
        let Some(vrf) = self.vrfs.get_mut(&vrf_id) else {
            return;
        };
        let Some(rt) = P::view_mut(vrf).table.get_mut(&safi) else {
            return;
        };
        if let Some(node) = rt.map.get_mut(&prefix) {
            node.ribs = ribs;
            if node.ribs.is_empty() && !node.queued.any() {
                rt.map.remove(&prefix);
            }
        }
    }

    /*
     * Nexthop activation
     */

    /// Recompute the active flag of every nexthop of `entry`. Returns
    /// whether any flag changed.
    fn nexthop_active_update_in<P: AfiView>(
        &self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        entry: &mut RibEntry,
    ) -> bool {
        let distance = entry.distance;
        let mut changed = false;
        for nh in entry.nexthops.iter_mut() {
            let was_active = nh.active;
            if nh.blackhole {
                nh.active = true;
            } else if let Some(gate) = nh.gate {
                if nh.ifindex != IFINDEX_INTERNAL {
                    // gateway on a directly attached interface
                    nh.reset_resolution();
                    nh.active = self.iface_up(nh.ifindex);
                } else {
                    match self.resolve_gate_in::<P>(vrf_id, safi, prefix, gate, distance) {
                        Some(res) if res.connected => {
                            // derived interface lives in rifindex only;
                            // ifindex stays as configured
                            nh.recursive = false;
                            nh.rtype = Some(res.rtype);
                            nh.rgate = None;
                            nh.rifindex = res.rifindex;
                            nh.active = true;
                        }
                        Some(res) => {
                            nh.recursive = true;
                            nh.rtype = Some(res.rtype);
                            nh.rifindex = res.rifindex;
                            nh.rgate = res.rgate;
                            nh.active = true;
                        }
                        None => {
                            nh.reset_resolution();
                        }
                    }
                }
            } else {
                // plain interface nexthop
                nh.active = nh.ifindex != IFINDEX_INTERNAL && self.iface_up(nh.ifindex);
            }
            changed |= was_active != nh.active;
        }
        changed
    }

    /// Resolve a gateway against the table, skipping the node being
    /// processed. A gateway resolves through a connected route, or
    /// recursively through any selected route of strictly lower distance.
    fn resolve_gate_in<P: AfiView>(
        &self,
        vrf_id: VrfId,
        safi: Safi,
        skip: P,
        gate: IpAddr,
        distance: u8,
    ) -> Option<Resolution> {
        let vrf = self.vrfs.get(&vrf_id)?;
        let rt = P::view(vrf).table.get(&safi)?;
        let mut key = P::host(gate)?;
        loop {
            let (p, node) = rt.map.get_lpm(&key)?;
            let plen = p.plen();
            let shorten = |len: u8| {
                if len == 0 {
                    None
                } else {
                    P::from_addr_len(gate, len - 1)
                }
            };
            if p.to_ipnet() == skip.to_ipnet() {
                key = shorten(plen)?;
                continue;
            }
            let Some(resolving) = node.selected() else {
                key = shorten(plen)?;
                continue;
            };
            if resolving.rtype == RouteType::Connect {
                let rifindex = resolving
                    .nexthops
                    .iter()
                    .find(|nh| nh.active)
                    .map(|nh| nh.ifindex)
                    .unwrap_or(IFINDEX_INTERNAL);
                return Some(Resolution {
                    rtype: resolving.rtype,
                    rifindex,
                    rgate: None,
                    connected: true,
                });
            }
            if resolving.distance < distance {
                let via = resolving.nexthops.iter().find(|nh| nh.active);
                return Some(Resolution {
                    rtype: resolving.rtype,
                    rifindex: via.map(|nh| nh.ifindex).unwrap_or(IFINDEX_INTERNAL),
                    rgate: via.and_then(|nh| nh.gate),
                    connected: false,
                });
            }
            return None;
        }
    }

    /*
     * Bulk maintenance
     */

    /// Re-enqueue every route node of every table for revalidation.
    pub fn rib_update(&mut self) {
        for key in self.collect_all_keys() {
            self.queue_node_all(key);
        }
    }

    /// Enqueue a node once per sub-queue that has a live entry on it.
    fn queue_node_all(&mut self, key: NodeKey) {
        let (vrf_id, safi, prefix) = key;
        let subs: Vec<usize> = match prefix {
            IpNet::V4(p) => self.entry_subqueues_in::<Ipv4Net>(vrf_id, safi, p),
            IpNet::V6(p) => self.entry_subqueues_in::<Ipv6Net>(vrf_id, safi, p),
        };
        for sub in subs {
            match prefix {
                IpNet::V4(p) => self.queue_node_in::<Ipv4Net>(vrf_id, safi, p, sub),
                IpNet::V6(p) => self.queue_node_in::<Ipv6Net>(vrf_id, safi, p, sub),
            }
        }
    }

    fn entry_subqueues_in<P: AfiView>(&self, vrf_id: VrfId, safi: Safi, prefix: P) -> Vec<usize> {
        let Some(vrf) = self.vrfs.get(&vrf_id) else {
            return Vec::new();
        };
        let Some(rt) = P::view(vrf).table.get(&safi) else {
            return Vec::new();
        };
        let Some(node) = rt.map.get(&prefix) else {
            return Vec::new();
        };
        let mut subs: Vec<usize> = node
            .ribs
            .iter()
            .filter(|e| !e.removed)
            .map(|e| e.rtype.sub_queue())
            .collect();
        subs.sort_unstable();
        subs.dedup();
        subs
    }

    fn collect_all_keys(&self) -> Vec<NodeKey> {
        let mut keys = Vec::new();
        for (id, vrf) in &self.vrfs {
            for (safi, rt) in &vrf.v4.table {
                keys.extend(rt.map.iter().map(|(p, _)| (*id, *safi, p.to_ipnet())));
            }
            for (safi, rt) in &vrf.v6.table {
                keys.extend(rt.map.iter().map(|(p, _)| (*id, *safi, p.to_ipnet())));
            }
        }
        keys
    }

    /// Withdraw entries that belong to a kernel table other than the VRF's
    /// own FIB table. Processes at most `budget` nodes per call and keeps an
    /// internal cursor; returns `true` when the walk has finished. Call
    /// again from the event loop while it returns `false`.
    pub fn rib_weed_tables(&mut self, budget: usize) -> bool {
        let mut pending = match self.pending_weed.take() {
            Some(p) => p,
            None => self.collect_all_keys().into(),
        };
        let mut done = 0;
        while done < budget {
            let Some(key) = pending.pop_front() else {
                break;
            };
            self.weed_node(key);
            done += 1;
        }
        if pending.is_empty() {
            true
        } else {
            self.pending_weed = Some(pending);
            false
        }
    }

    fn weed_node(&mut self, key: NodeKey) {
        let fib_id = match self.vrfs.get(&key.0) {
            Some(vrf) => vrf.fib_id,
            None => return,
        };
        self.mark_removed_where(key, |e| e.table != fib_id);
    }

    /// Withdraw stale routes installed by a previous lifetime of this
    /// process. Same budget contract as [`Rib::rib_weed_tables`].
    pub fn rib_sweep_route(&mut self, budget: usize) -> bool {
        let mut pending = match self.pending_sweep.take() {
            Some(p) => p,
            None => self.collect_all_keys().into(),
        };
        let mut done = 0;
        while done < budget {
            let Some(key) = pending.pop_front() else {
                break;
            };
            self.mark_removed_where(key, |e| e.flags.self_route);
            done += 1;
        }
        if pending.is_empty() {
            true
        } else {
            self.pending_sweep = Some(pending);
            false
        }
    }

    /// Mark all live entries satisfying `pred` as removed, and enqueue the
    /// node on their sub-queues.
    fn mark_removed_where(&mut self, key: NodeKey, pred: impl Fn(&RibEntry) -> bool) {
        let (vrf_id, safi, prefix) = key;
        match prefix {
            IpNet::V4(p) => self.mark_removed_where_in::<Ipv4Net>(vrf_id, safi, p, pred),
            IpNet::V6(p) => self.mark_removed_where_in::<Ipv6Net>(vrf_id, safi, p, pred),
        }
    }

    fn mark_removed_where_in<P: AfiView>(
        &mut self,
        vrf_id: VrfId,
        safi: Safi,
        prefix: P,
        pred: impl Fn(&RibEntry) -> bool,
    ) {
        let mut subs = Vec::new();
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
                if !e.removed && pred(e) {
                    e.removed = true;
                    subs.push(e.rtype.sub_queue());
                }
            }
        }
        subs.sort_unstable();
        subs.dedup();
        for sub in subs {
            self.queue_node_in::<P>(vrf_id, safi, prefix, sub);
        }
    }

    /// Shutdown: withdraw every selected route from the FIB and drop all
    /// tables and queued work.
    pub fn rib_close(&mut self, sink: &mut impl FibSink) {
        for (id, vrf) in &self.vrfs {
            for rt in vrf.v4.table.values() {
                for (p, node) in rt.map.iter() {
                    if let Some(e) = node.selected() {
                        sink.uninstall(*id, p.to_ipnet(), e);
                    }
                }
            }
            for rt in vrf.v6.table.values() {
                for (p, node) in rt.map.iter() {
                    if let Some(e) = node.selected() {
                        sink.uninstall(*id, p.to_ipnet(), e);
                    }
                }
            }
        }
        for vrf in self.vrfs.values_mut() {
            vrf.v4 = AfiTables::new();
            vrf.v6 = AfiTables::new();
        }
        self.queue.clear();
        self.pending_weed = None;
        self.pending_sweep = None;
        debug!("RIB closed");
    }
}

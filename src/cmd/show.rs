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

//! Route listings in the traditional `show ip route` style.

use super::CmdWarning;
use crate::rib::{Rib, RibEntry, RouteNode};
use crate::types::{Afi, RouteType, Safi, VrfId, IFINDEX_INTERNAL, ROUTE_TYPES};

use ipnet::IpNet;
use std::fmt::Write;
use std::net::IpAddr;

const HEADER_V4: &str = "Codes: K - kernel route, C - connected, S - static, R - RIP, O - OSPF,\n       I - ISIS, B - BGP, > - selected route, * - FIB route\n\n";
const HEADER_V6: &str = "Codes: K - kernel route, C - connected, S - static, R - RIPng, O - OSPFv3,\n       I - ISIS, B - BGP, > - selected route, * - FIB route\n\n";

/// What `show … route` should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowFilter {
    /// The whole table, one line per route and nexthop.
    All,
    /// Detail view of the route covering one address (longest match).
    Address(IpAddr),
    /// Detail view of one exact prefix.
    Prefix(IpNet),
    /// All routes covered by the given prefix.
    LongerPrefixes(IpNet),
    /// Only IPv4 routes shorter than their classful network mask.
    SupernetsOnly,
    /// Only routes of one protocol.
    Protocol(RouteType),
    /// Per-protocol route and FIB counters.
    Summary,
}

/// Render the routing table in `show ip route` / `show ipv6 route` style.
pub fn show_route(rib: &Rib, afi: Afi, filter: &ShowFilter) -> Result<String, CmdWarning> {
    let nodes = rib.nodes(VrfId::DEFAULT, afi, Safi::Unicast);
    let header = match afi {
        Afi::Ip => HEADER_V4,
        Afi::Ip6 => HEADER_V6,
    };
    let mut out = String::new();
    match filter {
        ShowFilter::All => {
            out.push_str(header);
            for (prefix, node) in nodes {
                show_node_lines(rib, &mut out, prefix, node);
            }
        }
        ShowFilter::Address(addr) => {
            let (prefix, _) = rib.rib_match(*addr).ok_or(CmdWarning::NotInTable)?;
            let node = nodes
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, n)| *n)
                .ok_or(CmdWarning::NotInTable)?;
            show_node_detail(rib, &mut out, prefix, node);
        }
        ShowFilter::Prefix(prefix) => {
            let prefix = prefix.trunc();
            let node = nodes
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, n)| *n)
                .ok_or(CmdWarning::NotInTable)?;
            if node.selected().is_none() && node.entries().all(|e| e.is_removed()) {
                return Err(CmdWarning::NotInTable);
            }
            show_node_detail(rib, &mut out, prefix, node);
        }
        ShowFilter::LongerPrefixes(covering) => {
            let covering = covering.trunc();
            out.push_str(header);
            for (prefix, node) in nodes {
                if covering.contains(&prefix) {
                    show_node_lines(rib, &mut out, prefix, node);
                }
            }
        }
        ShowFilter::SupernetsOnly => {
            out.push_str(header);
            for (prefix, node) in nodes {
                if is_supernet(prefix) {
                    show_node_lines(rib, &mut out, prefix, node);
                }
            }
        }
        ShowFilter::Protocol(rtype) => {
            out.push_str(header);
            for (prefix, node) in nodes {
                for entry in node.entries().filter(|e| !e.is_removed()) {
                    if entry.rtype == *rtype {
                        show_entry_lines(rib, &mut out, prefix, entry);
                    }
                }
            }
        }
        ShowFilter::Summary => {
            show_summary(&mut out, &nodes);
        }
    }
    Ok(out)
}

/// Whether an IPv4 prefix is shorter than the natural mask of its class.
fn is_supernet(prefix: IpNet) -> bool {
    let IpNet::V4(p) = prefix else {
        return false;
    };
    let addr = u32::from(p.network());
    let len = p.prefix_len();
    if addr >> 31 == 0 {
        len < 8
    } else if addr >> 30 == 0b10 {
        len < 16
    } else if addr >> 29 == 0b110 {
        len < 24
    } else {
        false
    }
}

fn show_node_lines(rib: &Rib, out: &mut String, prefix: IpNet, node: &RouteNode) {
    for entry in node.entries().filter(|e| !e.is_removed()) {
        show_entry_lines(rib, out, prefix, entry);
    }
}

/// One-line listing of a single entry, one line per nexthop.
fn show_entry_lines(rib: &Rib, out: &mut String, prefix: IpNet, entry: &RibEntry) {
    let mut width = 0;
    for (i, nexthop) in entry.nexthops.iter().enumerate() {
        if i == 0 {
            let head = format!(
                "{}{}{} {}",
                entry.rtype.route_char(),
                if entry.flags.selected { '>' } else { ' ' },
                if nexthop.fib { '*' } else { ' ' },
                prefix,
            );
            width = head.len();
            out.push_str(&head);
            if entry.rtype != RouteType::Connect && entry.rtype != RouteType::Kernel {
                let dist = format!(" [{}/{}]", entry.distance, entry.metric);
                width += dist.len();
                out.push_str(&dist);
            }
        } else {
            let _ = write!(
                out,
                "  {}{}",
                if nexthop.fib { '*' } else { ' ' },
                " ".repeat(width.saturating_sub(3)),
            );
        }

        show_nexthop_line(rib, out, nexthop);

        if entry.flags.blackhole {
            out.push_str(", bh");
        }
        if entry.flags.reject {
            out.push_str(", rej");
        }
        if uptime_shown(entry.rtype) {
            let _ = write!(out, ", {}", uptime_str(entry));
        }
        out.push('\n');
    }
}

/// Detail view of one route node, in `show ip route A.B.C.D` style.
fn show_node_detail(rib: &Rib, out: &mut String, prefix: IpNet, node: &RouteNode) {
    for entry in node.entries().filter(|e| !e.is_removed()) {
        let _ = writeln!(out, "Routing entry for {}", prefix);
        let _ = write!(
            out,
            "  Known via \"{}\", distance {}, metric {}",
            entry.rtype.name(),
            entry.distance,
            entry.metric
        );
        if entry.flags.selected {
            out.push_str(", best");
        }
        if entry.refcnt() > 0 {
            let _ = write!(out, ", refcnt {}", entry.refcnt());
        }
        if entry.flags.blackhole {
            out.push_str(", blackhole");
        }
        if entry.flags.reject {
            out.push_str(", reject");
        }
        out.push('\n');
        if uptime_shown(entry.rtype) {
            let _ = writeln!(out, "  Last update {} ago", uptime_str(entry));
        }
        for nexthop in entry.nexthops.iter() {
            let _ = write!(out, "  {}", if nexthop.fib { '*' } else { ' ' });
            show_nexthop_line(rib, out, nexthop);
            out.push('\n');
        }
        out.push('\n');
    }
}

/// Render one nexthop the way the one-line listing does.
fn show_nexthop_line(rib: &Rib, out: &mut String, nexthop: &crate::nexthop::Nexthop) {
    if nexthop.blackhole {
        out.push_str(" directly connected, Null0");
    } else {
        if let Some(gate) = nexthop.gate {
            let _ = write!(out, " {}", gate);
        }
        // configured interface, or the one a connected resolution derived
        let ifindex = if nexthop.ifindex != IFINDEX_INTERNAL {
            nexthop.ifindex
        } else if !nexthop.recursive {
            nexthop.rifindex
        } else {
            IFINDEX_INTERNAL
        };
        if ifindex != IFINDEX_INTERNAL {
            let name = rib.ifname(ifindex).unwrap_or("unknown");
            if nexthop.gate.is_some() {
                let _ = write!(out, ", via {}", name);
            } else {
                let _ = write!(out, " directly connected, {}", name);
            }
        }
    }

    if !nexthop.active {
        out.push_str(" inactive");
    }

    if nexthop.recursive {
        out.push_str(" (recursive");
        if let Some(rgate) = nexthop.rgate {
            let _ = write!(out, " via {})", rgate);
        } else if nexthop.rifindex != IFINDEX_INTERNAL {
            let name = rib.ifname(nexthop.rifindex).unwrap_or("unknown");
            let _ = write!(out, " is directly connected, {})", name);
        } else {
            out.push(')');
        }
    }

    if let Some(src) = nexthop.src {
        let _ = write!(out, ", src {}", src);
    }
}

/// Whether the listing shows an uptime for this protocol (everything that is
/// not local knowledge).
fn uptime_shown(rtype: RouteType) -> bool {
    !matches!(
        rtype,
        RouteType::System | RouteType::Kernel | RouteType::Connect
    )
}

/// Age of an entry, in the traditional three-granularity rendering.
fn uptime_str(entry: &RibEntry) -> String {
    const ONE_DAY: u64 = 60 * 60 * 24;
    const ONE_WEEK: u64 = ONE_DAY * 7;
    let secs = entry.uptime.elapsed().unwrap_or_default().as_secs();
    if secs < ONE_DAY {
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    } else if secs < ONE_WEEK {
        format!("{}d{:02}h{:02}m", secs / ONE_DAY, (secs / 3600) % 24, (secs / 60) % 60)
    } else {
        format!(
            "{:02}w{}d{:02}h",
            secs / ONE_WEEK,
            (secs % ONE_WEEK) / ONE_DAY,
            (secs / 3600) % 24
        )
    }
}

/// Per-protocol route and FIB counters, in `show ip route summary` style.
fn show_summary(out: &mut String, nodes: &[(IpNet, &RouteNode)]) {
    let _ = writeln!(out, "{:<20} {:<20} {}", "Route Source", "Routes", "FIB");
    let mut total = (0usize, 0usize);
    for rtype in ROUTE_TYPES {
        let mut count = 0usize;
        let mut fib = 0usize;
        for (_, node) in nodes {
            for entry in node.entries().filter(|e| !e.is_removed()) {
                if entry.rtype == rtype {
                    count += 1;
                    if entry.nexthops.num_fib() > 0 {
                        fib += 1;
                    }
                }
            }
        }
        if count > 0 {
            let _ = writeln!(out, "{:<20} {:<20} {}", rtype.name(), count, fib);
            total.0 += count;
            total.1 += fib;
        }
    }
    let _ = writeln!(out, "{:<20} {:<20} {}", "Totals", total.0, total.1);
}

/// Render the protocol route-map filtering status, in `show ip protocol`
/// style.
pub fn show_protocol(rib: &Rib, afi: Afi) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Protocol    : route-map");
    let _ = writeln!(out, "------------------------");
    for rtype in ROUTE_TYPES {
        let name = rib.protocol_route_map(afi, Some(rtype)).unwrap_or("none");
        let _ = writeln!(out, "{:<10}  : {:<10}", rtype.name(), name);
    }
    let any = rib.protocol_route_map(afi, None).unwrap_or("none");
    let _ = writeln!(out, "{:<10}  : {:<10}", "any", any);
    out
}

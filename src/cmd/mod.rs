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

//! The command boundary.
//!
//! These are the typed entry points the operator front-end calls, one per
//! command form. Command parsing below the token level (prefix syntax,
//! masks, flags, distances) and the whole constraint matrix live here; the
//! RIB core below never sees malformed input. Every rejected command leaves
//! all data structures unchanged and reports a [`CmdWarning`] whose
//! rendering is the diagnostic for the terminal.
//!
//! The legacy Cisco-style mask forms are accepted (IPv4 only). The legacy
//! forms combining a gateway with a `reject`/`blackhole` flag are
//! nonsensical and rejected outright.

mod show;
pub use show::{show_protocol, show_route, ShowFilter};

use crate::rib::Rib;
use crate::types::{Afi, RibError, RouteType, Safi, VrfId};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Exit code of a successful command.
pub const CMD_SUCCESS: i32 = 0;
/// Exit code of a rejected command.
pub const CMD_WARNING: i32 = 1;

/// Result of a command handler.
pub type CmdResult = Result<(), CmdWarning>;

/// Map a command result to its exit code.
pub fn exit_code(res: &CmdResult) -> i32 {
    match res {
        Ok(()) => CMD_SUCCESS,
        Err(_) => CMD_WARNING,
    }
}

/// A rejected command. The `Display` rendering is the human-readable
/// diagnostic, in the traditional `% ...` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CmdWarning {
    /// The destination does not parse as an address or prefix.
    #[error("% Malformed address")]
    MalformedAddress,
    /// A Cisco-style mask was combined with an IPv6 prefix.
    #[error("% Address mask only valid with IPv4 prefixes")]
    MaskWithIpv6,
    /// The mask does not parse, or is not contiguous.
    #[error("% Malformed address mask")]
    MalformedMask,
    /// The administrative distance is not in `1..=255`.
    #[error("% Invalid administrative distance")]
    MalformedDistance,
    /// A `reject`/`blackhole` flag was combined with `Null0`.
    #[error("% can not have flag {0} with Null0")]
    FlagWithNull0(String),
    /// The flag token is neither `reject` nor `blackhole`.
    #[error("% Malformed flag {0}")]
    MalformedFlag(String),
    /// A bare prefix was added without a flag.
    #[error("% Command incomplete")]
    Incomplete,
    /// The gateway was given as a prefix that is not host-length.
    #[error("% Gateway requires a host address")]
    GatewayNotHost,
    /// Gateway family does not match the prefix family.
    #[error("% Prefix and nexthop address-family mismatch")]
    FamilyMismatch,
    /// Two interface names were given, but no gateway address.
    #[error("% One of the route destinations must be an IP gateway")]
    GatewayRequired,
    /// A gateway was combined with a `reject`/`blackhole` flag (legacy form).
    #[error("% Flags and a gateway cannot be combined")]
    FlagWithGateway,
    /// The protocol name is not recognized.
    #[error("invalid protocol name \"{0}\"")]
    UnknownProtocol(String),
    /// No route in the table matches the request.
    #[error("% Network not in table")]
    NotInTable,
    /// The RIB rejected the operation.
    #[error("% {0}")]
    Rib(#[from] RibError),
}

/// Parse the destination prefix of one family. A bare address gets a
/// host-length prefix.
fn parse_dest(afi: Afi, dest: &str) -> Result<IpNet, CmdWarning> {
    match afi {
        Afi::Ip => {
            if let Ok(net) = dest.parse::<Ipv4Net>() {
                return Ok(IpNet::V4(net));
            }
            if let Ok(addr) = dest.parse::<Ipv4Addr>() {
                if let Ok(net) = Ipv4Net::new(addr, 32) {
                    return Ok(IpNet::V4(net));
                }
            }
        }
        Afi::Ip6 => {
            if let Ok(net) = dest.parse::<Ipv6Net>() {
                return Ok(IpNet::V6(net));
            }
            if let Ok(addr) = dest.parse::<Ipv6Addr>() {
                if let Ok(net) = Ipv6Net::new(addr, 128) {
                    return Ok(IpNet::V6(net));
                }
            }
        }
    }
    Err(CmdWarning::MalformedAddress)
}

/// Length of a contiguous netmask, or `None` when the mask has holes.
fn ip_masklen(mask: Ipv4Addr) -> Option<u8> {
    let m = u32::from(mask);
    let len = m.leading_ones() as u8;
    let expected = if len == 0 { 0 } else { u32::MAX << (32 - len) };
    (m == expected).then_some(len)
}

/// `Null0` and its abbreviations, case-insensitive.
fn is_null0(token: &str) -> bool {
    !token.is_empty() && "null0".starts_with(token.to_ascii_lowercase().as_str())
}

/// General handler for all static-route command forms; mirrors the argument
/// matrix of the traditional commands. `add` distinguishes `ip route` from
/// `no ip route`.
#[allow(clippy::too_many_arguments)]
fn zebra_static(
    rib: &mut Rib,
    add: bool,
    afi: Afi,
    dest: &str,
    mask: Option<&str>,
    gate: Option<&str>,
    ifname: Option<&str>,
    flag: Option<&str>,
    distance: Option<&str>,
) -> CmdResult {
    let mut p = parse_dest(afi, dest)?;

    // Cisco-like mask notation
    if let Some(mask_str) = mask {
        let IpNet::V4(v4) = p else {
            return Err(CmdWarning::MaskWithIpv6);
        };
        let mask_addr: Ipv4Addr = mask_str
            .parse()
            .map_err(|_| CmdWarning::MalformedMask)?;
        let len = ip_masklen(mask_addr).ok_or(CmdWarning::MalformedMask)?;
        p = IpNet::V4(Ipv4Net::new(v4.addr(), len).map_err(|_| CmdWarning::MalformedMask)?);
    }

    // apply mask for the given prefix
    let p = p.trunc();

    // administrative distance
    let distance = match distance {
        Some(s) => s
            .parse::<u8>()
            .ok()
            .filter(|d| *d >= 1)
            .ok_or(CmdWarning::MalformedDistance)?,
        None => RouteType::Static.default_distance(),
    };

    // Null0 static route
    if let Some(gate_str) = gate {
        if is_null0(gate_str) {
            if let Some(flag_str) = flag {
                return Err(CmdWarning::FlagWithNull0(flag_str.to_string()));
            }
            return if add {
                Ok(rib.static_add(p, None, None, true, false, distance, VrfId::DEFAULT)?)
            } else {
                Ok(rib.static_delete(p, None, None, distance, VrfId::DEFAULT)?)
            };
        }
    }

    // route flags
    let (mut blackhole, mut reject) = (false, false);
    if let Some(flag_str) = flag {
        match flag_str.chars().next() {
            Some('r') | Some('R') => reject = true,
            Some('b') | Some('B') => blackhole = true,
            _ => return Err(CmdWarning::MalformedFlag(flag_str.to_string())),
        }
    }

    let Some(gate_str) = gate else {
        // adding just a prefix requires flags
        return if add {
            if !blackhole && !reject {
                return Err(CmdWarning::Incomplete);
            }
            Ok(rib.static_add(p, None, None, blackhole, reject, distance, VrfId::DEFAULT)?)
        } else {
            Ok(rib.static_delete(p, None, None, distance, VrfId::DEFAULT)?)
        };
    };

    // The gateway is either a nexthop address or an interface name. A
    // gateway given in prefix notation must be host-length and of the
    // prefix's family.
    if gate_str.is_empty() {
        return Err(CmdWarning::MalformedAddress);
    }
    let mut gate_addr: Option<IpAddr> = None;
    let mut ifname = ifname;
    if let Ok(gnet) = gate_str.parse::<IpNet>() {
        if gnet.prefix_len() < gnet.max_prefix_len() {
            return Err(CmdWarning::GatewayNotHost);
        }
        gate_addr = Some(gnet.addr());
    } else if let Ok(addr) = gate_str.parse::<IpAddr>() {
        gate_addr = Some(addr);
    } else {
        // must be an interface name then
        if ifname.is_some() {
            return Err(CmdWarning::GatewayRequired);
        }
        ifname = Some(gate_str);
    }

    if let Some(g) = gate_addr {
        let same_family = matches!(
            (p, g),
            (IpNet::V4(_), IpAddr::V4(_)) | (IpNet::V6(_), IpAddr::V6(_))
        );
        if !same_family {
            return Err(CmdWarning::FamilyMismatch);
        }
    }

    if add {
        rib.static_add(p, gate_addr, ifname, blackhole, reject, distance, VrfId::DEFAULT)?;
    } else {
        rib.static_delete(p, gate_addr, ifname, distance, VrfId::DEFAULT)?;
    }
    Ok(())
}

/*
 * Canonical IPv4 forms
 */

/// `ip route A.B.C.D/M (A.B.C.D|IFNAME|null0) [<1-255>]`
pub fn ip_route(rib: &mut Rib, dest: &str, gate: &str, distance: Option<&str>) -> CmdResult {
    zebra_static(rib, true, Afi::Ip, dest, None, Some(gate), None, None, distance)
}

/// `ip route A.B.C.D/M (reject|blackhole) [<1-255>]`
pub fn ip_route_flags(rib: &mut Rib, dest: &str, flag: &str, distance: Option<&str>) -> CmdResult {
    zebra_static(rib, true, Afi::Ip, dest, None, None, None, Some(flag), distance)
}

/// `no ip route A.B.C.D/M (A.B.C.D|IFNAME|null0) [<1-255>]`
pub fn no_ip_route(rib: &mut Rib, dest: &str, gate: &str, distance: Option<&str>) -> CmdResult {
    zebra_static(rib, false, Afi::Ip, dest, None, Some(gate), None, None, distance)
}

/// `no ip route A.B.C.D/M (reject|blackhole) [<1-255>]`
pub fn no_ip_route_flags(
    rib: &mut Rib,
    dest: &str,
    flag: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, false, Afi::Ip, dest, None, None, None, Some(flag), distance)
}

/*
 * Deprecated IPv4 forms
 */

/// Deprecated: `ip route A.B.C.D A.B.C.D (A.B.C.D|IFNAME|null0) [<1-255>]`
/// (destination given as address and mask).
pub fn ip_route_mask(
    rib: &mut Rib,
    dest: &str,
    mask: &str,
    gate: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, true, Afi::Ip, dest, Some(mask), Some(gate), None, None, distance)
}

/// Deprecated: `no ip route A.B.C.D A.B.C.D (A.B.C.D|IFNAME|null0) [<1-255>]`
pub fn no_ip_route_mask(
    rib: &mut Rib,
    dest: &str,
    mask: &str,
    gate: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, false, Afi::Ip, dest, Some(mask), Some(gate), None, None, distance)
}

/// Deprecated: `ip route A.B.C.D A.B.C.D (reject|blackhole) [<1-255>]`
/// (mask-form destination with a discard flag and no gateway).
pub fn ip_route_mask_flags(
    rib: &mut Rib,
    dest: &str,
    mask: &str,
    flag: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, true, Afi::Ip, dest, Some(mask), None, None, Some(flag), distance)
}

/// Deprecated: `no ip route A.B.C.D A.B.C.D (reject|blackhole) [<1-255>]`
pub fn no_ip_route_mask_flags(
    rib: &mut Rib,
    dest: &str,
    mask: &str,
    flag: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, false, Afi::Ip, dest, Some(mask), None, None, Some(flag), distance)
}

/// Deprecated and rejected: combining a gateway with a discard flag makes no
/// sense, so this form only reports a warning.
pub fn ip_route_gate_flags(
    _rib: &mut Rib,
    _dest: &str,
    _gate: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/// Deprecated and rejected: the `no` analogue of
/// [`ip_route_gate_flags`], refused for the same reason.
pub fn no_ip_route_gate_flags(
    _rib: &mut Rib,
    _dest: &str,
    _gate: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/// Deprecated and rejected: the mask-form destination does not make a
/// gateway-with-flag combination any more sensible.
pub fn ip_route_mask_gate_flags(
    _rib: &mut Rib,
    _dest: &str,
    _mask: &str,
    _gate: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/// Deprecated and rejected: the `no` analogue of
/// [`ip_route_mask_gate_flags`].
pub fn no_ip_route_mask_gate_flags(
    _rib: &mut Rib,
    _dest: &str,
    _mask: &str,
    _gate: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/*
 * IPv6 forms
 */

/// `ipv6 route X:X::X:X/M (X:X::X:X|IFNAME) [<1-255>]`
pub fn ipv6_route(rib: &mut Rib, dest: &str, gate: &str, distance: Option<&str>) -> CmdResult {
    zebra_static(rib, true, Afi::Ip6, dest, None, Some(gate), None, None, distance)
}

/// `ipv6 route X:X::X:X/M X:X::X:X IFNAME [<1-255>]`
pub fn ipv6_route_ifname(
    rib: &mut Rib,
    dest: &str,
    gate: &str,
    ifname: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, true, Afi::Ip6, dest, None, Some(gate), Some(ifname), None, distance)
}

/// `ipv6 route X:X::X:X/M (reject|blackhole) [<1-255>]`
pub fn ipv6_route_flags(rib: &mut Rib, dest: &str, flag: &str, distance: Option<&str>) -> CmdResult {
    zebra_static(rib, true, Afi::Ip6, dest, None, None, None, Some(flag), distance)
}

/// `no ipv6 route X:X::X:X/M (X:X::X:X|IFNAME) [<1-255>]`
pub fn no_ipv6_route(rib: &mut Rib, dest: &str, gate: &str, distance: Option<&str>) -> CmdResult {
    zebra_static(rib, false, Afi::Ip6, dest, None, Some(gate), None, None, distance)
}

/// `no ipv6 route X:X::X:X/M X:X::X:X IFNAME [<1-255>]`
pub fn no_ipv6_route_ifname(
    rib: &mut Rib,
    dest: &str,
    gate: &str,
    ifname: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, false, Afi::Ip6, dest, None, Some(gate), Some(ifname), None, distance)
}

/// `no ipv6 route X:X::X:X/M (reject|blackhole) [<1-255>]`
pub fn no_ipv6_route_flags(
    rib: &mut Rib,
    dest: &str,
    flag: &str,
    distance: Option<&str>,
) -> CmdResult {
    zebra_static(rib, false, Afi::Ip6, dest, None, None, None, Some(flag), distance)
}

/*
 * Deprecated IPv6 forms
 */

/// Deprecated and rejected: an IPv6 gateway combined with a discard flag,
/// refused like [`ip_route_gate_flags`].
pub fn ipv6_route_gate_flags(
    _rib: &mut Rib,
    _dest: &str,
    _gate: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/// Deprecated and rejected: an IPv6 gateway and interface combined with a
/// discard flag.
pub fn ipv6_route_gate_ifname_flags(
    _rib: &mut Rib,
    _dest: &str,
    _gate: &str,
    _ifname: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/// Deprecated and rejected: the `no` analogue of
/// [`ipv6_route_gate_flags`].
pub fn no_ipv6_route_gate_flags(
    _rib: &mut Rib,
    _dest: &str,
    _gate: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/// Deprecated and rejected: the `no` analogue of
/// [`ipv6_route_gate_ifname_flags`].
pub fn no_ipv6_route_gate_ifname_flags(
    _rib: &mut Rib,
    _dest: &str,
    _gate: &str,
    _ifname: &str,
    _flag: &str,
    _distance: Option<&str>,
) -> CmdResult {
    Err(CmdWarning::FlagWithGateway)
}

/*
 * Protocol route-map filtering
 */

/// Parse a protocol token, with `any` mapping to `None`.
fn parse_proto(token: &str) -> Result<Option<RouteType>, CmdWarning> {
    if token.eq_ignore_ascii_case("any") {
        return Ok(None);
    }
    token
        .parse::<RouteType>()
        .map(Some)
        .map_err(|_| CmdWarning::UnknownProtocol(token.to_string()))
}

/// `ip protocol (PROTO|any) route-map NAME`
pub fn ip_protocol(rib: &mut Rib, proto: &str, name: &str) -> CmdResult {
    let proto = parse_proto(proto)?;
    rib.set_protocol_route_map(Afi::Ip, proto, name);
    Ok(())
}

/// `no ip protocol (PROTO|any)`
pub fn no_ip_protocol(rib: &mut Rib, proto: &str) -> CmdResult {
    let proto = parse_proto(proto)?;
    rib.clear_protocol_route_map(Afi::Ip, proto);
    Ok(())
}

/*
 * Configuration render-back
 */

/// Render the static-route configuration of one family back into its
/// canonical command lines, one per configured route. The distance is only
/// appended when it differs from the static default.
pub fn static_config(rib: &Rib, afi: Afi) -> String {
    let mut out = String::new();
    for (prefix, si) in rib.statics(VrfId::DEFAULT, afi, Safi::Unicast) {
        let _ = write!(out, "{} route {}", afi, prefix);
        if si.blackhole {
            out.push_str(" blackhole");
        } else if si.reject {
            out.push_str(" reject");
        } else {
            if let Some(gate) = si.gate {
                let _ = write!(out, " {}", gate);
            }
            if let Some(name) = &si.ifname {
                let _ = write!(out, " {}", name);
            }
        }
        if si.distance != RouteType::Static.default_distance() {
            let _ = write!(out, " {}", si.distance);
        }
        out.push('\n');
    }
    out
}

/// Render the `ip protocol … route-map …` configuration lines.
pub fn protocol_config(rib: &Rib, afi: Afi) -> String {
    let mut out = String::new();
    for (proto, name) in rib.protocol_route_maps(afi) {
        let proto = proto.map(|p| p.name()).unwrap_or("any");
        let _ = writeln!(out, "{} protocol {} route-map {}", afi, proto, name);
    }
    out
}

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

use super::setup;
use crate::cmd::{self, CmdWarning, ShowFilter, CMD_SUCCESS, CMD_WARNING};
use crate::rib::{NoopFib, Rib};
use crate::types::{Afi, RouteFlags, RouteType, Safi, VrfId};

use ipnet::IpNet;
use pretty_assertions::assert_eq;

fn net(s: &str) -> IpNet {
    s.parse().unwrap()
}

fn rib_with_iface() -> Rib {
    setup();
    let mut rib = Rib::new();
    rib.if_add("eth0", 1, true);
    rib.rib_add(
        RouteType::Connect,
        RouteFlags::default(),
        net("192.0.2.0/24"),
        None,
        None,
        1,
        VrfId::DEFAULT,
        0,
        0,
    )
    .unwrap();
    rib.process_queue(&mut NoopFib);
    rib
}

#[test]
fn ip_route_configures_a_static_route() {
    let mut rib = rib_with_iface();
    let res = cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None);
    assert_eq!(res, Ok(()));
    assert_eq!(cmd::exit_code(&res), CMD_SUCCESS);

    rib.process_queue(&mut NoopFib);
    let entry = rib.rib_lookup(net("10.0.0.0/8")).unwrap();
    assert_eq!(entry.rtype, RouteType::Static);
    assert_eq!(entry.distance, 1);
}

#[test]
fn ip_route_with_distance_and_interface() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "eth0", Some("200")).unwrap();
    rib.process_queue(&mut NoopFib);

    let entry = rib.rib_lookup(net("10.0.0.0/8")).unwrap();
    assert_eq!(entry.distance, 200);
    let nh = entry.nexthops.iter().next().unwrap();
    assert_eq!(nh.ifindex, 1);
    assert!(nh.gate.is_none());
}

#[test]
fn no_ip_route_removes_and_tolerates_absence() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None).unwrap();
    rib.process_queue(&mut NoopFib);

    assert_eq!(cmd::no_ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None), Ok(()));
    rib.process_queue(&mut NoopFib);
    assert!(rib.rib_lookup(net("10.0.0.0/8")).is_none());

    // deleting again is still a success
    assert_eq!(cmd::no_ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None), Ok(()));
}

#[test]
fn null0_and_flag_forms_install_discards() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "Null0", None).unwrap();
    cmd::ip_route_flags(&mut rib, "10.1.0.0/16", "reject", None).unwrap();
    rib.process_queue(&mut NoopFib);

    let bh = rib.rib_lookup(net("10.0.0.0/8")).unwrap();
    assert!(bh.nexthops.iter().next().unwrap().blackhole);
    let rej = rib.rib_lookup(net("10.1.0.0/16")).unwrap();
    assert!(rej.flags.reject);
    assert!(rej.nexthops.iter().next().unwrap().blackhole);

    // the abbreviation is accepted too
    cmd::ip_route(&mut rib, "10.2.0.0/16", "nu", None).unwrap();
    assert_eq!(
        rib.statics(VrfId::DEFAULT, Afi::Ip, Safi::Unicast)
            .iter()
            .filter(|(_, si)| si.blackhole)
            .count(),
        2
    );
}

#[test]
fn command_warnings() {
    let mut rib = rib_with_iface();

    let res = cmd::ip_route(&mut rib, "10.0.0.0.0/8", "192.0.2.1", None);
    assert_eq!(res, Err(CmdWarning::MalformedAddress));
    assert_eq!(cmd::exit_code(&res), CMD_WARNING);
    assert_eq!(res.unwrap_err().to_string(), "% Malformed address");

    assert_eq!(
        cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", Some("0")),
        Err(CmdWarning::MalformedDistance)
    );
    assert_eq!(
        cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", Some("256")),
        Err(CmdWarning::MalformedDistance)
    );
    assert_eq!(
        cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1/24", None),
        Err(CmdWarning::GatewayNotHost)
    );
    assert_eq!(
        cmd::ip_route(&mut rib, "10.0.0.0/8", "2001:db8::1", None),
        Err(CmdWarning::FamilyMismatch)
    );
    assert_eq!(
        cmd::ip_route_flags(&mut rib, "10.0.0.0/8", "frob", None),
        Err(CmdWarning::MalformedFlag("frob".to_string()))
    );
    assert_eq!(
        cmd::ipv6_route(&mut rib, "2001:db8::/32", "192.0.2.1", None),
        Err(CmdWarning::FamilyMismatch)
    );

    // a rejected command leaves the configuration untouched
    assert!(rib.statics(VrfId::DEFAULT, Afi::Ip, Safi::Unicast).is_empty());
    assert!(rib.statics(VrfId::DEFAULT, Afi::Ip6, Safi::Unicast).is_empty());
}

#[test]
fn deprecated_mask_form_is_accepted() {
    let mut rib = rib_with_iface();
    cmd::ip_route_mask(&mut rib, "10.0.0.0", "255.0.0.0", "192.0.2.1", None).unwrap();
    rib.process_queue(&mut NoopFib);
    assert!(rib.rib_lookup(net("10.0.0.0/8")).is_some());

    cmd::no_ip_route_mask(&mut rib, "10.0.0.0", "255.0.0.0", "192.0.2.1", None).unwrap();
    rib.process_queue(&mut NoopFib);
    assert!(rib.rib_lookup(net("10.0.0.0/8")).is_none());

    assert_eq!(
        cmd::ip_route_mask(&mut rib, "10.0.0.0", "255.0.255.0", "192.0.2.1", None),
        Err(CmdWarning::MalformedMask)
    );
}

#[test]
fn deprecated_mask_flag_form_is_accepted() {
    let mut rib = rib_with_iface();
    cmd::ip_route_mask_flags(&mut rib, "10.0.0.0", "255.0.0.0", "blackhole", None).unwrap();
    rib.process_queue(&mut NoopFib);
    let entry = rib.rib_lookup(net("10.0.0.0/8")).unwrap();
    assert!(entry.flags.blackhole);
    assert!(entry.nexthops.iter().next().unwrap().blackhole);

    cmd::no_ip_route_mask_flags(&mut rib, "10.0.0.0", "255.0.0.0", "blackhole", None).unwrap();
    rib.process_queue(&mut NoopFib);
    assert!(rib.rib_lookup(net("10.0.0.0/8")).is_none());
    assert!(rib.statics(VrfId::DEFAULT, Afi::Ip, Safi::Unicast).is_empty());
}

#[test]
fn deprecated_gate_flag_forms_are_rejected() {
    let mut rib = rib_with_iface();
    assert_eq!(
        cmd::ip_route_gate_flags(&mut rib, "10.0.0.0/8", "192.0.2.1", "reject", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::no_ip_route_gate_flags(&mut rib, "10.0.0.0/8", "192.0.2.1", "reject", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::ip_route_mask_gate_flags(&mut rib, "10.0.0.0", "255.0.0.0", "192.0.2.1", "blackhole", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::no_ip_route_mask_gate_flags(&mut rib, "10.0.0.0", "255.0.0.0", "192.0.2.1", "blackhole", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::ipv6_route_gate_flags(&mut rib, "2001:db8::/32", "2001:db8::1", "reject", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::no_ipv6_route_gate_flags(&mut rib, "2001:db8::/32", "2001:db8::1", "reject", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::ipv6_route_gate_ifname_flags(&mut rib, "2001:db8::/32", "fe80::1", "eth0", "blackhole", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert_eq!(
        cmd::no_ipv6_route_gate_ifname_flags(&mut rib, "2001:db8::/32", "fe80::1", "eth0", "blackhole", None),
        Err(CmdWarning::FlagWithGateway)
    );
    assert!(rib.statics(VrfId::DEFAULT, Afi::Ip, Safi::Unicast).is_empty());
    assert!(rib.statics(VrfId::DEFAULT, Afi::Ip6, Safi::Unicast).is_empty());
}

#[test]
fn flag_with_null0_is_rejected() {
    let mut rib = rib_with_iface();
    // the general handler sees both a Null0 gateway and a flag only through
    // the deprecated front-ends, which refuse the combination
    assert_eq!(
        cmd::ip_route_gate_flags(&mut rib, "10.0.0.0/8", "null0", "blackhole", None),
        Err(CmdWarning::FlagWithGateway)
    );
}

#[test]
fn ipv6_routes_work() {
    let mut rib = rib_with_iface();
    rib.if_add("eth1", 2, true);
    rib.rib_add(
        RouteType::Connect,
        RouteFlags::default(),
        net("2001:db8:1::/64"),
        None,
        None,
        2,
        VrfId::DEFAULT,
        0,
        0,
    )
    .unwrap();
    rib.process_queue(&mut NoopFib);

    cmd::ipv6_route(&mut rib, "2001:db8:2::/48", "2001:db8:1::1", None).unwrap();
    cmd::ipv6_route_ifname(&mut rib, "2001:db8:3::/48", "fe80::1", "eth1", None).unwrap();
    cmd::ipv6_route_flags(&mut rib, "2001:db8:4::/48", "blackhole", None).unwrap();
    rib.process_queue(&mut NoopFib);

    assert!(rib.rib_lookup(net("2001:db8:2::/48")).is_some());
    let ifn = rib.rib_lookup(net("2001:db8:3::/48")).unwrap();
    let nh = ifn.nexthops.iter().next().unwrap();
    assert_eq!(nh.gate, Some("fe80::1".parse().unwrap()));
    assert_eq!(nh.ifindex, 2);
    assert!(rib.rib_lookup(net("2001:db8:4::/48")).unwrap().flags.blackhole);

    // the mask notation never applies to IPv6
    assert_eq!(
        cmd::ip_route_mask(&mut rib, "2001:db8::", "255.0.0.0", "2001:db8:1::1", None),
        Err(CmdWarning::MalformedAddress)
    );

    cmd::no_ipv6_route(&mut rib, "2001:db8:2::/48", "2001:db8:1::1", None).unwrap();
    cmd::no_ipv6_route_ifname(&mut rib, "2001:db8:3::/48", "fe80::1", "eth1", None).unwrap();
    cmd::no_ipv6_route_flags(&mut rib, "2001:db8:4::/48", "blackhole", None).unwrap();
    rib.process_queue(&mut NoopFib);
    assert!(rib.statics(VrfId::DEFAULT, Afi::Ip6, Safi::Unicast).is_empty());
}

#[test]
fn static_config_renders_canonical_lines() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None).unwrap();
    cmd::ip_route(&mut rib, "10.1.0.0/16", "eth0", Some("200")).unwrap();
    cmd::ip_route_flags(&mut rib, "10.2.0.0/16", "blackhole", None).unwrap();
    cmd::ipv6_route(&mut rib, "2001:db8::/32", "2001:db8::1", None).unwrap();

    assert_eq!(
        cmd::static_config(&rib, Afi::Ip),
        "ip route 10.0.0.0/8 192.0.2.1\n\
         ip route 10.1.0.0/16 eth0 200\n\
         ip route 10.2.0.0/16 blackhole\n"
    );
    assert_eq!(cmd::static_config(&rib, Afi::Ip6), "ipv6 route 2001:db8::/32 2001:db8::1\n");
}

#[test]
fn protocol_route_maps() {
    let mut rib = rib_with_iface();
    cmd::ip_protocol(&mut rib, "bgp", "rm-bgp").unwrap();
    cmd::ip_protocol(&mut rib, "any", "rm-any").unwrap();
    assert_eq!(
        cmd::ip_protocol(&mut rib, "frob", "rm"),
        Err(CmdWarning::UnknownProtocol("frob".to_string()))
    );

    assert_eq!(rib.protocol_route_map(Afi::Ip, Some(RouteType::Bgp)), Some("rm-bgp"));
    assert_eq!(rib.protocol_route_map(Afi::Ip, None), Some("rm-any"));
    let attached: std::collections::HashMap<_, _> = rib.protocol_route_maps(Afi::Ip).collect();
    assert_eq!(
        attached,
        maplit::hashmap! {
            Some(RouteType::Bgp) => "rm-bgp",
            None => "rm-any",
        }
    );

    let config = cmd::protocol_config(&rib, Afi::Ip);
    assert!(config.contains("ip protocol bgp route-map rm-bgp\n"));
    assert!(config.contains("ip protocol any route-map rm-any\n"));

    let status = cmd::show_protocol(&rib, Afi::Ip);
    assert!(status.contains("bgp"));
    assert!(status.contains("rm-bgp"));
    assert!(status.contains("any"));

    cmd::no_ip_protocol(&mut rib, "bgp").unwrap();
    assert_eq!(rib.protocol_route_map(Afi::Ip, Some(RouteType::Bgp)), None);
}

#[test]
fn show_route_all_lists_routes() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None).unwrap();
    rib.process_queue(&mut NoopFib);

    let out = cmd::show_route(&rib, Afi::Ip, &ShowFilter::All).unwrap();
    assert!(out.starts_with("Codes: K - kernel route, C - connected"));
    assert!(out.contains("C>* 192.0.2.0/24 directly connected, eth0"));
    assert!(out.contains("S>* 10.0.0.0/8 [1/0] 192.0.2.1"));
}

#[test]
fn show_route_filters() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None).unwrap();
    cmd::ip_route(&mut rib, "10.1.0.0/16", "192.0.2.1", None).unwrap();
    rib.process_queue(&mut NoopFib);

    // detail of the longest match for an address
    let out = cmd::show_route(&rib, Afi::Ip, &ShowFilter::Address("10.1.2.3".parse().unwrap()))
        .unwrap();
    assert!(out.contains("Routing entry for 10.1.0.0/16"));
    assert!(out.contains("Known via \"static\", distance 1, metric 0, best"));

    // exact prefix detail
    let out =
        cmd::show_route(&rib, Afi::Ip, &ShowFilter::Prefix(net("10.0.0.0/8"))).unwrap();
    assert!(out.contains("Routing entry for 10.0.0.0/8"));

    // unknown destinations report a warning
    assert_eq!(
        cmd::show_route(&rib, Afi::Ip, &ShowFilter::Address("203.0.113.1".parse().unwrap())),
        Err(CmdWarning::NotInTable)
    );

    // longer-prefixes
    let out = cmd::show_route(&rib, Afi::Ip, &ShowFilter::LongerPrefixes(net("10.0.0.0/8")))
        .unwrap();
    assert!(out.contains("10.0.0.0/8"));
    assert!(out.contains("10.1.0.0/16"));
    assert!(!out.contains("192.0.2.0/24"));

    // supernets only: 10.0.0.0/8 is not shorter than its class A mask
    let out = cmd::show_route(&rib, Afi::Ip, &ShowFilter::SupernetsOnly).unwrap();
    assert!(!out.contains("10.1.0.0/16"));

    // per protocol
    let out = cmd::show_route(&rib, Afi::Ip, &ShowFilter::Protocol(RouteType::Static)).unwrap();
    assert!(out.contains("10.0.0.0/8"));
    assert!(!out.contains("192.0.2.0/24"));
}

#[test]
fn show_route_summary_counts() {
    let mut rib = rib_with_iface();
    cmd::ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None).unwrap();
    cmd::ip_route(&mut rib, "10.1.0.0/16", "192.0.2.1", None).unwrap();
    rib.process_queue(&mut NoopFib);

    let out = cmd::show_route(&rib, Afi::Ip, &ShowFilter::Summary).unwrap();
    assert!(out.contains("Route Source"));
    assert!(out.contains("connected"));
    assert!(out.contains("static"));
    let totals = out.lines().last().unwrap();
    assert!(totals.starts_with("Totals"));
    assert!(totals.contains('3'));
}

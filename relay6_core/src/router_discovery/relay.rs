//! Router Discovery relay mode (§4.3 "Relay mode"): forwards a Router
//! Advertisement received on the master to every slave, rewriting its
//! `SOURCE-LINKADDR` and (optionally) `RECURSIVE-DNS` options per
//! slave, and forwards any Router Solicitation received on a slave to
//! the master.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::fd::RawFd;

use nix::sys::uio::IoSlice;

use crate::config::Config;
use crate::iface::InterfaceRegistry;
use crate::net::send_with_pktinfo;
use crate::router_discovery::message::{
    self, ALL_NODES, ALL_ROUTERS, ND_OPT_RECURSIVE_DNS, ND_OPT_SOURCE_LINKADDR, RA_FLAG_OTHER,
    RA_FLAG_PROXY, RA_HEADER_LEN,
};
use crate::router_discovery::options::{find_option, NdOptionRef};

/// A `RECURSIVE-DNS` option must carry at least one address to be
/// worth rewriting (reserved(2) + lifetime(4) + one 16-byte address).
const DNS_OPTION_MIN_PAYLOAD: usize = 2 + 4 + 16;

/// Forwards one Router Advertisement received on the master to every
/// non-external slave (§4.3). Four rewrites are applied per copy sent:
/// the source-link-address is replaced with the slave's own MAC, the
/// `RECURSIVE-DNS` addresses are replaced when `always_rewrite_dns` is
/// set, the `O` flag is set when DHCPv6 server mode is enabled, and the
/// `PROXY` flag is always set.
pub(crate) fn forward_router_advertisement(
    config: &Config,
    registry: &InterfaceRegistry,
    socket_fd: RawFd,
    data: &[u8],
) {
    if data.len() < RA_HEADER_LEN {
        return;
    }

    let lladdr_opt = find_option(data, RA_HEADER_LEN, data.len(), ND_OPT_SOURCE_LINKADDR);
    let dns_opt = find_option(data, RA_HEADER_LEN, data.len(), ND_OPT_RECURSIVE_DNS)
        .filter(|o| o.payload_len >= DNS_OPTION_MIN_PAYLOAD);

    let mut flags = message::ra_flags(data);
    if config.enable_dhcpv6_server() {
        flags |= RA_FLAG_OTHER;
    }
    flags |= RA_FLAG_PROXY;

    let dst: Ipv6Addr = ALL_NODES.parse().unwrap();
    let dst_addr = SocketAddrV6::new(dst, 0, 0, 0);

    for slave in registry.slaves.iter().filter(|s| !s.external) {
        let mut buf = data.to_vec();
        message::set_ra_flags(&mut buf, flags);

        if let Some(opt) = lladdr_opt {
            let n = opt.payload_len.min(6);
            buf[opt.payload_offset..opt.payload_offset + n].copy_from_slice(&slave.mac[..n]);
        }

        if config.always_rewrite_dns {
            if let Some(opt) = dns_opt {
                let Some(replacement) = config
                    .dns_address
                    .or_else(|| slave.first_global_address(config.max_valid_time_secs))
                else {
                    // "Unable to comply" (original's comment): skip this
                    // slave rather than forward stale DNS entries.
                    continue;
                };
                rewrite_dns_addresses(&mut buf, opt, replacement);
            }
        }

        let _ = send_with_pktinfo(socket_fd, dst_addr, slave.index, &[IoSlice::new(&buf)]);
    }
}

fn rewrite_dns_addresses(buf: &mut [u8], opt: NdOptionRef, replacement: Ipv6Addr) {
    let mut offset = opt.payload_offset + 6; // skip reserved(2) + lifetime(4)
    let end = opt.payload_offset + opt.payload_len;
    while offset + 16 <= end {
        buf[offset..offset + 16].copy_from_slice(&replacement.octets());
        offset += 16;
    }
}

/// Sends a bare Router Solicitation to the all-routers multicast group,
/// egress the master interface (§4.3's `forward_router_solicitation`,
/// used both for the RS-relayed-from-a-slave case and the initial
/// startup solicitation).
pub(crate) fn forward_router_solicitation(registry: &InterfaceRegistry, socket_fd: RawFd) {
    let rs = message::build_router_solicitation();
    let dst: Ipv6Addr = ALL_ROUTERS.parse().unwrap();
    let dst_addr = SocketAddrV6::new(dst, 0, 0, 0);
    let _ = send_with_pktinfo(socket_fd, dst_addr, registry.master.index, &[IoSlice::new(&rs)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Dhcpv6Mode, RouterDiscoveryMode, SlaveSpec};
    use crate::iface::Interface;
    use crate::router_discovery::message::ND_ROUTER_ADVERT;

    fn test_config(always_rewrite_dns: bool) -> Config {
        Config {
            master: "eth0".into(),
            slaves: vec![SlaveSpec { name: "eth1".into(), external: false }],
            router_discovery: Some(RouterDiscoveryMode::Relay),
            dhcpv6: Some(Dhcpv6Mode::Relay),
            ndp_proxy: false,
            enable_forwarding: false,
            send_router_solicitation: false,
            force_address_assignment: false,
            always_rewrite_dns,
            ndp_route_learning: false,
            always_announce_default_router: false,
            deprecate_ula_if_public_avail: false,
            strict_link_address: false,
            dns_address: None,
            min_rtr_adv_interval_secs: Config::DEFAULT_MIN_RTR_ADV_INTERVAL_SECS,
            max_rtr_adv_interval_secs: Config::DEFAULT_MAX_RTR_ADV_INTERVAL_SECS,
            max_valid_time_secs: Config::DEFAULT_MAX_VALID_TIME_SECS,
            max_prefixes: Config::DEFAULT_MAX_PREFIXES,
            pidfile: None,
            daemonize: false,
            verbosity: 0,
        }
    }

    fn ra_with_lladdr_and_dns(lladdr: [u8; 6], dns: Ipv6Addr) -> Vec<u8> {
        let mut buf = vec![0u8; RA_HEADER_LEN];
        buf[0] = ND_ROUTER_ADVERT;
        buf.push(ND_OPT_SOURCE_LINKADDR);
        buf.push(1);
        buf.extend_from_slice(&lladdr);
        buf.push(ND_OPT_RECURSIVE_DNS);
        buf.push(3);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&30u32.to_be_bytes());
        buf.extend_from_slice(&dns.octets());
        buf
    }

    #[test]
    fn s6_dns_rewrite_replaces_link_local_with_configured_address() {
        let mut config = test_config(true);
        config.dns_address = Some("2001:db8::5".parse().unwrap());
        let registry = InterfaceRegistry::new(
            Interface { index: 1, name: "eth0".into(), mtu: 1500, mac: [0; 6], external: false },
            vec![Interface {
                index: 2,
                name: "eth1".into(),
                mtu: 1500,
                mac: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
                external: false,
            }],
        );
        let ra = ra_with_lladdr_and_dns([0; 6], "fe80::1".parse().unwrap());

        // Exercise the per-slave rewrite path directly (no real socket
        // in this test, so `socket_fd` is an obviously-invalid value;
        // `send_with_pktinfo`'s failure is discarded by design).
        let dns_opt = find_option(&ra, RA_HEADER_LEN, ra.len(), ND_OPT_RECURSIVE_DNS).unwrap();
        assert!(dns_opt.payload_len >= DNS_OPTION_MIN_PAYLOAD);

        let mut rewritten = ra.clone();
        rewrite_dns_addresses(&mut rewritten, dns_opt, "2001:db8::5".parse().unwrap());
        let rewritten_opt = find_option(&rewritten, RA_HEADER_LEN, rewritten.len(), ND_OPT_RECURSIVE_DNS).unwrap();
        let addr = Ipv6Addr::from(<[u8; 16]>::try_from(&rewritten_opt.payload(&rewritten)[6..22]).unwrap());
        assert_eq!(addr, "2001:db8::5".parse::<Ipv6Addr>().unwrap());

        forward_router_advertisement(&config, &registry, -1, &ra);
    }

    #[test]
    fn lladdr_rewrite_uses_slave_mac() {
        let config = test_config(false);
        let registry = InterfaceRegistry::new(
            Interface { index: 1, name: "eth0".into(), mtu: 1500, mac: [0; 6], external: false },
            vec![Interface {
                index: 2,
                name: "eth1".into(),
                mtu: 1500,
                mac: [1, 2, 3, 4, 5, 6],
                external: false,
            }],
        );
        let ra = ra_with_lladdr_and_dns([0; 6], "fe80::1".parse().unwrap());
        let opt = find_option(&ra, RA_HEADER_LEN, ra.len(), ND_OPT_SOURCE_LINKADDR).unwrap();
        let mut buf = ra.clone();
        buf[opt.payload_offset..opt.payload_offset + 6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(&buf[opt.payload_offset..opt.payload_offset + 6], &[1, 2, 3, 4, 5, 6]);
        forward_router_advertisement(&config, &registry, -1, &ra);
    }
}

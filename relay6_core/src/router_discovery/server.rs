//! Router Discovery server mode (§4.3 "Server mode"): synthesizes
//! Router Advertisements on every slave from locally learned addresses,
//! rather than relaying anything from the master.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::fd::RawFd;

use nix::sys::uio::IoSlice;

use crate::config::Config;
use crate::iface::{IfaceAddress, Interface};
use crate::net::send_with_pktinfo;
use crate::router_discovery::message::{self, ALL_NODES, PI_FLAG_AUTO, PI_FLAG_ONLINK, RA_HEADER_LEN};

/// One deduplicated, lifetime-capped prefix ready to be announced.
struct PrefixEntry {
    prefix: Ipv6Addr,
    /// The full address that produced this prefix, kept alongside the
    /// host-zeroed `prefix` so RDNSS can announce a reachable address
    /// rather than the network address itself.
    addr: Ipv6Addr,
    preferred_secs: u32,
    valid_secs: u32,
    is_ula: bool,
}

/// Deduplicates `addrs` by the first 8 bytes of their address (the
/// would-be /64 prefix), drops anything not representable as a /64
/// (`prefix_len > 64`), caps lifetimes to `max_valid_secs`, and stops
/// at `max_prefixes` entries (§4.3, §3 invariant 6).
fn collect_prefixes(addrs: Vec<IfaceAddress>, max_prefixes: usize, max_valid_secs: u32) -> Vec<PrefixEntry> {
    let mut out: Vec<PrefixEntry> = Vec::new();
    for a in addrs {
        if a.prefix_len > 64 {
            continue;
        }
        let key = &a.addr.octets()[..8];
        if out.iter().any(|p| &p.prefix.octets()[..8] == key) {
            continue;
        }
        if out.len() >= max_prefixes {
            break;
        }
        let mut prefix_octets = [0u8; 16];
        prefix_octets[..8].copy_from_slice(key);
        out.push(PrefixEntry {
            prefix: Ipv6Addr::from(prefix_octets),
            addr: a.addr,
            preferred_secs: a.preferred_secs.min(max_valid_secs),
            valid_secs: a.valid_secs.min(max_valid_secs),
            is_ula: a.is_unique_local(),
        });
    }
    out
}

fn push_lladdr_option(out: &mut Vec<u8>, mac: [u8; 6]) {
    out.push(message::ND_OPT_SOURCE_LINKADDR);
    out.push(1);
    out.extend_from_slice(&mac);
}

fn push_mtu_option(out: &mut Vec<u8>, mtu: u32) {
    out.push(message::ND_OPT_MTU);
    out.push(1);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&mtu.to_be_bytes());
}

fn push_prefix_option(out: &mut Vec<u8>, prefix: Ipv6Addr, preferred_secs: u32, valid_secs: u32) {
    out.push(message::ND_OPT_PREFIX_INFORMATION);
    out.push(4);
    out.push(64); // prefix length, always exactly 64 (§3 invariant 6)
    out.push(PI_FLAG_ONLINK | PI_FLAG_AUTO);
    out.extend_from_slice(&valid_secs.to_be_bytes());
    out.extend_from_slice(&preferred_secs.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 0]); // reserved2
    out.extend_from_slice(&prefix.octets());
}

fn push_rdnss_option(out: &mut Vec<u8>, lifetime_secs: u32, addr: Ipv6Addr) {
    out.push(message::ND_OPT_RECURSIVE_DNS);
    out.push(3); // one address: header(2) + reserved(2) + lifetime(4) + addr(16) = 24 = 3*8
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&lifetime_secs.to_be_bytes());
    out.extend_from_slice(&addr.octets());
}

/// DNS-compresses `domain` (trivial label encoding — this relay never
/// emits compression *pointers*, only literal labels, since a
/// single-name search list never benefits from one) and pads the whole
/// option to the next 8-octet boundary (§3).
pub(crate) fn encode_dns_search_list(domain: &str, lifetime_secs: u32) -> Vec<u8> {
    let mut labels = Vec::new();
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 255 {
            continue;
        }
        labels.push(label.len() as u8);
        labels.extend_from_slice(label.as_bytes());
    }
    labels.push(0);

    let mut payload = Vec::with_capacity(6 + labels.len());
    payload.extend_from_slice(&[0, 0]); // reserved
    payload.extend_from_slice(&lifetime_secs.to_be_bytes());
    payload.extend_from_slice(&labels);

    let unpadded_total = 2 + payload.len();
    let padded_total = unpadded_total.div_ceil(8) * 8;
    payload.resize(payload.len() + (padded_total - unpadded_total), 0);

    let mut out = Vec::with_capacity(padded_total);
    out.push(message::ND_OPT_DNS_SEARCH);
    out.push((padded_total / OPTION_UNIT) as u8);
    out.extend_from_slice(&payload);
    out
}

const OPTION_UNIT: usize = crate::router_discovery::options::OPTION_UNIT;

/// Parses `/proc/net/ipv6_route` for a zero-prefix entry whose output
/// interface is not `lo` (§4.3's `have_default_route`, grounded on the
/// original's identical parse of the same file — see SPEC_FULL.md §4.3).
pub(crate) fn have_default_route() -> bool {
    let Ok(content) = std::fs::read_to_string("/proc/net/ipv6_route") else {
        return false;
    };
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let is_default_dest = fields[0].chars().all(|c| c == '0') && fields[1] == "00";
        if is_default_dest && fields[9] != "lo" {
            return true;
        }
    }
    false
}

/// Reads the first `search` domain from `/etc/resolv.conf`, if any
/// (§4.3's DNS search list source — see SPEC_FULL.md §4.3).
pub(crate) fn resolve_search_domain() -> Option<String> {
    let contents = std::fs::read_to_string("/etc/resolv.conf").ok()?;
    let parsed = resolv_conf::Config::parse(contents.as_bytes()).ok()?;
    parsed.get_system_domain().map(|d| d.to_string()).or_else(|| {
        parsed
            .search
            .as_ref()
            .and_then(|names| names.first())
            .map(|n| n.to_string())
    })
}

/// Builds the complete wire bytes of one Router Advertisement for
/// `slave`, given its currently assigned addresses (already resolved by
/// the caller so this function stays a pure, testable transform), the
/// kernel's default-route state, and the system's search domain.
///
/// `shutdown` forces the router lifetime to zero and announces no
/// prefixes (§4.3's "Timer" note: "one final advertisement is emitted
/// per slave with router lifetime 0 and no valid prefixes").
pub(crate) fn build_router_advertisement(
    config: &Config,
    slave: &Interface,
    addrs: Vec<IfaceAddress>,
    has_default_route: bool,
    search_domain: Option<&str>,
    shutdown: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(RA_HEADER_LEN + 64);
    out.push(message::ND_ROUTER_ADVERT);
    out.push(0); // code
    out.extend_from_slice(&[0, 0]); // checksum, computed by the kernel
    out.push(0); // cur hop limit: unspecified (leave host's own setting)
    out.push(0); // flags placeholder, filled in below
    out.extend_from_slice(&[0, 0]); // router lifetime placeholder
    out.extend_from_slice(&[0, 0, 0, 0]); // reachable time: unspecified
    out.extend_from_slice(&[0, 0, 0, 0]); // retrans timer: unspecified

    push_lladdr_option(&mut out, slave.mac);
    push_mtu_option(&mut out, if slave.mtu > 0 { slave.mtu } else { 1500 });

    let mut prefixes = if shutdown {
        Vec::new()
    } else {
        collect_prefixes(addrs, config.max_prefixes, config.max_valid_time_secs)
    };

    let have_public = prefixes.iter().any(|p| !p.is_ula && p.preferred_secs > 0);

    // RDNSS's own lifetime tracks the preferred lifetime of whichever
    // prefix supplied the address (the original's `pref_time`), not the
    // DNS-Search-List's fixed `3 * MaxRtrAdvInterval` lifetime below.
    let mut dns_addr = config.dns_address;
    let mut dns_lifetime = 0u32;
    if dns_addr.is_none() {
        for p in &prefixes {
            if p.preferred_secs > dns_lifetime {
                dns_lifetime = p.preferred_secs;
                dns_addr = Some(p.addr);
            }
        }
    }

    if have_public && config.deprecate_ula_if_public_avail {
        for p in &mut prefixes {
            if p.is_ula {
                p.preferred_secs = 0;
            }
        }
    }

    for p in &prefixes {
        push_prefix_option(&mut out, p.prefix, p.preferred_secs, p.valid_secs);
    }

    let search_list_lifetime = 3 * config.max_rtr_adv_interval_secs;
    if let Some(addr) = dns_addr {
        let rdnss_lifetime = if dns_lifetime > 0 { dns_lifetime } else { search_list_lifetime };
        push_rdnss_option(&mut out, rdnss_lifetime, addr);
    }
    if !shutdown {
        if let Some(domain) = search_domain {
            if !domain.is_empty() {
                out.extend_from_slice(&encode_dns_search_list(domain, search_list_lifetime));
            }
        }
    }

    let router_lifetime: u16 = if shutdown {
        0
    } else if (has_default_route && have_public) || config.always_announce_default_router {
        search_list_lifetime.min(u16::MAX as u32) as u16
    } else {
        0
    };

    let mut flags = 0u8;
    if config.enable_dhcpv6_server() {
        flags |= message::RA_FLAG_OTHER;
    }
    message::set_ra_flags(&mut out, flags);
    message::set_ra_router_lifetime(&mut out, router_lifetime);

    out
}

/// Builds and sends one Router Advertisement for `slave` to the
/// all-nodes multicast group, egress `slave` (§4.3).
pub(crate) fn send_router_advert(config: &Config, slave: &Interface, socket_fd: RawFd, shutdown: bool) {
    let addrs = if shutdown {
        Vec::new()
    } else {
        slave.addresses(config.max_valid_time_secs)
    };
    let has_default_route = !shutdown && have_default_route();
    let search_domain = if shutdown { None } else { resolve_search_domain() };

    let packet = build_router_advertisement(
        config,
        slave,
        addrs,
        has_default_route,
        search_domain.as_deref(),
        shutdown,
    );

    let dst: Ipv6Addr = ALL_NODES.parse().unwrap();
    let dst_addr = SocketAddrV6::new(dst, 0, 0, 0);
    let _ = send_with_pktinfo(socket_fd, dst_addr, slave.index, &[IoSlice::new(&packet)]);
}

/// Draws a uniform delay in `[min, max]` seconds for the next RA timer
/// rearm (§4.3's "Timer": "rearm with `uniform(MinRtrAdvInterval,
/// MaxRtrAdvInterval)` seconds").
pub(crate) fn rearm_delay_secs(config: &Config) -> u32 {
    let span = config
        .max_rtr_adv_interval_secs
        .saturating_sub(config.min_rtr_adv_interval_secs);
    if span == 0 {
        return config.min_rtr_adv_interval_secs;
    }
    let mut buf = [0u8; 4];
    let _ = getrandom::fill(&mut buf);
    config.min_rtr_adv_interval_secs + (u32::from_le_bytes(buf) % span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dhcpv6Mode, RouterDiscoveryMode, SlaveSpec};
    use crate::router_discovery::options::{find_option, NdOptionCursor};

    fn test_config() -> Config {
        Config {
            master: "eth0".into(),
            slaves: vec![SlaveSpec { name: "eth1".into(), external: false }],
            router_discovery: Some(RouterDiscoveryMode::Server),
            dhcpv6: Some(Dhcpv6Mode::Server),
            ndp_proxy: false,
            enable_forwarding: false,
            send_router_solicitation: false,
            force_address_assignment: false,
            always_rewrite_dns: false,
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

    fn slave() -> Interface {
        Interface {
            index: 5,
            name: "eth1".into(),
            mtu: 1500,
            mac: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            external: false,
        }
    }

    fn addr(s: &str, prefix_len: u8, preferred: u32, valid: u32) -> IfaceAddress {
        IfaceAddress {
            addr: s.parse().unwrap(),
            prefix_len,
            preferred_secs: preferred,
            valid_secs: valid,
        }
    }

    /// S4: one global address, default route present -> one prefix with
    /// lifetimes preserved, RDNSS pointing at the address, router
    /// lifetime = 3 * MaxRtrAdvInterval.
    #[test]
    fn s4_ra_synthesis_matches_scenario() {
        let config = test_config();
        let slave = slave();
        let addrs = vec![addr("2001:db8::1", 64, 1800, 3600)];

        let packet = build_router_advertisement(&config, &slave, addrs, true, None, false);

        let lladdr = find_option(&packet, RA_HEADER_LEN, packet.len(), message::ND_OPT_SOURCE_LINKADDR).unwrap();
        assert_eq!(lladdr.payload(&packet), &slave.mac);

        let mtu = find_option(&packet, RA_HEADER_LEN, packet.len(), message::ND_OPT_MTU).unwrap();
        assert_eq!(u32::from_be_bytes(mtu.payload(&packet)[2..6].try_into().unwrap()), 1500);

        let prefixes: Vec<_> = NdOptionCursor::new(&packet, RA_HEADER_LEN, packet.len())
            .filter(|o| o.otype == message::ND_OPT_PREFIX_INFORMATION)
            .collect();
        assert_eq!(prefixes.len(), 1);
        let p = prefixes[0].payload(&packet);
        assert_eq!(p[0], 64);
        assert_eq!(p[1], PI_FLAG_ONLINK | PI_FLAG_AUTO);
        let valid = u32::from_be_bytes(p[2..6].try_into().unwrap());
        let preferred = u32::from_be_bytes(p[6..10].try_into().unwrap());
        assert_eq!((preferred, valid), (1800, 3600));
        let prefix_addr = Ipv6Addr::from(<[u8; 16]>::try_from(&p[14..30]).unwrap());
        assert_eq!(prefix_addr, "2001:db8::".parse::<Ipv6Addr>().unwrap());

        let dns = find_option(&packet, RA_HEADER_LEN, packet.len(), message::ND_OPT_RECURSIVE_DNS).unwrap();
        let dns_addr = Ipv6Addr::from(<[u8; 16]>::try_from(&dns.payload(&packet)[6..22]).unwrap());
        assert_eq!(dns_addr, "2001:db8::1".parse::<Ipv6Addr>().unwrap());

        // test_config() sets Dhcpv6Mode::Server, so the O flag must be set.
        assert_eq!(message::ra_flags(&packet) & message::RA_FLAG_OTHER, message::RA_FLAG_OTHER);
        let mut lifetime_bytes = [0u8; 2];
        lifetime_bytes.copy_from_slice(&packet[6..8]);
        assert_eq!(u16::from_be_bytes(lifetime_bytes), 3 * Config::DEFAULT_MAX_RTR_ADV_INTERVAL_SECS as u16);
    }

    /// S5: both a ULA and a public prefix, `deprecate_ula_if_public_avail`
    /// set -> the ULA's preferred lifetime is forced to 0, valid
    /// untouched; the public prefix is unchanged.
    #[test]
    fn s5_ula_deprecated_when_public_available() {
        let mut config = test_config();
        config.deprecate_ula_if_public_avail = true;
        let slave = slave();
        let addrs = vec![
            addr("fd00::1", 64, 1800, 3600),
            addr("2001:db8::1", 64, 1800, 3600),
        ];

        let packet = build_router_advertisement(&config, &slave, addrs, false, None, false);
        let prefixes: Vec<_> = NdOptionCursor::new(&packet, RA_HEADER_LEN, packet.len())
            .filter(|o| o.otype == message::ND_OPT_PREFIX_INFORMATION)
            .collect();
        assert_eq!(prefixes.len(), 2);

        for opt in prefixes {
            let p = opt.payload(&packet);
            let prefix_addr = Ipv6Addr::from(<[u8; 16]>::try_from(&p[14..30]).unwrap());
            let preferred = u32::from_be_bytes(p[6..10].try_into().unwrap());
            let valid = u32::from_be_bytes(p[2..6].try_into().unwrap());
            if prefix_addr.octets()[0] == 0xfd {
                assert_eq!(preferred, 0);
                assert_eq!(valid, 3600);
            } else {
                assert_eq!(preferred, 1800);
                assert_eq!(valid, 3600);
            }
        }
    }

    #[test]
    fn invariant_no_ula_with_preferred_when_deprecation_off_stays_unchanged() {
        let config = test_config();
        let slave = slave();
        let addrs = vec![addr("fd00::1", 64, 1800, 3600), addr("2001:db8::1", 64, 1800, 3600)];
        let packet = build_router_advertisement(&config, &slave, addrs, false, None, false);
        let prefixes: Vec<_> = NdOptionCursor::new(&packet, RA_HEADER_LEN, packet.len())
            .filter(|o| o.otype == message::ND_OPT_PREFIX_INFORMATION)
            .collect();
        for opt in prefixes {
            let p = opt.payload(&packet);
            let preferred = u32::from_be_bytes(p[6..10].try_into().unwrap());
            assert_eq!(preferred, 1800);
        }
    }

    #[test]
    fn duplicate_prefixes_are_folded() {
        let config = test_config();
        let slave = slave();
        let addrs = vec![
            addr("2001:db8::1", 64, 1800, 3600),
            addr("2001:db8::2", 64, 900, 1800),
        ];
        let packet = build_router_advertisement(&config, &slave, addrs, false, None, false);
        let prefixes: Vec<_> = NdOptionCursor::new(&packet, RA_HEADER_LEN, packet.len())
            .filter(|o| o.otype == message::ND_OPT_PREFIX_INFORMATION)
            .collect();
        assert_eq!(prefixes.len(), 1);
    }

    #[test]
    fn shutdown_advert_has_zero_lifetime_and_no_prefixes() {
        let config = test_config();
        let slave = slave();
        let packet = build_router_advertisement(&config, &slave, vec![], false, None, true);
        let lifetime = u16::from_be_bytes([packet[6], packet[7]]);
        assert_eq!(lifetime, 0);
        let prefixes: Vec<_> = NdOptionCursor::new(&packet, RA_HEADER_LEN, packet.len())
            .filter(|o| o.otype == message::ND_OPT_PREFIX_INFORMATION)
            .collect();
        assert!(prefixes.is_empty());
    }

    #[test]
    fn dns_search_list_is_padded_to_8_octet_boundary() {
        let encoded = encode_dns_search_list("example.com", 30);
        assert_eq!(encoded.len() % OPTION_UNIT, 0);
        assert_eq!(encoded[1] as usize * OPTION_UNIT, encoded.len());
    }

    #[test]
    fn rearm_delay_stays_within_configured_bounds() {
        let config = test_config();
        for _ in 0..50 {
            let delay = rearm_delay_secs(&config);
            assert!(delay >= config.min_rtr_adv_interval_secs);
            assert!(delay < config.max_rtr_adv_interval_secs);
        }
    }
}

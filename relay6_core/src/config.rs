//! Process-wide configuration, built once at startup and handed to every
//! collaborator by shared reference. Nothing here is mutated after
//! [`Config::new`] returns; runtime-changeable state (RA timers, shutdown)
//! lives in the modules that own it, not here.

use std::net::Ipv6Addr;

/// Mode the Router Discovery subsystem runs in on the master/slave pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterDiscoveryMode {
    /// Forward RA/RS between master and slaves, rewriting as needed.
    Relay,
    /// Synthesize RAs on every slave from locally learned information.
    Server,
}

/// Mode the DHCPv6 subsystem runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dhcpv6Mode {
    /// Wrap/unwrap RELAY-FORW/RELAY-REPL envelopes (the conformant path).
    Relay,
    /// Smuggle routing state through the client-id for servers that do
    /// not understand RELAY-FORW.
    Transparent,
    /// Answer requests directly with synthesized replies; no upstream
    /// server is contacted.
    Server,
}

/// A downstream link, tagged `external` when it should be treated as an
/// NDP-only collaborator (no DHCPv6/RD traffic is ever sent or expected
/// on it).
#[derive(Debug, Clone)]
pub struct SlaveSpec {
    pub name: String,
    pub external: bool,
}

/// Every flag from the command-line surface, resolved to its effective
/// value (so `-A`/`-S` expansion has already happened by the time a
/// `Config` exists).
#[derive(Debug, Clone)]
pub struct Config {
    pub master: String,
    pub slaves: Vec<SlaveSpec>,

    pub router_discovery: Option<RouterDiscoveryMode>,
    pub dhcpv6: Option<Dhcpv6Mode>,
    pub ndp_proxy: bool,

    pub enable_forwarding: bool,
    pub send_router_solicitation: bool,
    pub force_address_assignment: bool,
    pub always_rewrite_dns: bool,
    pub ndp_route_learning: bool,
    pub always_announce_default_router: bool,
    pub deprecate_ula_if_public_avail: bool,

    /// When `false` (default), a slave with no global address falls back
    /// to the master's global address for `link_address`, matching the
    /// original's behavior. When `true`, such a packet is dropped
    /// instead. See SPEC_FULL.md §4.2, Open Question (ii).
    pub strict_link_address: bool,

    /// Explicit DNS server to announce/rewrite to, overriding the
    /// "slave's own address" default when set.
    pub dns_address: Option<Ipv6Addr>,

    pub min_rtr_adv_interval_secs: u32,
    pub max_rtr_adv_interval_secs: u32,
    pub max_valid_time_secs: u32,
    pub max_prefixes: usize,

    pub pidfile: Option<std::path::PathBuf>,
    pub daemonize: bool,
    pub verbosity: u8,
}

impl Config {
    /// Recommended defaults from §4.3 ("recommended defaults: 3 and 10")
    /// and §4.3's `MaxValidTime` floor of 86400 seconds.
    pub const DEFAULT_MIN_RTR_ADV_INTERVAL_SECS: u32 = 3;
    pub const DEFAULT_MAX_RTR_ADV_INTERVAL_SECS: u32 = 10;
    pub const DEFAULT_MAX_VALID_TIME_SECS: u32 = 86400;
    pub const DEFAULT_MAX_PREFIXES: usize = 4;

    pub fn enable_dhcpv6_relay(&self) -> bool {
        matches!(self.dhcpv6, Some(Dhcpv6Mode::Relay) | Some(Dhcpv6Mode::Transparent))
    }

    pub fn enable_dhcpv6_server(&self) -> bool {
        matches!(self.dhcpv6, Some(Dhcpv6Mode::Server))
    }

    pub fn broken_server_compat(&self) -> bool {
        matches!(self.dhcpv6, Some(Dhcpv6Mode::Transparent))
    }

    pub fn router_discovery_relay(&self) -> bool {
        matches!(self.router_discovery, Some(RouterDiscoveryMode::Relay))
    }

    pub fn router_discovery_server(&self) -> bool {
        matches!(self.router_discovery, Some(RouterDiscoveryMode::Server))
    }

    /// §6: exit code 5 is "no relays enabled" — at least one of RD,
    /// DHCPv6, or NDP must be active.
    pub fn any_relay_enabled(&self) -> bool {
        self.router_discovery.is_some() || self.dhcpv6.is_some() || self.ndp_proxy
    }
}

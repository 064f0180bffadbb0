//! Command-line surface (§6): a single flat [`clap::Parser`] struct,
//! since every flag in §6 is an independent switch rather than a
//! subcommand, matching the `cvmutil`-style single `#[derive(Parser)]`
//! struct used elsewhere in the teacher workspace.

use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

use relay6_core::config::{Config, Dhcpv6Mode, RouterDiscoveryMode, SlaveSpec};

/// `-R <mode>` (§6): Router Discovery support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RdArg {
    Relay,
    Server,
}

/// `-D <mode>` (§6): DHCPv6 support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DhcpArg {
    Relay,
    Transparent,
    Server,
}

/// `relay6d [options] <master> [[~]<slave> ...]` (§6). A leading `~` on a
/// slave name marks it *external* (NDP effect only); parsed by
/// [`parse_slave`] rather than by clap's own value parsing, since the
/// tag is stripped from the name clap stores.
#[derive(Parser, Debug)]
#[command(
    name = "relay6d",
    about = "IPv6 Router Discovery / DHCPv6 / NDP relay between one master and zero or more slave links"
)]
pub struct Cli {
    /// Automatic relay (defaults: RrelayDrelayNFslr).
    #[arg(short = 'A')]
    pub auto_relay: bool,

    /// Automatic server (defaults: RserverDserver).
    #[arg(short = 'S')]
    pub auto_server: bool,

    /// Enable Router Discovery support.
    #[arg(short = 'R', value_enum)]
    pub router_discovery: Option<RdArg>,

    /// Enable DHCPv6 support.
    #[arg(short = 'D', value_enum)]
    pub dhcpv6: Option<DhcpArg>,

    /// Enable Neighbor Discovery Proxy.
    #[arg(short = 'N')]
    pub ndp_proxy: bool,

    /// Enable forwarding for interfaces.
    #[arg(short = 'F')]
    pub enable_forwarding: bool,

    /// Send initial RD solicitation to the master.
    #[arg(short = 's')]
    pub send_router_solicitation: bool,

    /// RD: force local address assignment.
    #[arg(short = 'l')]
    pub force_address_assignment: bool,

    /// RD/DHCPv6: always rewrite name server.
    #[arg(short = 'n')]
    pub always_rewrite_dns: bool,

    /// NDP: learn routes to neighbors.
    #[arg(short = 'r')]
    pub ndp_route_learning: bool,

    /// Set pidfile.
    #[arg(short = 'p', value_name = "pidfile")]
    pub pidfile: Option<PathBuf>,

    /// Daemonize.
    #[arg(short = 'd')]
    pub daemonize: bool,

    /// Increase logging verbosity (repeatable).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Upstream, provider-facing interface.
    #[arg(required = true)]
    pub master: String,

    /// Downstream, client-facing interfaces. A leading `~` marks an
    /// interface *external* (§6): NDP is told about it but no RD/DHCPv6
    /// traffic is ever sent or expected there.
    pub slaves: Vec<String>,
}

/// Default location for the pidfile, matching the original's
/// `/var/run/6relayd.pid` (§6, §9's daemonization note).
pub const DEFAULT_PIDFILE: &str = "/var/run/relay6d.pid";

/// Plain accumulator for the flags that `-A`/`-S` expand into before
/// [`Cli::into_config`] folds them with the individually-set switches;
/// kept outside [`Config`] itself only because `Config` has no
/// `Default` impl (every field is meant to be set deliberately once).
#[derive(Debug, Default)]
pub struct RawFlags {
    pub router_discovery: Option<RouterDiscoveryMode>,
    pub dhcpv6: Option<Dhcpv6Mode>,
    pub ndp_proxy: bool,
    pub enable_forwarding: bool,
    pub send_router_solicitation: bool,
    pub force_address_assignment: bool,
    pub always_rewrite_dns: bool,
    pub ndp_route_learning: bool,
}

impl Cli {
    /// Resolves `-A`/`-S` shorthand against the explicitly-set flags and
    /// builds the final [`Config`]. Returns `Err(message)` for the one
    /// usage error this layer can detect before interface resolution:
    /// `-R`/`-D` conflicting with an `-A`/`-S` expansion that already
    /// picked a mode (clap's own parsing rejects unknown `-R`/`-D`
    /// values itself via [`RdArg`]/[`DhcpArg`]).
    pub fn into_config(self) -> Result<Config, String> {
        let mut flags = RawFlags::default();
        if self.auto_relay {
            crate::apply_automatic_relay(&mut flags);
        }
        if self.auto_server {
            crate::apply_automatic_server(&mut flags);
        }

        if let Some(rd) = self.router_discovery {
            flags.router_discovery = Some(match rd {
                RdArg::Relay => RouterDiscoveryMode::Relay,
                RdArg::Server => RouterDiscoveryMode::Server,
            });
        }
        if let Some(d) = self.dhcpv6 {
            flags.dhcpv6 = Some(match d {
                DhcpArg::Relay => Dhcpv6Mode::Relay,
                DhcpArg::Transparent => Dhcpv6Mode::Transparent,
                DhcpArg::Server => Dhcpv6Mode::Server,
            });
        }
        flags.ndp_proxy |= self.ndp_proxy;
        flags.enable_forwarding |= self.enable_forwarding;
        flags.send_router_solicitation |= self.send_router_solicitation;
        flags.force_address_assignment |= self.force_address_assignment;
        flags.always_rewrite_dns |= self.always_rewrite_dns;
        flags.ndp_route_learning |= self.ndp_route_learning;

        let slaves = self
            .slaves
            .iter()
            .map(|raw| parse_slave(raw))
            .collect::<Vec<_>>();

        Ok(Config {
            master: self.master,
            slaves,
            router_discovery: flags.router_discovery,
            dhcpv6: flags.dhcpv6,
            ndp_proxy: flags.ndp_proxy,
            enable_forwarding: flags.enable_forwarding,
            send_router_solicitation: flags.send_router_solicitation,
            force_address_assignment: flags.force_address_assignment,
            always_rewrite_dns: flags.always_rewrite_dns,
            ndp_route_learning: flags.ndp_route_learning,
            always_announce_default_router: false,
            deprecate_ula_if_public_avail: true,
            strict_link_address: false,
            dns_address: None,
            min_rtr_adv_interval_secs: Config::DEFAULT_MIN_RTR_ADV_INTERVAL_SECS,
            max_rtr_adv_interval_secs: Config::DEFAULT_MAX_RTR_ADV_INTERVAL_SECS,
            max_valid_time_secs: Config::DEFAULT_MAX_VALID_TIME_SECS,
            max_prefixes: Config::DEFAULT_MAX_PREFIXES,
            pidfile: Some(self.pidfile.unwrap_or_else(|| PathBuf::from(DEFAULT_PIDFILE))),
            daemonize: self.daemonize,
            verbosity: self.verbosity,
        })
    }
}

/// Splits a positional slave argument into `(name, external)`: a leading
/// `~` marks the interface *external* and is stripped from the stored
/// name (§6).
fn parse_slave(raw: &str) -> SlaveSpec {
    match raw.strip_prefix('~') {
        Some(name) => SlaveSpec { name: name.to_owned(), external: true },
        None => SlaveSpec { name: raw.to_owned(), external: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_external_slave_tag() {
        let spec = parse_slave("~eth2");
        assert_eq!(spec.name, "eth2");
        assert!(spec.external);
    }

    #[test]
    fn parses_plain_slave_name() {
        let spec = parse_slave("eth1");
        assert_eq!(spec.name, "eth1");
        assert!(!spec.external);
    }

    #[test]
    fn auto_relay_then_explicit_rd_mode_overrides_server_back_to_relay() {
        let cli = Cli {
            auto_relay: false,
            auto_server: true,
            router_discovery: Some(RdArg::Relay),
            dhcpv6: None,
            ndp_proxy: false,
            enable_forwarding: false,
            send_router_solicitation: false,
            force_address_assignment: false,
            always_rewrite_dns: false,
            ndp_route_learning: false,
            pidfile: None,
            daemonize: false,
            verbosity: 0,
            master: "eth0".into(),
            slaves: vec!["eth1".into()],
        };
        let config = cli.into_config().unwrap();
        assert_eq!(config.router_discovery, Some(RouterDiscoveryMode::Relay));
        assert_eq!(config.dhcpv6, Some(Dhcpv6Mode::Server));
    }
}

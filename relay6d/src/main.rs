//! `relay6d`: the thin process wrapper around [`relay6_core`]. Owns every
//! concern that needs a live process rather than just a socket — argument
//! parsing, logging setup, daemonization, the pidfile, and signal blocking
//! — and calls into [`relay6_core::run`] for the dataplane itself.

mod cli;
mod daemonize;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use relay6_core::config::{Config, Dhcpv6Mode, RouterDiscoveryMode};
use relay6_core::InterfaceRegistry;

use cli::Cli;

/// §6's six exit codes, carried alongside the [`anyhow::Error`] that
/// explains the failure so `main` can log once and translate to a
/// process exit status without re-deriving which category applies.
#[derive(Debug, Clone, Copy)]
enum ExitReason {
    Usage,
    Permission,
    InterfaceOpen,
    SubsystemInit,
    NoRelaysEnabled,
    Daemonize,
}

impl ExitReason {
    fn code(self) -> u8 {
        match self {
            ExitReason::Usage => 1,
            ExitReason::Permission => 2,
            ExitReason::InterfaceOpen => 3,
            ExitReason::SubsystemInit => 4,
            ExitReason::NoRelaysEnabled => 5,
            ExitReason::Daemonize => 6,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err((reason, err)) => {
            tracing::error!(error = %err, "{}", context_message(reason));
            ExitCode::from(reason.code())
        }
    }
}

fn context_message(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::Usage => "invalid arguments",
        ExitReason::Permission => "must be run as root",
        ExitReason::InterfaceOpen => "failed to resolve interface",
        ExitReason::SubsystemInit => "subsystem initialization failed",
        ExitReason::NoRelaysEnabled => "no relays enabled or no slave interfaces specified",
        ExitReason::Daemonize => "failed to daemonize",
    }
}

/// The fallible setup-then-run sequence, each step tagged with the §6
/// exit code it maps to on failure.
fn run(cli: Cli) -> Result<(), (ExitReason, anyhow::Error)> {
    let config = cli
        .into_config()
        .map_err(|msg| (ExitReason::Usage, anyhow::anyhow!(msg)))?;

    if !config.any_relay_enabled() {
        return Err((
            ExitReason::NoRelaysEnabled,
            anyhow::anyhow!("at least one of Router Discovery, DHCPv6, or NDP must be enabled"),
        ));
    }

    if !nix::unistd::Uid::effective().is_root() {
        return Err((ExitReason::Permission, anyhow::anyhow!("effective uid is not 0")));
    }

    let registry = relay6_core::resolve_interfaces(&config)
        .context("resolving master/slave interfaces")
        .map_err(|e| (ExitReason::InterfaceOpen, e))?;

    if config.daemonize {
        daemonize::daemonize()
            .context("double-fork/setsid daemonization")
            .map_err(|e| (ExitReason::Daemonize, e))?;
    }

    if let Some(pidfile) = &config.pidfile {
        if let Err(e) = daemonize::write_pidfile(pidfile) {
            tracing::warn!(error = %e, path = %pidfile.display(), "failed to write pidfile");
        }
    }

    log_startup(&config, &registry);

    relay6_core::run(&config, &registry)
        .context("running event loop")
        .map_err(|e| (ExitReason::SubsystemInit, e))
}

fn log_startup(config: &Config, registry: &InterfaceRegistry) {
    tracing::info!(
        master = %registry.master.name,
        slaves = registry.slaves.len(),
        router_discovery = ?config.router_discovery,
        dhcpv6 = ?config.dhcpv6,
        ndp_proxy = config.ndp_proxy,
        "relay6d starting"
    );
}

/// `-A`: "automatic relay" — the original's shorthand for
/// `RrelayDrelayNFslr` (§6).
fn apply_automatic_relay(flags: &mut cli::RawFlags) {
    flags.router_discovery = Some(RouterDiscoveryMode::Relay);
    flags.dhcpv6 = Some(Dhcpv6Mode::Relay);
    flags.ndp_proxy = true;
    flags.enable_forwarding = true;
    flags.send_router_solicitation = true;
    flags.ndp_route_learning = true;
    flags.force_address_assignment = true;
}

/// `-S`: "automatic server" — shorthand for `RserverDserver` (§6).
fn apply_automatic_server(flags: &mut cli::RawFlags) {
    flags.router_discovery = Some(RouterDiscoveryMode::Server);
    flags.dhcpv6 = Some(Dhcpv6Mode::Server);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automatic_relay_enables_expected_fields() {
        let mut flags = cli::RawFlags::default();
        apply_automatic_relay(&mut flags);
        assert_eq!(flags.router_discovery, Some(RouterDiscoveryMode::Relay));
        assert_eq!(flags.dhcpv6, Some(Dhcpv6Mode::Relay));
        assert!(flags.ndp_proxy);
        assert!(flags.enable_forwarding);
        assert!(flags.send_router_solicitation);
        assert!(flags.ndp_route_learning);
        assert!(flags.force_address_assignment);
    }

    #[test]
    fn automatic_server_enables_expected_fields() {
        let mut flags = cli::RawFlags::default();
        apply_automatic_server(&mut flags);
        assert_eq!(flags.router_discovery, Some(RouterDiscoveryMode::Server));
        assert_eq!(flags.dhcpv6, Some(Dhcpv6Mode::Server));
    }

    #[test]
    fn exit_codes_match_spec() {
        assert_eq!(ExitReason::Usage.code(), 1);
        assert_eq!(ExitReason::Permission.code(), 2);
        assert_eq!(ExitReason::InterfaceOpen.code(), 3);
        assert_eq!(ExitReason::SubsystemInit.code(), 4);
        assert_eq!(ExitReason::NoRelaysEnabled.code(), 5);
        assert_eq!(ExitReason::Daemonize.code(), 6);
    }
}

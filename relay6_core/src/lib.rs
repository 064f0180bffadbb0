//! IPv6 link relay dataplane: Router Discovery and DHCPv6 relaying/
//! serving between one upstream "master" link and zero or more
//! downstream "slave" links, driven by a single-threaded event loop.
//!
//! This crate is the library half of the workspace; `relay6d` is the
//! thin process wrapper that parses arguments, daemonizes, and calls
//! into [`run`].

pub mod config;
pub mod dhcpv6;
pub mod error;
pub mod event_loop;
pub mod iface;
pub mod log;
pub mod ndp;
pub mod net;
pub mod router_discovery;
pub mod sysctl;

pub use config::Config;
pub use error::{Error, Result, SetupError};
pub use iface::{Interface, InterfaceRegistry};
pub use log::{LogSink, NullSink};

use nix::sys::signal::SigSet;

use crate::event_loop::EventLoop;

/// Resolves the master and every slave named in `config` into an
/// [`InterfaceRegistry`] (§3, §4.1). Fatal on the first unresolvable
/// name — an unresolvable interface is a setup error (§7a).
pub fn resolve_interfaces(config: &Config) -> Result<InterfaceRegistry> {
    let master = Interface::resolve(&config.master, false)?;
    let mut slaves = Vec::with_capacity(config.slaves.len());
    for spec in &config.slaves {
        slaves.push(Interface::resolve(&spec.name, spec.external)?);
    }
    Ok(InterfaceRegistry::new(master, slaves))
}

/// Builds the event loop, registers whichever subsystems `config`
/// enables, and runs it to completion (i.e. until a stop signal is
/// delivered). This is the single entry point `relay6d::main` calls
/// after parsing arguments and resolving interfaces.
pub fn run(config: &Config, registry: &InterfaceRegistry) -> Result<()> {
    let mut event_loop = EventLoop::new(registry)?;

    let mut mask = SigSet::empty();
    mask.add(nix::sys::signal::Signal::SIGTERM);
    mask.add(nix::sys::signal::Signal::SIGHUP);
    mask.add(nix::sys::signal::Signal::SIGINT);
    mask.add(nix::sys::signal::Signal::SIGUSR1);
    mask.thread_block()
        .map_err(|e| Error::Setup(SetupError::Epoll(std::io::Error::from(e))))?;
    event_loop.register_signals(mask)?;

    let router_discovery_state = if config.router_discovery.is_some() {
        Some(router_discovery::init(config, registry, &mut event_loop)?)
    } else {
        None
    };

    if config.enable_dhcpv6_relay() || config.enable_dhcpv6_server() {
        dhcpv6::init(config, registry, &mut event_loop)?;
    }

    if config.ndp_proxy {
        ndp::init(config, registry)?;
    }

    if config.enable_forwarding {
        let _ = sysctl::write(&registry.master.name, "forwarding", 1);
        for slave in &registry.slaves {
            let _ = sysctl::write(&slave.name, "forwarding", 1);
        }
    }

    tracing::info!(
        master = %registry.master.name,
        slaves = registry.slaves.len(),
        "relay6d started"
    );

    let result = event_loop.run();

    if let Some(state) = &router_discovery_state {
        router_discovery::shutdown(config, registry, state);
    }
    if config.ndp_proxy {
        ndp::deinit();
    }

    result
}

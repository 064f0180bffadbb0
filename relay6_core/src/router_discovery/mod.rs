//! Router Discovery relay/server subsystem (§4.3): a single raw ICMPv6
//! socket shared by both modes, the Neighbor Discovery option cursor,
//! and the relay-forwarding and server-synthesis implementations tied
//! to the event loop.

mod handlers;
pub mod message;
pub mod options;
mod relay;
mod server;

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::iface::InterfaceRegistry;
use crate::net;
use crate::sysctl;

use handlers::{RaTimer, RaTimerHandler, RdHandler};

/// Handle kept across `init` and `shutdown`: the ICMPv6 socket fd. The
/// underlying `Socket` stays alive inside the event loop's own handler
/// for as long as this handle is used; `shutdown` only needs the fd to
/// send the final advertisement burst.
pub struct RouterDiscoveryState {
    socket_fd: std::os::fd::RawFd,
}

/// Opens the ICMPv6 socket implied by `config`, joins the multicast
/// groups its mode requires, and registers its handler(s) with
/// `event_loop` (§4.3 "Sockets").
pub fn init<'r>(
    config: &'r Config,
    registry: &'r InterfaceRegistry,
    event_loop: &mut EventLoop<'r>,
) -> Result<RouterDiscoveryState> {
    let socket = net::icmp6_raw().map_err(Error::Setup)?;
    net::disable_multicast_loop(&socket).map_err(Error::Setup)?;
    net::set_icmp6_filter(
        net::raw_fd(&socket),
        &[message::ND_ROUTER_ADVERT, message::ND_ROUTER_SOLICIT],
    )
    .map_err(|e| Error::Setup(crate::error::SetupError::SocketCreate(e)))?;
    let socket_fd = net::raw_fd(&socket);

    if config.router_discovery_relay() {
        // §4.3 "Relay mode": all-routers on the master, all-nodes on
        // each slave.
        net::join_multicast(&socket, message::ALL_ROUTERS.parse().unwrap(), registry.master.index)
            .map_err(Error::Setup)?;
        for slave in registry.slaves.iter().filter(|s| !s.external) {
            net::join_multicast(&socket, message::ALL_NODES.parse().unwrap(), slave.index)
                .map_err(Error::Setup)?;
        }
    } else {
        // §4.3 "Server mode": all-routers on the master only. Reception
        // of solicitations sent to a slave's own all-routers group
        // relies on the kernel's own membership there once forwarding
        // is enabled on that slave, not on a join this daemon performs.
        net::join_multicast(&socket, message::ALL_ROUTERS.parse().unwrap(), registry.master.index)
            .map_err(Error::Setup)?;
    }

    let mut timers = Vec::new();
    if config.router_discovery_server() {
        for slave in registry.slaves.iter().filter(|s| !s.external) {
            let timer = Rc::new(RefCell::new(RaTimer::new()?));
            timer.borrow().set_in_secs(0);
            let fd = timer.borrow().raw_fd();
            event_loop.register_timer(
                fd,
                Box::new(RaTimerHandler {
                    config,
                    slave,
                    socket_fd,
                    timer: timer.clone(),
                }),
            )?;
            timers.push((slave.index, timer));
        }
    }

    let rearm_timers = timers.clone();
    event_loop.on_rearm(Box::new(move || {
        for (_, timer) in &rearm_timers {
            timer.borrow().set_in_secs(1);
        }
    }));

    event_loop.register_datagram(
        socket_fd,
        Box::new(RdHandler {
            config,
            registry,
            socket,
            socket_fd,
            timers: timers.clone(),
        }),
    )?;

    if config.router_discovery_relay() {
        if config.send_router_solicitation {
            relay::forward_router_solicitation(registry, socket_fd);
        }
        if config.force_address_assignment {
            for slave in registry.slaves.iter().filter(|s| !s.external) {
                let _ = sysctl::write(&slave.name, "accept_ra", 2);
            }
        }
    }

    Ok(RouterDiscoveryState { socket_fd })
}

/// Server-mode-only final advertisement burst: one RA per slave with
/// router lifetime 0 and no prefixes (§4.3's "Timer" note on shutdown).
/// A no-op in relay mode, matching the original's lack of any
/// equivalent teardown step there.
pub fn shutdown(config: &Config, registry: &InterfaceRegistry, state: &RouterDiscoveryState) {
    if !config.router_discovery_server() {
        return;
    }
    for slave in registry.slaves.iter().filter(|s| !s.external) {
        server::send_router_advert(config, slave, state.socket_fd, true);
    }
}

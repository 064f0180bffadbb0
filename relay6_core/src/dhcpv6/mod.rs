//! DHCPv6 relay/server subsystem (§4.2): wire-format types and
//! rewriting primitives, the stateless responder, and the
//! event-loop-facing handlers that tie them to a pair of UDP sockets.

pub mod duid;
mod handlers;
pub mod message;
pub mod options;
pub mod relay;
mod stateless;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::iface::InterfaceRegistry;
use crate::net;

use handlers::{BrokenReplyHandler, RelayHandler};

/// Opens the DHCPv6 socket(s) implied by `config` and registers their
/// handlers with `event_loop` (§4.2 "Sockets"). A no-op if neither
/// relay nor server mode is enabled.
pub fn init<'r>(
    config: &'r Config,
    registry: &'r InterfaceRegistry,
    event_loop: &mut EventLoop<'r>,
) -> Result<()> {
    let main_socket = net::udp6(message::SERVER_PORT, 32).map_err(Error::Setup)?;
    for slave in registry.slaves.iter().filter(|s| !s.external) {
        net::join_multicast(
            &main_socket,
            message::ALL_DHCP_RELAY_AGENTS_AND_SERVERS.parse().unwrap(),
            slave.index,
        )
        .map_err(Error::Setup)?;
    }
    let main_fd = net::raw_fd(&main_socket);

    let broken_fd = if config.broken_server_compat() {
        let client_socket = net::udp6(message::CLIENT_PORT, 32).map_err(Error::Setup)?;
        net::bind_to_device(&client_socket, &registry.master.name).map_err(Error::Setup)?;
        let fd = net::raw_fd(&client_socket);
        event_loop.register_datagram(
            fd,
            Box::new(BrokenReplyHandler {
                config,
                registry,
                _socket: client_socket,
                main_fd,
            }),
        )?;
        Some(fd)
    } else {
        None
    };

    event_loop.register_datagram(
        main_fd,
        Box::new(RelayHandler {
            config,
            registry,
            socket: main_socket,
            broken_fd,
        }),
    )?;

    Ok(())
}

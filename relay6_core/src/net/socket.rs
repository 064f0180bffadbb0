//! Socket construction helpers shared by the DHCPv6 and Router
//! Discovery subsystems. Built on `socket2` wherever it has a safe
//! wrapper (binding, multicast membership, `SO_BINDTODEVICE`,
//! non-blocking mode); falls back to a direct `nix` `setsockopt` call
//! for the handful of options `socket2` does not expose
//! (`IPV6_RECVPKTINFO`).

use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::fd::AsRawFd;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::SetupError;

/// Opens a UDP/IPv6 socket bound to `port` on the wildcard address,
/// `IPV6_V6ONLY`, `SO_REUSEADDR`, non-blocking, with
/// `IPV6_RECVPKTINFO` enabled and `IPV6_MULTICAST_HOPS` set to `hops`
/// (§4.2's `create_socket`).
pub fn udp6(port: u16, hops: u32) -> Result<Socket, SetupError> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SetupError::SocketCreate)?;
    socket.set_only_v6(true).map_err(SetupError::SocketCreate)?;
    socket.set_reuse_address(true).map_err(SetupError::SocketCreate)?;
    socket.set_nonblocking(true).map_err(SetupError::SocketCreate)?;
    socket
        .set_multicast_hops_v6(hops)
        .map_err(SetupError::SocketCreate)?;
    enable_recv_pktinfo(&socket)?;

    let addr: std::net::SocketAddr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0).into();
    socket.bind(&addr.into()).map_err(SetupError::Bind)?;
    Ok(socket)
}

/// Opens a raw ICMPv6 socket, non-blocking, `IPV6_RECVPKTINFO`
/// enabled, hop limits forced to 255 for sends (RFC 4861), kernel
/// checksums (§4.3's `open_icmpv6_socket`).
pub fn icmp6_raw() -> Result<Socket, SetupError> {
    let socket = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))
        .map_err(SetupError::SocketCreate)?;
    socket.set_nonblocking(true).map_err(SetupError::SocketCreate)?;
    socket
        .set_multicast_hops_v6(255)
        .map_err(SetupError::SocketCreate)?;
    socket.set_unicast_hops_v6(255).map_err(SetupError::SocketCreate)?;
    enable_recv_pktinfo(&socket)?;
    Ok(socket)
}

fn enable_recv_pktinfo(socket: &Socket) -> Result<(), SetupError> {
    nix::sys::socket::setsockopt(socket, nix::sys::socket::sockopt::Ipv6RecvPacketInfo, &true)
        .map_err(|e| SetupError::SocketCreate(std::io::Error::from(e)))
}

/// Joins `group` on the interface identified by `ifindex`
/// (`IPV6_ADD_MEMBERSHIP`).
pub fn join_multicast(socket: &Socket, group: Ipv6Addr, ifindex: u32) -> Result<(), SetupError> {
    socket
        .join_multicast_v6(&group, ifindex)
        .map_err(|source| SetupError::MulticastJoin {
            iface: ifindex.to_string(),
            source,
        })
}

/// Disables multicast loopback — used by the Router Discovery server so
/// its own synthesized advertisements are not received back as if from
/// a peer (§4.3's `open_icmpv6_socket`: "Disable looping for RA-events").
pub fn disable_multicast_loop(socket: &Socket) -> Result<(), SetupError> {
    socket
        .set_multicast_loop_v6(false)
        .map_err(SetupError::SocketCreate)
}

/// Binds the socket to a specific network device (`SO_BINDTODEVICE`),
/// used by the broken-compat client-port socket so replies addressed
/// to the client port reach this relay rather than a local client on
/// the master link (§4.2).
pub fn bind_to_device(socket: &Socket, ifname: &str) -> Result<(), SetupError> {
    socket
        .bind_device(Some(ifname.as_bytes()))
        .map_err(SetupError::SocketCreate)
}

pub fn raw_fd(socket: &Socket) -> std::os::fd::RawFd {
    socket.as_raw_fd()
}

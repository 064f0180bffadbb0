//! Wires the wire-format primitives in [`super::relay`] and
//! [`super::stateless`] to the event loop: the two
//! [`crate::event_loop::DatagramHandler`] impls registered by
//! [`super::init`], one per DHCPv6 socket.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::fd::{AsRawFd, RawFd};

use nix::sys::uio::IoSlice;
use socket2::Socket;

use crate::config::Config;
use crate::dhcpv6::duid::BrokenDuid;
use crate::dhcpv6::message::{
    is_client_originated, ALL_DHCP_RELAY_AGENTS_AND_SERVERS, ALL_DHCP_SERVERS, CLIENT_HEADER_LEN,
    CLIENT_PORT, RELAY_REPL, SERVER_PORT,
};
use crate::dhcpv6::options::{find_option, has_auth_option, OPT_CLIENTID};
use crate::dhcpv6::relay::{
    build_relay_forward_header, dns_servers_need_rewrite, find_dns_servers, next_hop_count,
    rewrite_dns_servers, unwrap_relay_reply,
};
use crate::dhcpv6::stateless;
use crate::event_loop::{DatagramHandler, RECV_BUFFER_LEN};
use crate::iface::Interface;
use crate::net::send_with_pktinfo;
use crate::InterfaceRegistry;

/// Bound to the main DHCPv6 socket (UDP/547): the central dispatcher
/// mirroring the original's `handle_dhcpv6` (§4.2).
pub struct RelayHandler<'r> {
    pub config: &'r Config,
    pub registry: &'r InterfaceRegistry,
    /// Owns the UDP/547 socket for the process's lifetime; closed on
    /// drop when the event loop shuts down (§5).
    pub socket: Socket,
    /// Set only in broken-compat mode: the fd of the UDP/546 socket
    /// bound to the master device, used to send the rewritten client
    /// request so it arrives at the (non-conformant) server with
    /// source port 546.
    pub broken_fd: Option<RawFd>,
}

impl DatagramHandler for RelayHandler<'_> {
    fn handle(&mut self, src: SocketAddrV6, data: &[u8], iface: Option<&Interface>) {
        let Some(iface) = iface else { return };
        let main_fd = self.socket.as_raw_fd();

        if self.registry.is_master(iface.index) {
            handle_server_response(self.config, self.registry, main_fd, data);
            return;
        }

        if data.is_empty() || !is_client_originated(data[0]) {
            return;
        }

        if self.config.enable_dhcpv6_server() {
            stateless::handle_client_request(self.config.max_valid_time_secs, main_fd, src, data, iface);
        } else if self.config.broken_server_compat() {
            if let Some(broken_fd) = self.broken_fd {
                handle_client_request_broken(self.registry, broken_fd, src, data, iface);
            }
        } else {
            handle_client_request(self.config, self.registry, main_fd, src, data, iface);
        }
    }
}

/// Bound to the broken-compat client-port socket (UDP/546, bound to
/// the master device): receives the non-conformant server's replies.
pub struct BrokenReplyHandler<'r> {
    pub config: &'r Config,
    pub registry: &'r InterfaceRegistry,
    /// Owns the UDP/546 socket for the process's lifetime; never read
    /// after registration, kept only so it is dropped (closed) with
    /// the handler rather than earlier.
    pub _socket: Socket,
    /// The main socket's fd, used to forward the cleaned reply on to
    /// the client's slave link.
    pub main_fd: RawFd,
}

impl DatagramHandler for BrokenReplyHandler<'_> {
    fn handle(&mut self, _src: SocketAddrV6, data: &[u8], iface: Option<&Interface>) {
        let Some(iface) = iface else { return };
        if !self.registry.is_master(iface.index) {
            return;
        }
        handle_server_response_broken(self.config, self.registry, self.main_fd, data);
    }
}

/// Client→server path, standard relay (§4.2).
fn handle_client_request(
    config: &Config,
    registry: &InterfaceRegistry,
    send_fd: RawFd,
    src: SocketAddrV6,
    data: &[u8],
    slave: &Interface,
) {
    let inbound_hop = if data[0] == crate::dhcpv6::message::RELAY_FORW && data.len() > 1 {
        Some(data[1])
    } else {
        None
    };
    let Some(hop_count) = next_hop_count(inbound_hop) else {
        tracing::debug!(hop = ?inbound_hop, "dropping RELAY-FORW: hop limit reached");
        return;
    };

    let link_address = match slave.first_global_address(config.max_valid_time_secs) {
        Some(addr) => addr,
        None if !config.strict_link_address => {
            match registry.master.first_global_address(config.max_valid_time_secs) {
                Some(addr) => addr,
                None => return,
            }
        }
        None => return,
    };

    let header = build_relay_forward_header(
        hop_count,
        link_address,
        *src.ip(),
        slave.index,
        data.len() as u16,
    );
    let dst: Ipv6Addr = ALL_DHCP_SERVERS.parse().unwrap();
    let dst = SocketAddrV6::new(dst, SERVER_PORT, 0, 0);
    let _ = send_with_pktinfo(
        send_fd,
        dst,
        registry.master.index,
        &[IoSlice::new(&header), IoSlice::new(data)],
    );
}

/// Client→server path, broken-server compatibility (§4.2): smuggles
/// `(slave ifindex, client link-local)` into the client-id option.
fn handle_client_request_broken(
    registry: &InterfaceRegistry,
    send_fd: RawFd,
    src: SocketAddrV6,
    data: &[u8],
    slave: &Interface,
) {
    if data.len() + BrokenDuid::LEN > RECV_BUFFER_LEN {
        return;
    }
    if has_auth_option(data, CLIENT_HEADER_LEN, data.len()) {
        return;
    }
    let Some(client_id) = find_option(data, CLIENT_HEADER_LEN, data.len(), OPT_CLIENTID) else {
        return;
    };

    let mut buf = [0u8; RECV_BUFFER_LEN];
    buf[..data.len()].copy_from_slice(data);
    let mut used_len = data.len();

    let marker = BrokenDuid::new(slave.index, *src.ip()).encode();
    if crate::dhcpv6::options::insert_in_option(
        &mut buf,
        &mut used_len,
        client_id,
        client_id.payload_offset,
        &marker,
    )
    .is_err()
    {
        return;
    }

    let dst: Ipv6Addr = ALL_DHCP_RELAY_AGENTS_AND_SERVERS.parse().unwrap();
    let dst = SocketAddrV6::new(dst, SERVER_PORT, 0, 0);
    let _ = send_with_pktinfo(
        send_fd,
        dst,
        registry.master.index,
        &[IoSlice::new(&buf[..used_len])],
    );
}

/// Server→client path, standard relay (§4.2).
fn handle_server_response(config: &Config, registry: &InterfaceRegistry, send_fd: RawFd, data: &[u8]) {
    let Ok(unwrapped) = unwrap_relay_reply(data, 0, data.len()) else {
        return;
    };
    let Some(slave) = registry
        .slaves
        .iter()
        .find(|s| s.index == unwrapped.slave_ifindex)
    else {
        return;
    };

    let inner_start = unwrapped.inner.payload_offset;
    let inner_len = unwrapped.inner.payload_len;
    if inner_len == 0 {
        return;
    }
    if data[inner_start] == RELAY_REPL {
        // Nested RELAY-REPL: forward unmodified to the next relay's
        // server port (§4.2).
        let dst = SocketAddrV6::new(unwrapped.peer_address, SERVER_PORT, 0, 0);
        let _ = send_with_pktinfo(
            send_fd,
            dst,
            slave.index,
            &[IoSlice::new(&data[inner_start..inner_start + inner_len])],
        );
        return;
    }
    if inner_len < CLIENT_HEADER_LEN {
        return;
    }

    let mut buf = [0u8; RECV_BUFFER_LEN];
    let n = inner_len.min(RECV_BUFFER_LEN);
    buf[..n].copy_from_slice(&data[inner_start..inner_start + n]);

    if !finish_dns_rewrite(config, slave, &mut buf[..n]) {
        return;
    }

    let dst = SocketAddrV6::new(unwrapped.peer_address, CLIENT_PORT, 0, 0);
    let _ = send_with_pktinfo(send_fd, dst, slave.index, &[IoSlice::new(&buf[..n])]);
}

/// Server→client path, broken-server compatibility (§4.2): recognizes
/// and strips the smuggled DUID prefix to recover the true
/// destination.
fn handle_server_response_broken(
    config: &Config,
    registry: &InterfaceRegistry,
    send_fd: RawFd,
    data: &[u8],
) {
    if has_auth_option(data, CLIENT_HEADER_LEN, data.len()) {
        return;
    }

    let mut buf = [0u8; RECV_BUFFER_LEN];
    let n = data.len().min(RECV_BUFFER_LEN);
    buf[..n].copy_from_slice(&data[..n]);
    let mut used_len = n;

    let mut found: Option<(u32, Ipv6Addr)> = None;
    let mut cursor_start = CLIENT_HEADER_LEN;
    while let Some(opt) = find_option(&buf, cursor_start, used_len, OPT_CLIENTID) {
        if let Some(marker) = BrokenDuid::recognize(opt.payload(&buf)) {
            let ifindex = marker.ifindex;
            let link_local = marker.link_local();
            if crate::dhcpv6::options::remove_in_option(
                &mut buf,
                &mut used_len,
                opt,
                opt.payload_offset,
                BrokenDuid::LEN,
            )
            .is_ok()
            {
                found = Some((ifindex, link_local));
            }
            break;
        }
        cursor_start = opt.payload_offset + opt.payload_len;
    }

    let Some((ifindex, link_local)) = found else {
        return;
    };
    let Some(slave) = registry.slaves.iter().find(|s| s.index == ifindex) else {
        return;
    };

    if !finish_dns_rewrite(config, slave, &mut buf[..used_len]) {
        return;
    }

    let dst = SocketAddrV6::new(link_local, CLIENT_PORT, 0, 0);
    let _ = send_with_pktinfo(send_fd, dst, slave.index, &[IoSlice::new(&buf[..used_len])]);
}

/// Shared DNS-rewrite-then-forward tail for both server→client paths
/// (§4.2's DNS-rewriting rule, applied uniformly whether the reply
/// arrived relay-encapsulated or via the broken-compat client port).
/// Returns `false` if the packet must be dropped rather than sent
/// (an `AUTH` option made rewriting impossible and rewriting was
/// required).
fn finish_dns_rewrite(config: &Config, slave: &Interface, payload: &mut [u8]) -> bool {
    let Some(dns) = find_dns_servers(payload, CLIENT_HEADER_LEN, payload.len()) else {
        return true;
    };
    let needs_rewrite = config.always_rewrite_dns || dns_servers_need_rewrite(payload, dns);
    if !needs_rewrite {
        return true;
    }
    if has_auth_option(payload, CLIENT_HEADER_LEN, payload.len()) {
        return false;
    }
    let Some(replacement) = config
        .dns_address
        .or_else(|| slave.first_global_address(config.max_valid_time_secs))
    else {
        return false;
    };
    rewrite_dns_servers(payload, dns, replacement);
    true
}

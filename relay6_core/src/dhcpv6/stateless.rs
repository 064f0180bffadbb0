//! Stateless DHCPv6 responder (§4.2 "Stateless server mode"): answers
//! `SOLICIT`/`INFORMATION-REQUEST`/`REQUEST` directly with a
//! synthesized reply; no upstream server is ever contacted. `REBIND`
//! is ignored since this relay never does stateful address
//! assignment (§1 Non-goals).

use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::fd::RawFd;

use nix::sys::uio::IoSlice;

use crate::dhcpv6::duid::server_id_duid;
use crate::dhcpv6::message::{ADVERTISE, CLIENT_HEADER_LEN, CLIENT_PORT, REBIND, RELAY_FORW, REPLY, SERVER_PORT, SOLICIT};
use crate::dhcpv6::options::{
    OptionCursor, OPT_CLIENTID, OPT_DNS_SERVERS, OPT_IA_NA, OPT_SERVERID, OPT_STATUS_CODE,
    STATUS_NO_ADDRS_AVAIL,
};
use crate::dhcpv6::relay::{ascend_fixup, descend};
use crate::iface::Interface;
use crate::net::send_with_pktinfo;

const MAX_CLIENTID_LEN: usize = 130;

/// Handles one client request received on `slave`; replies in place
/// via `send_fd` when the request warrants a reply.
pub fn handle_client_request(
    max_valid_secs: u32,
    send_fd: RawFd,
    src: SocketAddrV6,
    data: &[u8],
    slave: &Interface,
) {
    if data.is_empty() {
        return;
    }

    let nested = data[0] == RELAY_FORW;
    let (levels, inner_offset, inner_len) = if nested {
        match descend(data, 0, data.len()) {
            Ok(d) => (d.levels, d.inner_offset, d.inner_len),
            Err(_) => return,
        }
    } else {
        (Vec::new(), 0, data.len())
    };

    let inner = &data[inner_offset..inner_offset + inner_len];
    if inner.len() < CLIENT_HEADER_LEN {
        return;
    }

    let msg_type = inner[0];
    if msg_type == REBIND {
        return;
    }
    let reply_type = if msg_type == SOLICIT { ADVERTISE } else { REPLY };

    let our_server_id = server_id_duid(slave.mac);

    let mut client_id: Option<&[u8]> = None;
    let mut wants_status = false;
    for opt in OptionCursor::new(inner, CLIENT_HEADER_LEN, inner.len()) {
        match opt.otype {
            OPT_CLIENTID if opt.payload_len <= MAX_CLIENTID_LEN => {
                client_id = Some(opt.payload(inner));
            }
            OPT_SERVERID => {
                if opt.payload(inner) != our_server_id {
                    return; // addressed to a different server
                }
            }
            OPT_IA_NA => wants_status = true,
            _ => {}
        }
    }
    let Some(client_id) = client_id else {
        return;
    };

    let Some(dns_addr) = slave.first_global_address(max_valid_secs) else {
        return;
    };

    let mut reply = Vec::with_capacity(256);
    reply.push(reply_type);
    reply.extend_from_slice(&inner[1..CLIENT_HEADER_LEN]);

    reply.extend_from_slice(&OPT_DNS_SERVERS.to_be_bytes());
    reply.extend_from_slice(&16u16.to_be_bytes());
    reply.extend_from_slice(&dns_addr.octets());

    reply.extend_from_slice(&OPT_SERVERID.to_be_bytes());
    reply.extend_from_slice(&(our_server_id.len() as u16).to_be_bytes());
    reply.extend_from_slice(&our_server_id);

    reply.extend_from_slice(&OPT_CLIENTID.to_be_bytes());
    reply.extend_from_slice(&(client_id.len() as u16).to_be_bytes());
    reply.extend_from_slice(client_id);

    if wants_status {
        reply.extend_from_slice(&OPT_STATUS_CODE.to_be_bytes());
        reply.extend_from_slice(&2u16.to_be_bytes());
        reply.extend_from_slice(&STATUS_NO_ADDRS_AVAIL.to_be_bytes());
    }

    let dst_ip: Ipv6Addr = *src.ip();
    if nested {
        let mut out = data.to_vec();
        let delta = reply.len() as i32 - inner_len as i32;
        out.splice(inner_offset..inner_offset + inner_len, reply.iter().copied());
        ascend_fixup(&mut out, &levels, delta, true);
        let dst = SocketAddrV6::new(dst_ip, SERVER_PORT, 0, 0);
        let _ = send_with_pktinfo(send_fd, dst, slave.index, &[IoSlice::new(&out)]);
    } else {
        let dst = SocketAddrV6::new(dst_ip, CLIENT_PORT, 0, 0);
        let _ = send_with_pktinfo(send_fd, dst, slave.index, &[IoSlice::new(&reply)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcpv6::options::{OPT_CLIENTID as CID, OPTION_HEADER_LEN};

    fn solicit_with_clientid(tr_id: [u8; 3], client_id: &[u8]) -> Vec<u8> {
        let mut buf = vec![SOLICIT, tr_id[0], tr_id[1], tr_id[2]];
        buf.extend_from_slice(&CID.to_be_bytes());
        buf.extend_from_slice(&(client_id.len() as u16).to_be_bytes());
        buf.extend_from_slice(client_id);
        buf
    }

    #[test]
    fn ignores_rebind() {
        let buf = vec![REBIND, 1, 2, 3];
        let slave = Interface {
            index: 5,
            name: "eth1".into(),
            mtu: 1500,
            mac: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            external: false,
        };
        // No assertion beyond "doesn't panic"; no socket is opened in
        // this unit test so a send would fail silently if attempted.
        handle_client_request(86400, -1, SocketAddrV6::new("fe80::2".parse().unwrap(), 546, 0, 0), &buf, &slave);
        let _ = OPTION_HEADER_LEN;
    }

    #[test]
    fn builds_clientid_marker_from_request() {
        let buf = solicit_with_clientid([1, 2, 3], &[9, 9, 9]);
        assert_eq!(buf[0], SOLICIT);
        let opt = OptionCursor::new(&buf, CLIENT_HEADER_LEN, buf.len()).next().unwrap();
        assert_eq!(opt.otype, CID);
        assert_eq!(opt.payload(&buf), &[9, 9, 9]);
    }
}

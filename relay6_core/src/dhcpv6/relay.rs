//! Relay-forward construction, relay-reply unwrapping, the nested
//! envelope walker, and DNS-option rewriting (§4.2).

use std::net::Ipv6Addr;

use crate::dhcpv6::message::{RELAY_HEADER_LEN, RELAY_REPL, RELAY_FORW};
use crate::dhcpv6::options::{find_option, set_option_len, OptionRef, OPT_DNS_SERVERS, OPT_INTERFACE_ID, OPT_RELAY_MSG};
use crate::error::Error;

/// Hop count at or above which a `RELAY-FORW` is dropped rather than
/// forwarded further (§3 invariant 4, §8 scenario S2).
pub const MAX_HOP_COUNT: u8 = 32;

/// Computes the outbound hop count for a client-to-server relay step.
/// `inbound` is `Some(hop)` when the received message was itself a
/// `RELAY-FORW` (the relay is re-relaying an already-relayed message),
/// `None` for a bare client message. Returns `None` if the result would
/// reach [`MAX_HOP_COUNT`], signaling the caller to drop the packet.
pub fn next_hop_count(inbound: Option<u8>) -> Option<u8> {
    match inbound {
        None => Some(0),
        Some(hop) if hop + 1 >= MAX_HOP_COUNT => None,
        Some(hop) => Some(hop + 1),
    }
}

/// The constructed header for a `RELAY-FORW` envelope, built without
/// copying the inner message: the header carries everything up to and
/// including the `RELAY-MSG` option's 4-byte header, and the caller
/// sends the inner message bytes as a second `sendmsg` iovec segment
/// (§4.2: "sent as a second iovec segment to avoid a copy").
pub fn build_relay_forward_header(
    hop_count: u8,
    link_address: Ipv6Addr,
    peer_address: Ipv6Addr,
    slave_ifindex: u32,
    inner_len: u16,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(RELAY_HEADER_LEN + 8 + 4);
    out.push(RELAY_FORW);
    out.push(hop_count);
    out.extend_from_slice(&link_address.octets());
    out.extend_from_slice(&peer_address.octets());

    out.extend_from_slice(&OPT_INTERFACE_ID.to_be_bytes());
    out.extend_from_slice(&4u16.to_be_bytes());
    out.extend_from_slice(&slave_ifindex.to_be_bytes());

    out.extend_from_slice(&OPT_RELAY_MSG.to_be_bytes());
    out.extend_from_slice(&inner_len.to_be_bytes());
    out
}

/// The result of unwrapping exactly one `RELAY-REPL` envelope level
/// (§4.2's "Server→Client path (standard)").
pub struct UnwrappedReply {
    pub slave_ifindex: u32,
    pub peer_address: Ipv6Addr,
    pub inner: OptionRef,
}

/// Unwraps one `RELAY-REPL` level from `buf[offset..offset+len]`. The
/// caller inspects `buf[inner.payload_offset]` to decide whether the
/// payload is itself `RELAY-REPL` (forward to the next relay's server
/// port, 547) or a bare reply (forward to the client's port, 546).
pub fn unwrap_relay_reply(buf: &[u8], offset: usize, len: usize) -> Result<UnwrappedReply, Error> {
    if len < RELAY_HEADER_LEN || buf[offset] != RELAY_REPL {
        return Err(Error::Malformed("expected RELAY-REPL envelope"));
    }
    let peer_address = Ipv6Addr::from(read_addr(buf, offset + 18));
    let opts_start = offset + RELAY_HEADER_LEN;
    let opts_end = offset + len;

    let iface_id = find_option(buf, opts_start, opts_end, OPT_INTERFACE_ID)
        .ok_or(Error::Malformed("missing INTERFACE-ID"))?;
    if iface_id.payload_len != 4 {
        return Err(Error::Malformed("INTERFACE-ID must be 4 bytes"));
    }
    let slave_ifindex = u32::from_be_bytes(iface_id.payload(buf).try_into().unwrap());

    let inner = find_option(buf, opts_start, opts_end, OPT_RELAY_MSG)
        .ok_or(Error::Malformed("missing RELAY-MSG"))?;

    Ok(UnwrappedReply {
        slave_ifindex,
        peer_address,
        inner,
    })
}

/// One level of nesting discovered while descending through `RELAY-MSG`
/// chains: the envelope's own start offset (so its message type byte can
/// be flipped on the way back out) and the `RELAY-MSG` option that leads
/// to the next level down.
#[derive(Debug, Clone, Copy)]
pub struct RelayLevel {
    pub envelope_offset: usize,
    pub relay_msg: OptionRef,
}

/// The result of fully descending a (possibly multiply nested)
/// `RELAY-FORW` chain: every level from outermost to innermost, plus the
/// byte range of the non-relay message finally reached.
pub struct Descended {
    pub levels: Vec<RelayLevel>,
    pub inner_offset: usize,
    pub inner_len: usize,
}

/// Guards against unbounded recursion; §8 exercises depths 1..=8 as the
/// testable range, so this leaves ample headroom while still bounding
/// work done per packet.
const MAX_NESTING_DEPTH: usize = 32;

/// Walks `buf[offset..offset+len]`, descending through `RELAY-MSG`
/// options as long as the enclosed message is itself `RELAY-FORW`
/// (§4.2's "Nested-envelope walker").
pub fn descend(buf: &[u8], offset: usize, len: usize) -> Result<Descended, Error> {
    let mut levels = Vec::new();
    let mut cur_offset = offset;
    let mut cur_len = len;

    loop {
        if cur_len == 0 {
            return Err(Error::Malformed("empty message"));
        }
        let msg_type = buf[cur_offset];
        if msg_type != RELAY_FORW {
            return Ok(Descended {
                levels,
                inner_offset: cur_offset,
                inner_len: cur_len,
            });
        }
        if levels.len() >= MAX_NESTING_DEPTH {
            return Err(Error::Malformed("relay chain nested too deep"));
        }
        if cur_len < RELAY_HEADER_LEN {
            return Err(Error::Malformed("truncated RELAY-FORW header"));
        }
        let opts_start = cur_offset + RELAY_HEADER_LEN;
        let opts_end = cur_offset + cur_len;
        let relay_msg = find_option(buf, opts_start, opts_end, OPT_RELAY_MSG)
            .ok_or(Error::Malformed("RELAY-FORW missing RELAY-MSG"))?;

        levels.push(RelayLevel {
            envelope_offset: cur_offset,
            relay_msg,
        });
        cur_offset = relay_msg.payload_offset;
        cur_len = relay_msg.payload_len;
    }
}

/// Propagates a signed length delta from the innermost envelope outward,
/// updating each level's `RELAY-MSG` length field, and — when
/// `flip_to_reply` is set — rewrites each envelope's message type byte
/// from `RELAY-FORW` to `RELAY-REPL` (used by the stateless responder
/// when answering a request that arrived nested; §4.2, §8 invariant 4).
pub fn ascend_fixup(buf: &mut [u8], levels: &[RelayLevel], delta: i32, flip_to_reply: bool) {
    for level in levels.iter().rev() {
        if flip_to_reply {
            buf[level.envelope_offset] = RELAY_REPL;
        }
        let new_len = (level.relay_msg.payload_len as i32 + delta) as u16;
        set_option_len(buf, level.relay_msg.header_offset, new_len);
    }
}

/// Locates the `DNS-SERVERS` option, if any, within `buf[start..end]`.
pub fn find_dns_servers(buf: &[u8], start: usize, end: usize) -> Option<OptionRef> {
    find_option(buf, start, end, OPT_DNS_SERVERS)
}

/// `true` if any 16-byte address entry in `dns` is link-local — one of
/// the two triggers (besides `always_rewrite_dns`) for DNS rewriting
/// (§4.2).
pub fn dns_servers_need_rewrite(buf: &[u8], dns: OptionRef) -> bool {
    for addr in dns_server_addresses(buf, dns) {
        let o = addr.octets();
        if o[0] == 0xfe && (o[1] & 0xc0) == 0x80 {
            return true;
        }
    }
    false
}

fn dns_server_addresses(buf: &[u8], dns: OptionRef) -> impl Iterator<Item = Ipv6Addr> + '_ {
    let payload = dns.payload(buf);
    payload.chunks_exact(16).map(|c| Ipv6Addr::from(<[u8; 16]>::try_from(c).unwrap()))
}

/// Overwrites every address entry in the `DNS-SERVERS` option with
/// `replacement` in place (the option's length never changes).
pub fn rewrite_dns_servers(buf: &mut [u8], dns: OptionRef, replacement: Ipv6Addr) {
    let mut offset = dns.payload_offset;
    let end = dns.payload_offset + dns.payload_len;
    while offset + 16 <= end {
        buf[offset..offset + 16].copy_from_slice(&replacement.octets());
        offset += 16;
    }
}

fn read_addr(buf: &[u8], offset: usize) -> [u8; 16] {
    buf[offset..offset + 16].try_into().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcpv6::message::SOLICIT;

    #[test]
    fn hop_count_increments_and_caps() {
        assert_eq!(next_hop_count(None), Some(0));
        assert_eq!(next_hop_count(Some(0)), Some(1));
        assert_eq!(next_hop_count(Some(30)), Some(31));
        assert_eq!(next_hop_count(Some(31)), None);
        assert_eq!(next_hop_count(Some(32)), None);
    }

    fn wrap_relay_forward(hop: u8, inner: &[u8]) -> Vec<u8> {
        let mut out = build_relay_forward_header(
            hop,
            "2001:db8::1".parse().unwrap(),
            "fe80::2".parse().unwrap(),
            3,
            inner.len() as u16,
        );
        out.extend_from_slice(inner);
        out
    }

    #[test]
    fn descend_reaches_innermost_message_at_depth() {
        for depth in 1..=8usize {
            let mut msg = vec![SOLICIT, 0xaa, 0xbb, 0xcc];
            for hop in (0..depth as u8).rev() {
                msg = wrap_relay_forward(hop, &msg);
            }
            let descended = descend(&msg, 0, msg.len()).unwrap();
            assert_eq!(descended.levels.len(), depth);
            assert_eq!(msg[descended.inner_offset], SOLICIT);
            assert_eq!(descended.inner_len, 4);
        }
    }

    #[test]
    fn ascend_fixup_propagates_delta_and_flips_to_reply() {
        let depth = 4;
        let mut msg = vec![SOLICIT, 0xaa, 0xbb, 0xcc];
        for hop in (0..depth as u8).rev() {
            msg = wrap_relay_forward(hop, &msg);
        }
        let descended = descend(&msg, 0, msg.len()).unwrap();
        let original_lens: Vec<u16> = descended
            .levels
            .iter()
            .map(|l| l.relay_msg.payload_len as u16)
            .collect();

        let delta: i32 = 5;
        let mut new_len = descended.inner_len as i32 + delta;
        let mut replacement = vec![SOLICIT, 1, 2, 3, 4, 5, 6, 7, 8];
        replacement.truncate(new_len as usize);
        new_len = replacement.len() as i32;
        let mut used_len = msg.len();
        crate::dhcpv6::options::replace_region(
            &mut msg,
            &mut used_len,
            descended.inner_offset,
            descended.inner_len,
            &replacement,
        )
        .unwrap();
        let delta = new_len - descended.inner_len as i32;
        ascend_fixup(&mut msg, &descended.levels, delta, true);

        for (level, original) in descended.levels.iter().zip(original_lens) {
            assert_eq!(msg[level.envelope_offset], RELAY_REPL);
            let len_field = u16::from_be_bytes([
                msg[level.relay_msg.header_offset + 2],
                msg[level.relay_msg.header_offset + 3],
            ]);
            assert_eq!(len_field as i32, original as i32 + delta);
        }
    }

    #[test]
    fn dns_rewrite_detects_link_local_and_rewrites() {
        let mut buf = OPT_DNS_SERVERS.to_be_bytes().to_vec();
        buf.extend_from_slice(&16u16.to_be_bytes());
        buf.extend_from_slice(&"fe80::1".parse::<Ipv6Addr>().unwrap().octets());
        let dns = find_dns_servers(&buf, 0, buf.len()).unwrap();
        assert!(dns_servers_need_rewrite(&buf, dns));

        let replacement: Ipv6Addr = "2001:db8::5".parse().unwrap();
        rewrite_dns_servers(&mut buf, dns, replacement);
        let dns = find_dns_servers(&buf, 0, buf.len()).unwrap();
        assert_eq!(dns_server_addresses(&buf, dns).next(), Some(replacement));
    }
}

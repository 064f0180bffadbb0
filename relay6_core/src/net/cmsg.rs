//! `sendmsg(2)`/`recvmsg(2)` wrappers carrying `IPV6_PKTINFO` control
//! data. This is the one module in the crate allowed unsafe code, for
//! the same reason `consomme::icmp` carries its own module-scoped
//! allow: the underlying socket call writes into a caller-provided
//! buffer whose initialization the compiler cannot see through `nix`'s
//! safe surface alone.
#![allow(unsafe_code)]
#![allow(clippy::undocumented_unsafe_blocks)]

use std::net::Ipv6Addr;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use nix::sys::socket::{
    sendmsg, ControlMessage, ControlMessageOwned, MsgFlags, SockaddrIn6,
};
use nix::sys::uio::IoSlice;

/// One received datagram: source address, total length, and the egress
/// (really: *ingress*) interface index recovered from `IPV6_PKTINFO`,
/// when the kernel supplied one.
pub struct RecvResult {
    pub src: std::net::SocketAddrV6,
    pub len: usize,
    pub ifindex: Option<u32>,
}

/// Drains one datagram into `buf`, returning `None` on `EWOULDBLOCK`
/// (the non-blocking "no more packets" signal the event loop's receive
/// loop treats as "done for this wake-up").
pub fn recv_with_pktinfo(fd: RawFd, buf: &mut [u8]) -> nix::Result<Option<RecvResult>> {
    let mut cmsg_space = nix::cmsg_space!(libc::in6_pktinfo);
    let mut iov = [std::io::IoSliceMut::new(buf)];

    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let msg = match nix::sys::socket::recvmsg::<SockaddrIn6>(
        borrowed.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_space),
        MsgFlags::MSG_DONTWAIT,
    ) {
        Ok(m) => m,
        Err(nix::errno::Errno::EWOULDBLOCK) => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut ifindex = None;
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::Ipv6PacketInfo(pktinfo) = cmsg {
            ifindex = Some(pktinfo.ipi6_ifindex as u32);
        }
    }

    let src = msg
        .address
        .map(|a| {
            std::net::SocketAddrV6::new(
                Ipv6Addr::from(a.ip().octets()),
                a.port(),
                0,
                a.scope_id(),
            )
        })
        .unwrap_or_else(|| std::net::SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0));

    Ok(Some(RecvResult {
        src,
        len: msg.bytes,
        ifindex,
    }))
}

/// Sends `iov` (one or more segments, so a relay can forward an inner
/// message without copying it — §4.2's "sent as a second iovec segment")
/// to `dst` on `fd`, egress-pinned to `ifindex` via `IPV6_PKTINFO`.
///
/// Per invariant 1 (§3): when `dst.port() == 0` (a raw socket send),
/// PKTINFO is omitted entirely, matching the kernel quirk the original
/// works around in `relayd_forward_packet`.
pub fn send_with_pktinfo(
    fd: RawFd,
    dst: std::net::SocketAddrV6,
    ifindex: u32,
    iov: &[IoSlice<'_>],
) -> nix::Result<usize> {
    let mut dst = dst;
    if is_link_local_or_mcast_link_local(dst.ip()) {
        dst.set_scope_id(ifindex);
    }
    let dst_addr = SockaddrIn6::from(dst);

    if dst.port() == 0 {
        return sendmsg(fd, iov, &[], MsgFlags::MSG_DONTWAIT, Some(&dst_addr));
    }

    let pktinfo = libc::in6_pktinfo {
        ipi6_addr: libc::in6_addr { s6_addr: [0; 16] },
        ipi6_ifindex: ifindex as _,
    };
    let cmsg = [ControlMessage::Ipv6PacketInfo(&pktinfo)];
    sendmsg(fd, iov, &cmsg, MsgFlags::MSG_DONTWAIT, Some(&dst_addr))
}

fn is_link_local_or_mcast_link_local(addr: Ipv6Addr) -> bool {
    let o = addr.octets();
    (o[0] == 0xfe && (o[1] & 0xc0) == 0x80) || (o[0] == 0xff && (o[1] & 0x0f) == 0x02)
}

//! `ICMPV6_FILTER` socket option. `nix` does not wrap this option, so it
//! is set through a raw `setsockopt` call, kept in the same
//! unsafe-permitted module as the rest of this crate's FFI boundary.
#![allow(unsafe_code)]
#![allow(clippy::undocumented_unsafe_blocks)]

use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

/// Installs a filter on a raw ICMPv6 socket that passes only the given
/// ICMPv6 message types, blocking everything else in the kernel before
/// it reaches userspace. §4.3: "an ICMP6 filter that passes only
/// ROUTER-ADVERT (134) and ROUTER-SOLICIT (133)".
pub fn set_icmp6_filter(fd: RawFd, pass_types: &[u8]) -> std::io::Result<()> {
    // SAFETY: `icmp6_filter` is a fixed-size bitmap struct with no
    // padding requirements beyond zero-initialization, which
    // `mem::zeroed` provides.
    let mut filter: libc::icmp6_filter = unsafe { mem::zeroed() };
    unsafe { libc::ICMP6_FILTER_SETBLOCKALL(&mut filter) };
    for &ty in pass_types {
        unsafe { libc::ICMP6_FILTER_SETPASS(ty.into(), &mut filter) };
    }

    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    // SAFETY: `filter` is a valid, fully initialized `icmp6_filter` and
    // its size is passed accurately via `mem::size_of`.
    let rc = unsafe {
        libc::setsockopt(
            borrowed.as_raw_fd(),
            libc::IPPROTO_ICMPV6,
            libc::ICMP6_FILTER,
            &filter as *const _ as *const libc::c_void,
            mem::size_of::<libc::icmp6_filter>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

//! Socket plumbing shared by the DHCPv6 and Router Discovery subsystems:
//! PKTINFO-aware send/receive and the raw ICMPv6 filter setup that `nix`
//! does not wrap.

mod cmsg;
mod icmp_filter;
mod socket;

pub use cmsg::{recv_with_pktinfo, send_with_pktinfo, RecvResult};
pub use icmp_filter::set_icmp6_filter;
pub use socket::{bind_to_device, disable_multicast_loop, icmp6_raw, join_multicast, raw_fd, udp6};

//! Kernel control-file writer. Out of scope as a general-purpose sysctl
//! layer (§1 Non-goals) — this is the narrow `forwarding`/`accept_ra`
//! toggler §6 fixes the signature of.

use std::fs::File;
use std::io::{self, Write};

/// Writes `value` (as a single ASCII digit) to
/// `/proc/sys/net/ipv6/conf/<ifname>/<option>`, e.g. `write("eth1",
/// "accept_ra", 2)` for the `force_address_assignment` behavior in
/// §4.3's "Initial solicitation".
pub fn write(ifname: &str, option: &str, value: u8) -> io::Result<()> {
    let path = format!("/proc/sys/net/ipv6/conf/{ifname}/{option}");
    let mut file = File::create(&path)?;
    file.write_all(value.to_string().as_bytes())
}

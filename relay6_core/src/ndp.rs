//! Neighbor Discovery proxy collaborator. Out of scope per §1 — this
//! crate only implements the init/deinit contract the real NDP-proxy
//! submodule is invoked through; it never sees a packet.

use crate::config::Config;
use crate::error::Result;
use crate::iface::InterfaceRegistry;

/// Called once at startup when `Config::ndp_proxy` is set. The real
/// submodule would open a raw ICMPv6 NDP listener here and start
/// proxying neighbor solicitations between master and slaves; this
/// crate only satisfies the initialization contract (§1, §2's "NDP
/// proxy (external collaborator)" row).
pub fn init(_config: &Config, _registry: &InterfaceRegistry) -> Result<()> {
    tracing::debug!("NDP proxy init (external collaborator, not implemented here)");
    Ok(())
}

/// Mirrors `init`; called once at shutdown.
pub fn deinit() {
    tracing::debug!("NDP proxy deinit (external collaborator, not implemented here)");
}

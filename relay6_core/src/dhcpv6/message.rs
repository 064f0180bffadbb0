//! DHCPv6 message type constants (§3) and header layout sizes.

pub const SOLICIT: u8 = 1;
pub const ADVERTISE: u8 = 2;
pub const REQUEST: u8 = 3;
pub const CONFIRM: u8 = 4;
pub const RENEW: u8 = 5;
pub const REBIND: u8 = 6;
pub const REPLY: u8 = 7;
pub const RELEASE: u8 = 8;
pub const DECLINE: u8 = 9;
pub const RECONFIGURE: u8 = 10;
pub const INFORMATION_REQUEST: u8 = 11;
pub const RELAY_FORW: u8 = 12;
pub const RELAY_REPL: u8 = 13;

/// 1-byte message type, 3-byte transaction id (§3's "Client header").
pub const CLIENT_HEADER_LEN: usize = 4;

/// 1-byte message type, 1-byte hop count, 16-byte link-address, 16-byte
/// peer-address (§3's "Relay header").
pub const RELAY_HEADER_LEN: usize = 1 + 1 + 16 + 16;

/// The DHCPv6 server port, used for `RELAY-FORW`/`RELAY-REPL` traffic
/// and by servers.
pub const SERVER_PORT: u16 = 547;

/// The DHCPv6 client port.
pub const CLIENT_PORT: u16 = 546;

pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: &str = "ff02::1:2";
pub const ALL_DHCP_SERVERS: &str = "ff05::1:3";

/// Messages the relay forwards as client traffic; anything else received
/// from a slave is either a reply in transit or not meaningful here
/// (§4.2's client→server filter: "any message whose type is not
/// RELAY-REPL, RECONFIGURE, REPLY, or ADVERTISE").
pub fn is_client_originated(msg_type: u8) -> bool {
    !matches!(msg_type, RELAY_REPL | RECONFIGURE | REPLY | ADVERTISE)
}

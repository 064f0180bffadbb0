//! DHCPv6 option iteration and in-place rewriting.
//!
//! Options are walked with a borrowing cursor rather than decoded into an
//! owned object model, so the relay paths can rewrite a received buffer
//! in place (growing or shrinking a single option) without a copy —
//! see SPEC_FULL.md's "Wire option cursor" note.

use crate::error::Error;

/// 2-byte type, 2-byte length, payload (§3). Option header size in bytes.
pub const OPTION_HEADER_LEN: usize = 4;

pub const OPT_CLIENTID: u16 = 1;
pub const OPT_SERVERID: u16 = 2;
pub const OPT_IA_NA: u16 = 3;
pub const OPT_ORO: u16 = 6;
pub const OPT_RELAY_MSG: u16 = 9;
pub const OPT_AUTH: u16 = 11;
pub const OPT_STATUS_CODE: u16 = 13;
pub const OPT_INTERFACE_ID: u16 = 18;
pub const OPT_DNS_SERVERS: u16 = 23;

pub const STATUS_NO_ADDRS_AVAIL: u16 = 2;

/// A single option's location within a buffer: `header_offset` points at
/// the 2-byte type field; `payload` is the byte range of its value.
#[derive(Debug, Clone, Copy)]
pub struct OptionRef {
    pub otype: u16,
    pub header_offset: usize,
    pub payload_offset: usize,
    pub payload_len: usize,
}

impl OptionRef {
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.payload_offset..self.payload_offset + self.payload_len]
    }

    pub fn total_len(&self) -> usize {
        OPTION_HEADER_LEN + self.payload_len
    }
}

/// Iterates the options found in `buf[start..end]`. Stops cleanly (no
/// error, just ends iteration) the moment a header or payload would run
/// past `end` — §3: "Iteration must stop cleanly on truncation."
pub struct OptionCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> OptionCursor<'a> {
    pub fn new(buf: &'a [u8], start: usize, end: usize) -> Self {
        Self { buf, pos: start, end }
    }
}

impl Iterator for OptionCursor<'_> {
    type Item = OptionRef;

    fn next(&mut self) -> Option<OptionRef> {
        if self.pos + OPTION_HEADER_LEN > self.end {
            return None;
        }
        let otype = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        let len = u16::from_be_bytes([self.buf[self.pos + 2], self.buf[self.pos + 3]]) as usize;
        let payload_offset = self.pos + OPTION_HEADER_LEN;
        if payload_offset + len > self.end {
            return None;
        }
        let item = OptionRef {
            otype,
            header_offset: self.pos,
            payload_offset,
            payload_len: len,
        };
        self.pos = payload_offset + len;
        Some(item)
    }
}

/// Finds the first option of type `otype` in `buf[start..end]`.
pub fn find_option(buf: &[u8], start: usize, end: usize, otype: u16) -> Option<OptionRef> {
    OptionCursor::new(buf, start, end).find(|o| o.otype == otype)
}

/// Returns `true` if an `AUTH` option is present anywhere in
/// `buf[start..end]` — rewriting must abort unconditionally when this is
/// the case (§4.2's "rewrite impossible" error category).
pub fn has_auth_option(buf: &[u8], start: usize, end: usize) -> bool {
    find_option(buf, start, end, OPT_AUTH).is_some()
}

/// Writes `len` into an option's 2-byte big-endian length field in
/// place.
pub fn set_option_len(buf: &mut [u8], header_offset: usize, len: u16) {
    buf[header_offset + 2..header_offset + 4].copy_from_slice(&len.to_be_bytes());
}

/// Inserts `insert` at `at` (an absolute offset into `buf`, which must
/// fall inside `option.payload`), shifting every following byte up to
/// `used_len` to the right, updates the option's length field, and
/// updates `used_len`. Fails with [`Error::RewriteAborted`] if the
/// result would not fit in `buf` — §3 invariant 3: "growth checks are
/// performed before `memmove`."
pub fn insert_in_option(
    buf: &mut [u8],
    used_len: &mut usize,
    option: OptionRef,
    at: usize,
    insert: &[u8],
) -> Result<(), Error> {
    let new_len = *used_len + insert.len();
    if new_len > buf.len() {
        return Err(Error::RewriteAborted("buffer too small to grow option"));
    }
    buf.copy_within(at..*used_len, at + insert.len());
    buf[at..at + insert.len()].copy_from_slice(insert);
    *used_len = new_len;
    let new_payload_len = option.payload_len + insert.len();
    set_option_len(buf, option.header_offset, new_payload_len as u16);
    Ok(())
}

/// Removes `remove_len` bytes starting at `at` (an absolute offset
/// inside `option.payload`), shifting every following byte left and
/// updating the option's length field and `used_len`. Used to strip the
/// 16-byte broken-DUID prefix on the server-to-client path.
pub fn remove_in_option(
    buf: &mut [u8],
    used_len: &mut usize,
    option: OptionRef,
    at: usize,
    remove_len: usize,
) -> Result<(), Error> {
    if remove_len > option.payload_len {
        return Err(Error::Malformed("remove_len exceeds option payload"));
    }
    buf.copy_within(at + remove_len..*used_len, at);
    *used_len -= remove_len;
    let new_payload_len = option.payload_len - remove_len;
    set_option_len(buf, option.header_offset, new_payload_len as u16);
    Ok(())
}

/// Replaces `buf[start..start+old_len]` with `new_content`, shifting
/// everything after the replaced region and updating `used_len`. Unlike
/// [`insert_in_option`]/[`remove_in_option`] this does not touch any
/// option's length field itself — the caller (the nested-envelope
/// ascent walker) is responsible for propagating the length delta to
/// enclosing `RELAY-MSG` options.
pub fn replace_region(
    buf: &mut [u8],
    used_len: &mut usize,
    start: usize,
    old_len: usize,
    new_content: &[u8],
) -> Result<(), Error> {
    let new_total = (*used_len as i64) - (old_len as i64) + (new_content.len() as i64);
    if new_total < 0 || new_total as usize > buf.len() {
        return Err(Error::RewriteAborted("replacement does not fit in buffer"));
    }
    let new_total = new_total as usize;
    if new_content.len() >= old_len {
        let grow = new_content.len() - old_len;
        buf.copy_within(start + old_len..*used_len, start + old_len + grow);
    } else {
        let shrink = old_len - new_content.len();
        buf.copy_within(start + old_len..*used_len, start + old_len - shrink);
    }
    buf[start..start + new_content.len()].copy_from_slice(new_content);
    *used_len = new_total;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(otype: u16, payload: &[u8]) -> Vec<u8> {
        let mut v = otype.to_be_bytes().to_vec();
        v.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn iterates_well_formed_options() {
        let mut buf = opt(OPT_CLIENTID, &[1, 2, 3]);
        buf.extend(opt(OPT_SERVERID, &[9, 9]));
        let found: Vec<_> = OptionCursor::new(&buf, 0, buf.len()).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].otype, OPT_CLIENTID);
        assert_eq!(found[0].payload(&buf), &[1, 2, 3]);
        assert_eq!(found[1].otype, OPT_SERVERID);
    }

    #[test]
    fn stops_cleanly_on_truncated_header() {
        let buf = [0u8, 1, 0]; // 3 bytes: not enough for a 4-byte header
        let found: Vec<_> = OptionCursor::new(&buf, 0, buf.len()).collect();
        assert!(found.is_empty());
    }

    #[test]
    fn stops_cleanly_on_truncated_payload() {
        let mut buf = OPT_CLIENTID.to_be_bytes().to_vec();
        buf.extend_from_slice(&10u16.to_be_bytes()); // claims 10 bytes
        buf.extend_from_slice(&[1, 2, 3]); // only 3 present
        let found: Vec<_> = OptionCursor::new(&buf, 0, buf.len()).collect();
        assert!(found.is_empty());
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let mut buf = vec![0u8; 64];
        let payload = [1u8, 2, 3, 4, 5];
        let header_offset = 0;
        buf[0..2].copy_from_slice(&OPT_CLIENTID.to_be_bytes());
        buf[2..4].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        buf[4..4 + payload.len()].copy_from_slice(&payload);
        let mut used_len = 4 + payload.len();

        let option = OptionRef {
            otype: OPT_CLIENTID,
            header_offset,
            payload_offset: 4,
            payload_len: payload.len(),
        };
        let prefix = [0xAAu8; 16];
        insert_in_option(&mut buf, &mut used_len, option, 4, &prefix).unwrap();
        assert_eq!(used_len, 4 + 16 + payload.len());
        let grown = find_option(&buf, 0, used_len, OPT_CLIENTID).unwrap();
        assert_eq!(grown.payload_len, 16 + payload.len());
        assert_eq!(&grown.payload(&buf)[..16], &prefix);
        assert_eq!(&grown.payload(&buf)[16..], &payload);

        remove_in_option(&mut buf, &mut used_len, grown, 4, 16).unwrap();
        assert_eq!(used_len, 4 + payload.len());
        let restored = find_option(&buf, 0, used_len, OPT_CLIENTID).unwrap();
        assert_eq!(restored.payload_len, payload.len());
        assert_eq!(restored.payload(&buf), &payload);
    }
}

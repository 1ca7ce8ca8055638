//! Git pkt-line framing.
//!
//! A pkt-line is a 4-hex-digit length prefix (counting itself) followed by
//! the payload; `0000` is the flush packet. The transports only ever emit
//! the smart-HTTP advertisement prelude; everything else on the wire is
//! produced by the git child and copied verbatim.

/// The flush packet.
pub const FLUSH_PKT: &[u8] = b"0000";

/// Encode one data pkt-line.
pub fn encode_pkt(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + 4;
    debug_assert!(len <= 0xffff, "pkt-line payload too large");
    let mut out = format!("{len:04x}").into_bytes();
    out.extend_from_slice(payload);
    out
}

/// The `info/refs` prelude for a smart-HTTP advertisement:
/// `# service=<name>\n` as a pkt-line, followed by a flush packet.
pub fn advertisement_prelude(service_name: &str) -> Vec<u8> {
    let mut out = encode_pkt(format!("# service={service_name}\n").as_bytes());
    out.extend_from_slice(FLUSH_PKT);
    out
}

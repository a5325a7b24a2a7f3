//! Link-layer frame parsing
//!
//! Ethernet II → IPv4 → UDP, with explicit big-endian reads and bounds checks
//! on every offset. Captures may be truncated, so the UDP length field is
//! clamped to the bytes actually present.

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_OFFSET: usize = 12;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV4_PROTOCOL_OFFSET: usize = 9;
const IP_PROTOCOL_UDP: u8 = 17;
const UDP_HEADER_LEN: usize = 8;

/// Smallest frame that can hold Ethernet + IPv4 + UDP headers
pub const MIN_FRAME_LEN: usize = ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN + UDP_HEADER_LEN;

fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Extract the UDP payload of `frame` if it is addressed to `dst_port`.
///
/// Returns `None` for non-IPv4, non-UDP, truncated headers, or a different
/// destination port.
pub fn extract_udp_payload(frame: &[u8], dst_port: u16) -> Option<&[u8]> {
    if frame.len() < MIN_FRAME_LEN {
        return None;
    }
    if read_u16_be(frame, ETHERTYPE_OFFSET)? != ETHERTYPE_IPV4 {
        return None;
    }

    let ip_start = ETHERNET_HEADER_LEN;
    let ihl = usize::from(frame[ip_start] & 0x0F) * 4;
    if ihl < IPV4_MIN_HEADER_LEN {
        return None;
    }
    if frame[ip_start + IPV4_PROTOCOL_OFFSET] != IP_PROTOCOL_UDP {
        return None;
    }

    let udp_start = ip_start + ihl;
    if frame.len() < udp_start + UDP_HEADER_LEN {
        return None;
    }
    if read_u16_be(frame, udp_start + 2)? != dst_port {
        return None;
    }

    let udp_len = usize::from(read_u16_be(frame, udp_start + 4)?);
    let payload_start = udp_start + UDP_HEADER_LEN;
    let payload_end = (payload_start + udp_len.saturating_sub(UDP_HEADER_LEN)).min(frame.len());
    Some(&frame[payload_start..payload_end])
}

/// Locate the first balanced JSON object in `payload`.
///
/// Scans from the first `{`, tracking brace depth outside of string literals
/// and skipping escaped bytes inside them, so trailing bytes after the
/// closing brace are ignored.
pub fn find_json_object(payload: &[u8]) -> Option<&[u8]> {
    let start = payload.iter().position(|&b| b == b'{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in payload[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&payload[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

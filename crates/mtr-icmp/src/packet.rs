//! ICMPv4 echo packet construction and reply classification.
//!
//! Probes encode their TTL in the echo sequence number, so a reply (or
//! the request quoted inside a TIME_EXCEEDED error) identifies which
//! probe it answers.

use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{checksum, IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::MutablePacket;
use std::net::Ipv4Addr;

const ICMP_HEADER_LEN: usize = 8;
const ECHO_PAYLOAD_LEN: usize = 8;

/// How a probe was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// ECHO_REPLY from the probed address.
    EchoReply,
    /// TIME_EXCEEDED from an intermediate router.
    TimeExceeded,
}

/// A classified ICMP response correlated back to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoResponse {
    /// The address the response came from.
    pub responder: Ipv4Addr,
    /// Echo identifier of the original request.
    pub echo_id: u16,
    /// Echo sequence number of the original request (the probe TTL).
    pub sequence: u16,
    pub kind: ResponseKind,
}

/// Builds an ICMP Echo Request with the given identifier and sequence.
///
/// The payload is a fixed byte pattern; the kernel supplies the IP header
/// (including TTL, set per-probe on the socket).
pub fn build_echo_request(echo_id: u16, sequence: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_LEN + ECHO_PAYLOAD_LEN];
    {
        // Infallible: the buffer is sized for the fixed-length packet.
        let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(echo_id);
        packet.set_sequence_number(sequence);
        for (i, byte) in packet.payload_mut().iter_mut().enumerate() {
            *byte = (i & 0xff) as u8;
        }
    }
    let cksum = checksum(&IcmpPacket::new(&buffer).unwrap());
    let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
    packet.set_checksum(cksum);
    buffer
}

/// Classifies a raw IPv4 datagram as a probe response.
///
/// Returns `None` for anything that is not an ECHO_REPLY or a
/// TIME_EXCEEDED quoting one of our echo requests; the caller still has
/// to match `echo_id` and `sequence` against its own probes.
pub fn parse_reply(datagram: &[u8]) -> Option<EchoResponse> {
    let ip = Ipv4Packet::new(datagram)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let responder = ip.get_source();
    let header_len = usize::from(ip.get_header_length()) * 4;
    let icmp_bytes = datagram.get(header_len..)?;
    let icmp = IcmpPacket::new(icmp_bytes)?;
    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            if icmp_bytes.len() < ICMP_HEADER_LEN {
                return None;
            }
            Some(EchoResponse {
                responder,
                echo_id: u16::from_be_bytes([icmp_bytes[4], icmp_bytes[5]]),
                sequence: u16::from_be_bytes([icmp_bytes[6], icmp_bytes[7]]),
                kind: ResponseKind::EchoReply,
            })
        }
        IcmpTypes::TimeExceeded => {
            let quoted = icmp_bytes.get(ICMP_HEADER_LEN..)?;
            let (echo_id, sequence) = parse_quoted_request(quoted)?;
            Some(EchoResponse {
                responder,
                echo_id,
                sequence,
                kind: ResponseKind::TimeExceeded,
            })
        }
        _ => None,
    }
}

/// Extracts the echo identifier and sequence from the datagram quoted in
/// an ICMP error.
///
/// Routers may truncate the quote to the IP header plus eight bytes, so
/// the ICMP portion is indexed manually rather than parsed as a packet.
fn parse_quoted_request(quoted: &[u8]) -> Option<(u16, u16)> {
    let ip = Ipv4Packet::new(quoted)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let header_len = usize::from(ip.get_header_length()) * 4;
    let icmp = quoted.get(header_len..)?;
    if icmp.len() < ICMP_HEADER_LEN || icmp[0] != IcmpTypes::EchoRequest.0 {
        return None;
    }
    let id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let seq = u16::from_be_bytes([icmp[6], icmp[7]]);
    Some((id, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wraps `payload` in a minimal IPv4 header carrying ICMP.
    fn ipv4_datagram(src: [u8; 4], protocol: u8, payload: &[u8]) -> Vec<u8> {
        let total = 20 + payload.len();
        let mut buffer = vec![0u8; total];
        buffer[0] = 0x45;
        buffer[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        buffer[8] = 64;
        buffer[9] = protocol;
        buffer[12..16].copy_from_slice(&src);
        buffer[20..].copy_from_slice(payload);
        buffer
    }

    fn validate_icmp_checksum(data: &[u8]) -> bool {
        let mut sum = 0u32;
        let mut i = 0;
        while i + 1 < data.len() {
            sum += u32::from(u16::from_be_bytes([data[i], data[i + 1]]));
            i += 2;
        }
        if i < data.len() {
            sum += u32::from(data[i]) << 8;
        }
        while sum >> 16 != 0 {
            sum = (sum >> 16) + (sum & 0xffff);
        }
        sum == 0xffff
    }

    #[test]
    fn echo_request_layout() {
        let packet = build_echo_request(0xabcd, 17);
        assert_eq!(packet.len(), ICMP_HEADER_LEN + ECHO_PAYLOAD_LEN);
        assert_eq!(packet[0], 8); // Echo Request
        assert_eq!(packet[1], 0); // Code
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 0xabcd);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 17);
    }

    #[test]
    fn echo_request_checksum_is_valid() {
        let packet = build_echo_request(0x1234, 5);
        assert_ne!(u16::from_be_bytes([packet[2], packet[3]]), 0);
        assert!(validate_icmp_checksum(&packet));
    }

    #[test]
    fn parses_an_echo_reply() {
        let mut icmp = build_echo_request(42, 9);
        icmp[0] = 0; // Echo Reply
        let datagram = ipv4_datagram([1, 2, 3, 4], 1, &icmp);

        let response = parse_reply(&datagram).unwrap();
        assert_eq!(response.responder, Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(response.echo_id, 42);
        assert_eq!(response.sequence, 9);
        assert_eq!(response.kind, ResponseKind::EchoReply);
    }

    #[test]
    fn parses_a_time_exceeded_quoting_our_request() {
        let request = build_echo_request(42, 3);
        // Routers quote the original IP header plus the first eight bytes.
        let quoted = ipv4_datagram([10, 0, 0, 9], 1, &request[..8]);
        let mut icmp = vec![11, 0, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&quoted);
        let datagram = ipv4_datagram([10, 0, 0, 2], 1, &icmp);

        let response = parse_reply(&datagram).unwrap();
        assert_eq!(response.responder, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(response.echo_id, 42);
        assert_eq!(response.sequence, 3);
        assert_eq!(response.kind, ResponseKind::TimeExceeded);
    }

    #[test]
    fn rejects_non_icmp_and_foreign_types() {
        let icmp = build_echo_request(1, 1);
        // UDP datagram
        assert!(parse_reply(&ipv4_datagram([1, 1, 1, 1], 17, &icmp)).is_none());
        // Destination unreachable (type 3) is not a probe response here
        let mut unreachable = vec![3, 1, 0, 0, 0, 0, 0, 0];
        unreachable.extend_from_slice(&ipv4_datagram([9, 9, 9, 9], 1, &icmp[..8]));
        assert!(parse_reply(&ipv4_datagram([1, 1, 1, 1], 1, &unreachable)).is_none());
    }

    #[test]
    fn rejects_a_time_exceeded_quoting_someone_elses_packet() {
        // Quote carries a UDP datagram, not our echo request.
        let quoted = ipv4_datagram([10, 0, 0, 9], 17, &[0u8; 8]);
        let mut icmp = vec![11, 0, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&quoted);
        assert!(parse_reply(&ipv4_datagram([10, 0, 0, 2], 1, &icmp)).is_none());
    }

    #[test]
    fn rejects_truncated_datagrams() {
        assert!(parse_reply(&[0x45, 0x00]).is_none());
        assert!(parse_reply(&ipv4_datagram([1, 1, 1, 1], 1, &[0u8; 4])).is_none());
    }
}

//! Outbound STUN lookup (§11 of SPEC_FULL.md), supplementing the dropped
//! `windows_app/src/core/nat_traversal.py`. Scope is deliberately small:
//! one RFC 5389 binding request against a public STUN server to learn our
//! externally-visible `ip:port`. No TURN relay, no ICE negotiation — full
//! NAT traversal is a host/GUI concern outside this spec's component list.

use crate::error::{ProtocolError, Result};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};
use tracing::debug;

pub const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;
const XOR_MAPPED_ADDRESS: u16 = 0x0020;

fn build_binding_request(transaction_id: &[u8; 12]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(20);
    msg.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes()); // message length, no attributes
    msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    msg.extend_from_slice(transaction_id);
    msg
}

fn parse_xor_mapped_address(response: &[u8], transaction_id: &[u8; 12]) -> Option<SocketAddr> {
    if response.len() < 20 {
        return None;
    }
    let message_type = u16::from_be_bytes([response[0], response[1]]);
    if message_type != BINDING_SUCCESS {
        return None;
    }
    if &response[8..20] != transaction_id {
        return None;
    }
    let mut offset = 20usize;
    while offset + 4 <= response.len() {
        let attr_type = u16::from_be_bytes([response[offset], response[offset + 1]]);
        let attr_len = u16::from_be_bytes([response[offset + 2], response[offset + 3]]) as usize;
        let value_start = offset + 4;
        let value_end = value_start + attr_len;
        if value_end > response.len() {
            break;
        }
        if attr_type == XOR_MAPPED_ADDRESS && attr_len >= 8 {
            let family = response[value_start + 1];
            let xport = u16::from_be_bytes([response[value_start + 2], response[value_start + 3]]);
            let port = xport ^ (MAGIC_COOKIE >> 16) as u16;
            if family == 0x01 {
                let xaddr = u32::from_be_bytes([
                    response[value_start + 4],
                    response[value_start + 5],
                    response[value_start + 6],
                    response[value_start + 7],
                ]);
                let addr = xaddr ^ MAGIC_COOKIE;
                let ip = std::net::Ipv4Addr::from(addr);
                return Some(SocketAddr::new(ip.into(), port));
            }
        }
        offset = value_end + (4 - attr_len % 4) % 4; // attribute values are padded to a 4-byte boundary
    }
    None
}

/// Sends a single STUN binding request from `local` to `stun_server` and
/// returns the externally-visible `ip:port` the server observed.
pub async fn discover_external_addr(
    local: &UdpSocket,
    stun_server: &str,
) -> Result<SocketAddr> {
    let server_addr = tokio::net::lookup_host(stun_server)
        .await
        .map_err(|e| ProtocolError::transport(format!("resolving STUN server: {e}")))?
        .next()
        .ok_or_else(|| ProtocolError::transport("STUN server resolved to no addresses"))?;

    let transaction_id: [u8; 12] = {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let bytes = nanos.to_be_bytes();
        let mut id = [0u8; 12];
        id.copy_from_slice(&bytes[4..16]);
        id
    };
    let request = build_binding_request(&transaction_id);
    local
        .send_to(&request, server_addr)
        .await
        .map_err(|e| ProtocolError::transport(format!("sending STUN request: {e}")))?;

    let mut buf = [0u8; 512];
    let len = timeout(Duration::from_secs(3), local.recv(&mut buf))
        .await
        .map_err(|_| ProtocolError::transport("STUN request timed out"))?
        .map_err(|e| ProtocolError::transport(format!("receiving STUN response: {e}")))?;

    let addr = parse_xor_mapped_address(&buf[..len], &transaction_id)
        .ok_or_else(|| ProtocolError::transport("malformed STUN response"))?;
    debug!(%addr, "discovered external address via STUN");
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_request_has_correct_header() {
        let tid = [1u8; 12];
        let req = build_binding_request(&tid);
        assert_eq!(req.len(), 20);
        assert_eq!(u16::from_be_bytes([req[0], req[1]]), BINDING_REQUEST);
        assert_eq!(
            u32::from_be_bytes([req[4], req[5], req[6], req[7]]),
            MAGIC_COOKIE
        );
    }

    #[test]
    fn parses_xor_mapped_address() {
        let tid = [7u8; 12];
        // Build a minimal success response with an XOR-MAPPED-ADDRESS
        // attribute encoding 203.0.113.5:4321.
        let ip: u32 = u32::from(std::net::Ipv4Addr::new(203, 0, 113, 5));
        let xaddr = ip ^ MAGIC_COOKIE;
        let xport = 4321u16 ^ (MAGIC_COOKIE >> 16) as u16;

        let mut attr = vec![0u8, 0x01, 0, 0]; // reserved + family
        attr[2..4].copy_from_slice(&xport.to_be_bytes());
        attr.extend_from_slice(&xaddr.to_be_bytes());

        let mut msg = Vec::new();
        msg.extend_from_slice(&BINDING_SUCCESS.to_be_bytes());
        msg.extend_from_slice(&(attr.len() as u16).to_be_bytes());
        msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        msg.extend_from_slice(&tid);
        msg.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
        msg.extend_from_slice(&(attr.len() as u16).to_be_bytes());
        msg.extend_from_slice(&attr);

        let addr = parse_xor_mapped_address(&msg, &tid).unwrap();
        assert_eq!(addr.port(), 4321);
        assert_eq!(addr.ip().to_string(), "203.0.113.5");
    }

    #[test]
    fn parses_xor_mapped_address_past_a_padded_attribute() {
        // A preceding attribute whose length isn't a multiple of 4 exercises
        // the padding arithmetic: if it's wrong, the second attribute is
        // misaligned and never recognized as XOR-MAPPED-ADDRESS.
        let tid = [9u8; 12];
        let ip: u32 = u32::from(std::net::Ipv4Addr::new(198, 51, 100, 7));
        let xaddr = ip ^ MAGIC_COOKIE;
        let xport = 9000u16 ^ (MAGIC_COOKIE >> 16) as u16;

        let mut xor_attr = vec![0u8, 0x01, 0, 0];
        xor_attr[2..4].copy_from_slice(&xport.to_be_bytes());
        xor_attr.extend_from_slice(&xaddr.to_be_bytes());

        let padded_attr_type: u16 = 0x8022; // unknown attribute, ignored by the parser
        let padded_value = [0xAAu8, 0xBB, 0xCC]; // length 3, needs 1 byte of padding
        let padding = [0u8; 1];

        let mut msg = Vec::new();
        let message_length = (4 + padded_value.len() + padding.len()) + (4 + xor_attr.len());
        msg.extend_from_slice(&BINDING_SUCCESS.to_be_bytes());
        msg.extend_from_slice(&(message_length as u16).to_be_bytes());
        msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        msg.extend_from_slice(&tid);

        msg.extend_from_slice(&padded_attr_type.to_be_bytes());
        msg.extend_from_slice(&(padded_value.len() as u16).to_be_bytes());
        msg.extend_from_slice(&padded_value);
        msg.extend_from_slice(&padding);

        msg.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
        msg.extend_from_slice(&(xor_attr.len() as u16).to_be_bytes());
        msg.extend_from_slice(&xor_attr);

        let addr = parse_xor_mapped_address(&msg, &tid).unwrap();
        assert_eq!(addr.port(), 9000);
        assert_eq!(addr.ip().to_string(), "198.51.100.7");
    }
}

//! Matching ICMP echo replies to the requests that caused them.
//!
//! Every request carries an [`EchoToken`]. The identifier field marks the
//! sending client, the sequence field carries the scan round and the payload
//! carries a fixed marker followed by a random per-request nonce. A reply is
//! credited only when its source address and nonce both match a request that
//! is still outstanding, which is checked by the listener, not here.

use std::fmt::Debug;

use pnet::packet::{
    icmp::{
        self, echo_reply::EchoReplyPacket, echo_request::MutableEchoRequestPacket, IcmpCode,
        IcmpPacket, IcmpTypes,
    },
    Packet,
};

use crate::{
    constants::{ECHO_PACK_LEN, ECHO_PAYLOAD_LEN, MARKER, MARKER_LEN, NONCE_LEN},
    error::{Error, Result},
};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EchoToken {
    pub identifier: u16,
    pub sequence: u16,
    pub nonce: u64,
}

/// What a received ICMP message means to this client.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Decoded {
    /// Not an echo reply, or an echo reply for another client's identifier.
    NotOurs,
    /// Carries our identifier but fails checksum, length or marker checks.
    Malformed,
    Token(EchoToken),
}

pub trait ReplyCorrelator: Send + Sync + Debug {
    /// Issues a fresh token for one request in the given round.
    fn issue(&self, sequence: u16) -> EchoToken;

    /// Serializes an ICMP echo request carrying `token`.
    fn encode_request(&self, token: &EchoToken) -> Result<Vec<u8>>;

    fn decode_reply(&self, bytes: &[u8]) -> Decoded;
}

#[derive(Debug, Clone)]
pub struct NonceCorrelator {
    identifier: u16,
}

impl NonceCorrelator {
    pub fn new(identifier: u16) -> Self {
        Self { identifier }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }
}

impl ReplyCorrelator for NonceCorrelator {
    fn issue(&self, sequence: u16) -> EchoToken {
        EchoToken {
            identifier: self.identifier,
            sequence,
            nonce: rand::random(),
        }
    }

    fn encode_request(&self, token: &EchoToken) -> Result<Vec<u8>> {
        let mut buf = vec![0; ECHO_PACK_LEN];
        let mut packet = MutableEchoRequestPacket::new(&mut buf)
            .ok_or(Error::Opaque("failed to create echo request packet".into()))?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(token.identifier);
        packet.set_sequence_number(token.sequence);

        let mut payload = [0; ECHO_PAYLOAD_LEN];
        payload[..MARKER_LEN].copy_from_slice(MARKER);
        payload[MARKER_LEN..].copy_from_slice(&token.nonce.to_be_bytes());
        packet.set_payload(&payload);

        let checksum = {
            let view = IcmpPacket::new(packet.packet())
                .ok_or(Error::Opaque("failed to view echo request packet".into()))?;
            icmp::checksum(&view)
        };
        packet.set_checksum(checksum);
        Ok(buf)
    }

    fn decode_reply(&self, bytes: &[u8]) -> Decoded {
        let Some(icmp_packet) = IcmpPacket::new(bytes) else {
            return Decoded::Malformed;
        };
        if icmp_packet.get_icmp_type() != IcmpTypes::EchoReply {
            return Decoded::NotOurs;
        }
        let Some(reply) = EchoReplyPacket::new(bytes) else {
            return Decoded::Malformed;
        };
        if reply.get_identifier() != self.identifier {
            return Decoded::NotOurs;
        }
        if icmp::checksum(&icmp_packet) != icmp_packet.get_checksum() {
            return Decoded::Malformed;
        }

        let payload = reply.payload();
        if payload.len() < ECHO_PAYLOAD_LEN || &payload[..MARKER_LEN] != MARKER {
            return Decoded::Malformed;
        }
        let mut nonce = [0; NONCE_LEN];
        nonce.copy_from_slice(&payload[MARKER_LEN..ECHO_PAYLOAD_LEN]);

        Decoded::Token(EchoToken {
            identifier: reply.get_identifier(),
            sequence: reply.get_sequence_number(),
            nonce: u64::from_be_bytes(nonce),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pnet::packet::icmp::MutableIcmpPacket;

    /// Turns an encoded request into the reply a well-behaved host would send.
    pub(crate) fn echo_reply_for(request: &[u8]) -> Vec<u8> {
        let mut buf = request.to_vec();
        let mut packet = MutableIcmpPacket::new(&mut buf).unwrap();
        packet.set_icmp_type(IcmpTypes::EchoReply);
        let checksum = icmp::checksum(&packet.to_immutable());
        packet.set_checksum(checksum);
        buf
    }

    fn refresh_checksum(buf: &mut [u8]) {
        let mut packet = MutableIcmpPacket::new(buf).unwrap();
        let checksum = icmp::checksum(&packet.to_immutable());
        packet.set_checksum(checksum);
    }

    #[test]
    fn test_request_layout() {
        let correlator = NonceCorrelator::new(0xbeef);
        let token = EchoToken {
            identifier: 0xbeef,
            sequence: 7,
            nonce: 0x0102_0304_0506_0708,
        };
        let bytes = correlator.encode_request(&token).unwrap();
        assert_eq!(bytes.len(), ECHO_PACK_LEN);

        let icmp_packet = IcmpPacket::new(&bytes).unwrap();
        assert_eq!(icmp_packet.get_icmp_type(), IcmpTypes::EchoRequest);
        assert_eq!(icmp::checksum(&icmp_packet), icmp_packet.get_checksum());
        assert_eq!(&bytes[4..6], &[0xbe, 0xef]);
        assert_eq!(&bytes[6..8], &[0, 7]);
        assert_eq!(&bytes[8..16], MARKER);
        assert_eq!(&bytes[16..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_reply_yields_token() {
        let correlator = NonceCorrelator::new(42);
        let token = correlator.issue(3);
        let reply = echo_reply_for(&correlator.encode_request(&token).unwrap());
        assert_eq!(correlator.decode_reply(&reply), Decoded::Token(token));
    }

    #[test]
    fn test_issued_nonces_differ() {
        let correlator = NonceCorrelator::new(42);
        assert_ne!(correlator.issue(1).nonce, correlator.issue(1).nonce);
    }

    #[test]
    fn test_request_is_not_a_reply() {
        let correlator = NonceCorrelator::new(42);
        let request = correlator.encode_request(&correlator.issue(1)).unwrap();
        assert_eq!(correlator.decode_reply(&request), Decoded::NotOurs);
    }

    #[test]
    fn test_foreign_identifier_is_ignored() {
        let ours = NonceCorrelator::new(42);
        let theirs = NonceCorrelator::new(43);
        let reply = echo_reply_for(&theirs.encode_request(&theirs.issue(1)).unwrap());
        assert_eq!(ours.decode_reply(&reply), Decoded::NotOurs);
    }

    #[test]
    fn test_malformed_replies() {
        let correlator = NonceCorrelator::new(42);
        let reply = echo_reply_for(&correlator.encode_request(&correlator.issue(1)).unwrap());

        let mut bad_checksum = reply.clone();
        bad_checksum[2] ^= 0xff;
        assert_eq!(correlator.decode_reply(&bad_checksum), Decoded::Malformed);

        let mut bad_marker = reply.clone();
        bad_marker[8] = b'X';
        refresh_checksum(&mut bad_marker);
        assert_eq!(correlator.decode_reply(&bad_marker), Decoded::Malformed);

        let mut truncated = reply[..12].to_vec();
        refresh_checksum(&mut truncated);
        assert_eq!(correlator.decode_reply(&truncated), Decoded::Malformed);

        assert_eq!(correlator.decode_reply(&reply[..2]), Decoded::Malformed);
    }
}

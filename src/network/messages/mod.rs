//! Wire messages exchanged between peers, the discovery node and upload clients.
//!
//! Every message is `[u32 tag][hostname][ip address][fields...]`, where strings and blobs are
//! prefixed with a big-endian `u32` length. A connection carries exactly one request and at most
//! one response.

pub mod conversions;

use crate::chord::types::{Identifier, RingId};
use crate::error::MessageError;
use bytes::{BufMut, Bytes, BytesMut};
use conversions::{put_blob, put_bool, put_identifier, put_ring_id, put_string, WireReader};
use std::fmt;

/// Sender details carried by every message.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Header {
    pub hostname: String,
    pub ip_address: String,
}

impl Header {
    pub fn new(hostname: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip_address: ip_address.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Error => "ERROR",
        }
    }

    fn parse(value: &str) -> Result<Self, MessageError> {
        match value {
            "OK" => Ok(Status::Ok),
            "WARNING" => Ok(Status::Warning),
            "ERROR" => Ok(Status::Error),
            other => Err(MessageError::InvalidFormat(format!("status {:?}", other))),
        }
    }
}

/// Numeric tags as they appear first on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageKind {
    RegisterPeerRequest = 0,
    RegisterPeerResponse = 1,
    PeerIdentifierResponse = 2,
    GetPredecessorRequest = 3,
    GetSuccessorRequest = 4,
    NetworkJoinNotification = 5,
    NetworkExitNotification = 6,
    FindSuccessorRequest = 7,
    PredecessorNotification = 8,
    SuccessorNotification = 9,
    StatusResponse = 10,
    GetRandomPeerRequest = 11,
    GetRandomPeerResponse = 12,
    LookupRequest = 13,
    LookupResponse = 14,
    StoreFileRequest = 15,
    StoreFileResponse = 16,
    MoveFileRequest = 17,
    MoveFileResponse = 18,
}

impl MessageKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Result<Self, MessageError> {
        use MessageKind::*;
        Ok(match tag {
            0 => RegisterPeerRequest,
            1 => RegisterPeerResponse,
            2 => PeerIdentifierResponse,
            3 => GetPredecessorRequest,
            4 => GetSuccessorRequest,
            5 => NetworkJoinNotification,
            6 => NetworkExitNotification,
            7 => FindSuccessorRequest,
            8 => PredecessorNotification,
            9 => SuccessorNotification,
            10 => StatusResponse,
            11 => GetRandomPeerRequest,
            12 => GetRandomPeerResponse,
            13 => LookupRequest,
            14 => LookupResponse,
            15 => StoreFileRequest,
            16 => StoreFileResponse,
            17 => MoveFileRequest,
            18 => MoveFileResponse,
            unknown => return Err(MessageError::UnknownTag(unknown)),
        })
    }

    pub fn name(self) -> &'static str {
        use MessageKind::*;
        match self {
            RegisterPeerRequest => "RegisterPeerRequest",
            RegisterPeerResponse => "RegisterPeerResponse",
            PeerIdentifierResponse => "PeerIdentifierResponse",
            GetPredecessorRequest => "GetPredecessorRequest",
            GetSuccessorRequest => "GetSuccessorRequest",
            NetworkJoinNotification => "NetworkJoinNotification",
            NetworkExitNotification => "NetworkExitNotification",
            FindSuccessorRequest => "FindSuccessorRequest",
            PredecessorNotification => "PredecessorNotification",
            SuccessorNotification => "SuccessorNotification",
            StatusResponse => "StatusResponse",
            GetRandomPeerRequest => "GetRandomPeerRequest",
            GetRandomPeerResponse => "GetRandomPeerResponse",
            LookupRequest => "LookupRequest",
            LookupResponse => "LookupResponse",
            StoreFileRequest => "StoreFileRequest",
            StoreFileResponse => "StoreFileResponse",
            MoveFileRequest => "MoveFileRequest",
            MoveFileResponse => "MoveFileResponse",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    RegisterPeerRequest {
        peer: Identifier,
    },
    RegisterPeerResponse {
        accepted: bool,
        contact: Identifier,
    },
    PeerIdentifierResponse {
        peer: Identifier,
    },
    GetPredecessorRequest,
    GetSuccessorRequest,
    NetworkJoinNotification {
        peer: Identifier,
    },
    NetworkExitNotification {
        peer: Identifier,
    },
    /// `requester` is the peer that started the search; `hops` counts forwards so far.
    FindSuccessorRequest {
        target: RingId,
        requester: Identifier,
        hops: u32,
    },
    PredecessorNotification {
        peer: Identifier,
    },
    SuccessorNotification {
        peer: Identifier,
    },
    StatusResponse {
        status: Status,
    },
    GetRandomPeerRequest,
    GetRandomPeerResponse {
        peer: Identifier,
    },
    LookupRequest {
        file_key: RingId,
        hops: u32,
    },
    LookupResponse {
        peer: Identifier,
    },
    StoreFileRequest {
        key: RingId,
        name: String,
        bytes: Vec<u8>,
    },
    StoreFileResponse {
        key: RingId,
        name: String,
    },
    MoveFileRequest {
        key: RingId,
        name: String,
        bytes: Vec<u8>,
    },
    MoveFileResponse {
        key: RingId,
        name: String,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::RegisterPeerRequest { .. } => MessageKind::RegisterPeerRequest,
            MessageBody::RegisterPeerResponse { .. } => MessageKind::RegisterPeerResponse,
            MessageBody::PeerIdentifierResponse { .. } => MessageKind::PeerIdentifierResponse,
            MessageBody::GetPredecessorRequest => MessageKind::GetPredecessorRequest,
            MessageBody::GetSuccessorRequest => MessageKind::GetSuccessorRequest,
            MessageBody::NetworkJoinNotification { .. } => MessageKind::NetworkJoinNotification,
            MessageBody::NetworkExitNotification { .. } => MessageKind::NetworkExitNotification,
            MessageBody::FindSuccessorRequest { .. } => MessageKind::FindSuccessorRequest,
            MessageBody::PredecessorNotification { .. } => MessageKind::PredecessorNotification,
            MessageBody::SuccessorNotification { .. } => MessageKind::SuccessorNotification,
            MessageBody::StatusResponse { .. } => MessageKind::StatusResponse,
            MessageBody::GetRandomPeerRequest => MessageKind::GetRandomPeerRequest,
            MessageBody::GetRandomPeerResponse { .. } => MessageKind::GetRandomPeerResponse,
            MessageBody::LookupRequest { .. } => MessageKind::LookupRequest,
            MessageBody::LookupResponse { .. } => MessageKind::LookupResponse,
            MessageBody::StoreFileRequest { .. } => MessageKind::StoreFileRequest,
            MessageBody::StoreFileResponse { .. } => MessageKind::StoreFileResponse,
            MessageBody::MoveFileRequest { .. } => MessageKind::MoveFileRequest,
            MessageBody::MoveFileResponse { .. } => MessageKind::MoveFileResponse,
        }
    }

    fn encode_fields(&self, buf: &mut BytesMut) {
        match self {
            MessageBody::GetPredecessorRequest
            | MessageBody::GetSuccessorRequest
            | MessageBody::GetRandomPeerRequest => {}
            MessageBody::RegisterPeerRequest { peer }
            | MessageBody::PeerIdentifierResponse { peer }
            | MessageBody::NetworkJoinNotification { peer }
            | MessageBody::NetworkExitNotification { peer }
            | MessageBody::PredecessorNotification { peer }
            | MessageBody::SuccessorNotification { peer }
            | MessageBody::GetRandomPeerResponse { peer }
            | MessageBody::LookupResponse { peer } => put_identifier(buf, peer),
            MessageBody::RegisterPeerResponse { accepted, contact } => {
                put_bool(buf, *accepted);
                put_identifier(buf, contact);
            }
            MessageBody::FindSuccessorRequest {
                target,
                requester,
                hops,
            } => {
                put_ring_id(buf, *target);
                put_identifier(buf, requester);
                buf.put_u32(*hops);
            }
            MessageBody::StatusResponse { status } => put_string(buf, status.as_str()),
            MessageBody::LookupRequest { file_key, hops } => {
                put_ring_id(buf, *file_key);
                buf.put_u32(*hops);
            }
            MessageBody::StoreFileRequest { key, name, bytes }
            | MessageBody::MoveFileRequest { key, name, bytes } => {
                put_ring_id(buf, *key);
                put_string(buf, name);
                put_blob(buf, bytes);
            }
            MessageBody::StoreFileResponse { key, name }
            | MessageBody::MoveFileResponse { key, name } => {
                put_ring_id(buf, *key);
                put_string(buf, name);
            }
        }
    }

    fn decode_fields(kind: MessageKind, r: &mut WireReader<'_>) -> Result<Self, MessageError> {
        Ok(match kind {
            MessageKind::RegisterPeerRequest => MessageBody::RegisterPeerRequest {
                peer: r.identifier()?,
            },
            MessageKind::RegisterPeerResponse => MessageBody::RegisterPeerResponse {
                accepted: r.bool()?,
                contact: r.identifier()?,
            },
            MessageKind::PeerIdentifierResponse => MessageBody::PeerIdentifierResponse {
                peer: r.identifier()?,
            },
            MessageKind::GetPredecessorRequest => MessageBody::GetPredecessorRequest,
            MessageKind::GetSuccessorRequest => MessageBody::GetSuccessorRequest,
            MessageKind::NetworkJoinNotification => MessageBody::NetworkJoinNotification {
                peer: r.identifier()?,
            },
            MessageKind::NetworkExitNotification => MessageBody::NetworkExitNotification {
                peer: r.identifier()?,
            },
            MessageKind::FindSuccessorRequest => MessageBody::FindSuccessorRequest {
                target: r.ring_id()?,
                requester: r.identifier()?,
                hops: r.u32()?,
            },
            MessageKind::PredecessorNotification => MessageBody::PredecessorNotification {
                peer: r.identifier()?,
            },
            MessageKind::SuccessorNotification => MessageBody::SuccessorNotification {
                peer: r.identifier()?,
            },
            MessageKind::StatusResponse => MessageBody::StatusResponse {
                status: Status::parse(&r.string()?)?,
            },
            MessageKind::GetRandomPeerRequest => MessageBody::GetRandomPeerRequest,
            MessageKind::GetRandomPeerResponse => MessageBody::GetRandomPeerResponse {
                peer: r.identifier()?,
            },
            MessageKind::LookupRequest => MessageBody::LookupRequest {
                file_key: r.ring_id()?,
                hops: r.u32()?,
            },
            MessageKind::LookupResponse => MessageBody::LookupResponse {
                peer: r.identifier()?,
            },
            MessageKind::StoreFileRequest => MessageBody::StoreFileRequest {
                key: r.ring_id()?,
                name: r.string()?,
                bytes: r.blob()?,
            },
            MessageKind::StoreFileResponse => MessageBody::StoreFileResponse {
                key: r.ring_id()?,
                name: r.string()?,
            },
            MessageKind::MoveFileRequest => MessageBody::MoveFileRequest {
                key: r.ring_id()?,
                name: r.string()?,
                bytes: r.blob()?,
            },
            MessageKind::MoveFileResponse => MessageBody::MoveFileResponse {
                key: r.ring_id()?,
                name: r.string()?,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: MessageBody,
}

impl Message {
    pub fn new(header: Header, body: MessageBody) -> Self {
        Self { header, body }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// The same message as sent on by another node.
    pub fn resent_by(&self, header: &Header) -> Self {
        Self {
            header: header.clone(),
            body: self.body.clone(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(self.kind().tag());
        put_string(&mut buf, &self.header.hostname);
        put_string(&mut buf, &self.header.ip_address);
        self.body.encode_fields(&mut buf);
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut reader = WireReader::new(bytes);
        let kind = MessageKind::from_tag(reader.u32()?)?;
        let header = Header {
            hostname: reader.string()?,
            ip_address: reader.string()?,
        };
        let body = MessageBody::decode_fields(kind, &mut reader)?;
        reader.finish()?;
        Ok(Self { header, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::new("shark.cs.example.edu:9001", "10.1.2.3")
    }

    fn peer(id: u16) -> Identifier {
        Identifier::new(format!("host-{}:9001", id), RingId::new(id))
    }

    fn every_body() -> Vec<MessageBody> {
        vec![
            MessageBody::RegisterPeerRequest { peer: peer(1) },
            MessageBody::RegisterPeerResponse {
                accepted: false,
                contact: peer(2),
            },
            MessageBody::PeerIdentifierResponse { peer: peer(3) },
            MessageBody::GetPredecessorRequest,
            MessageBody::GetSuccessorRequest,
            MessageBody::NetworkJoinNotification { peer: peer(4) },
            MessageBody::NetworkExitNotification { peer: peer(5) },
            MessageBody::FindSuccessorRequest {
                target: RingId::new(0xbeef),
                requester: peer(6),
                hops: 3,
            },
            MessageBody::PredecessorNotification { peer: peer(7) },
            MessageBody::SuccessorNotification { peer: peer(8) },
            MessageBody::StatusResponse {
                status: Status::Warning,
            },
            MessageBody::GetRandomPeerRequest,
            MessageBody::GetRandomPeerResponse { peer: peer(9) },
            MessageBody::LookupRequest {
                file_key: RingId::new(0xffff),
                hops: 0,
            },
            MessageBody::LookupResponse { peer: peer(10) },
            MessageBody::StoreFileRequest {
                key: RingId::new(0x1234),
                name: "report.pdf".into(),
                bytes: vec![0, 1, 2, 255, 0],
            },
            MessageBody::StoreFileResponse {
                key: RingId::new(0x1234),
                name: "report.pdf".into(),
            },
            MessageBody::MoveFileRequest {
                key: RingId::new(0),
                name: String::new(),
                bytes: Vec::new(),
            },
            MessageBody::MoveFileResponse {
                key: RingId::new(0),
                name: "ünïcode".into(),
            },
        ]
    }

    #[test]
    fn test_every_kind_round_trips() {
        let bodies = every_body();
        assert_eq!(bodies.len(), 19);
        for body in bodies {
            let message = Message::new(header(), body);
            let decoded = Message::decode(&message.encode()).unwrap();
            assert_eq!(decoded, message, "{}", message.kind());
        }
    }

    #[test]
    fn test_tags_are_stable() {
        for (tag, body) in every_body().iter().enumerate() {
            assert_eq!(body.kind().tag(), tag as u32);
            assert_eq!(MessageKind::from_tag(tag as u32).unwrap(), body.kind());
            let encoded = Message::new(header(), body.clone()).encode();
            assert_eq!(&encoded[..4], &(tag as u32).to_be_bytes());
        }
    }

    #[test]
    fn test_header_layout() {
        let message = Message::new(Header::new("ab", "1"), MessageBody::GetSuccessorRequest);
        assert_eq!(
            &message.encode()[..],
            b"\x00\x00\x00\x04\x00\x00\x00\x02ab\x00\x00\x00\x011"
        );
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = Message::new(header(), MessageBody::GetSuccessorRequest)
            .encode()
            .to_vec();
        bytes[3] = 99;
        assert!(matches!(
            Message::decode(&bytes),
            Err(MessageError::UnknownTag(99))
        ));
    }

    #[test]
    fn test_truncated_message() {
        let encoded = Message::new(
            header(),
            MessageBody::StoreFileRequest {
                key: RingId::new(1),
                name: "a".into(),
                bytes: vec![7; 32],
            },
        )
        .encode();
        for cut in [0, 3, 10, encoded.len() - 1] {
            assert!(
                Message::decode(&encoded[..cut]).is_err(),
                "decoding {} bytes should fail",
                cut
            );
        }
    }

    #[test]
    fn test_bad_ring_id_is_malformed() {
        let mut bytes = BytesMut::new();
        bytes.put_u32(MessageKind::LookupRequest.tag());
        put_string(&mut bytes, "h");
        put_string(&mut bytes, "i");
        put_string(&mut bytes, "xyz!");
        bytes.put_u32(0);
        assert!(matches!(
            Message::decode(&bytes),
            Err(MessageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_resent_by_rewrites_header_only() {
        let original = Message::new(
            header(),
            MessageBody::FindSuccessorRequest {
                target: RingId::new(5),
                requester: peer(1),
                hops: 1,
            },
        );
        let forwarded = original.resent_by(&Header::new("relay:9001", "10.0.0.9"));
        assert_eq!(forwarded.body, original.body);
        assert_eq!(forwarded.header.hostname, "relay:9001");
    }
}

// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bus messages exchanged between a provider and engine peers.
//!
//! Each datagram carries exactly one [`Envelope`], serialized with
//! MessagePack. Bit-level framing below that (sockets, multicast groups)
//! belongs to the transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::frame::FrameData;
use crate::static_data::SubjectStaticData;

/// Version of the provider protocol and C interface. Bumped on any
/// incompatible change to the wire layout or the `ll_*` entry points.
pub const LIVELINK_API_VERSION: i32 = 1;

/// Largest envelope a transport carries: the IPv4 UDP payload limit
/// (65535 minus the 8 byte UDP and 20 byte IP headers).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Size of `value` in the wire encoding. Does not apply the datagram limit.
pub fn wire_len<T: Serialize + ?Sized>(value: &T) -> Result<usize, WireError> {
    Ok(rmp_serde::to_vec_named(value)?.len())
}

/// Identity of one bus endpoint (a provider or an engine instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(Uuid);

impl EndpointId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusMessage {
    /// Provider discovery broadcast.
    Announce {
        provider_name: String,
        api_version: i32,
    },
    /// Engine asks to receive this provider's subjects.
    Subscribe { engine_name: String },
    /// Liveness, sent both ways while connected.
    Heartbeat,
    /// Explicit end of the connection, sent both ways.
    Disconnect,
    /// Create or replace a subject on the engine.
    SubjectStatic {
        subject: String,
        data: SubjectStaticData,
    },
    SubjectRemoved { subject: String },
    FrameData { subject: String, frame: FrameData },
}

impl BusMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BusMessage::Announce { .. } => "announce",
            BusMessage::Subscribe { .. } => "subscribe",
            BusMessage::Heartbeat => "heartbeat",
            BusMessage::Disconnect => "disconnect",
            BusMessage::SubjectStatic { .. } => "subject_static",
            BusMessage::SubjectRemoved { .. } => "subject_removed",
            BusMessage::FrameData { .. } => "frame_data",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode envelope: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("envelope of {size} bytes exceeds the {max} byte datagram limit")]
    TooLarge { size: usize, max: usize },
}

/// Addressed message. `recipient == None` means broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: EndpointId,
    pub recipient: Option<EndpointId>,
    pub message: BusMessage,
}

impl Envelope {
    pub fn broadcast(sender: EndpointId, message: BusMessage) -> Self {
        Self {
            sender,
            recipient: None,
            message,
        }
    }

    pub fn to(sender: EndpointId, recipient: EndpointId, message: BusMessage) -> Self {
        Self {
            sender,
            recipient: Some(recipient),
            message,
        }
    }

    pub fn is_for(&self, endpoint: EndpointId) -> bool {
        self.recipient.is_none_or(|r| r == endpoint)
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let bytes = rmp_serde::to_vec_named(self)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(WireError::TooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(WireError::TooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

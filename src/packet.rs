//! # Packet Types
//!
//! An inbound packet as delivered by the network engine to subscribed
//! handlers, plus the optional ordered parts that can accompany an outbound
//! message. Wire formats are the engine's concern; a [`Packet`] carries the
//! already-transported data.

use crate::opcode::Opcode;
use bytes::Bytes;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

/// Session identifier assigned by the network engine.
pub type SessionId = u32;

/// One ordered part attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketPart {
    pub serial: u32,
    pub data: Bytes,
}

impl PacketPart {
    pub fn new(serial: u32, data: impl Into<Bytes>) -> Self {
        Self {
            serial,
            data: data.into(),
        }
    }
}

/// An inbound packet routed to a handler.
#[derive(Clone)]
pub struct Packet {
    pub opcode: Opcode,
    pub session_id: SessionId,
    pub status: i32,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
    /// Raw payload bytes as received.
    pub data: Bytes,
    /// Decoded payload, present when a decoder was registered for the opcode.
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Packet {
    pub fn new(opcode: Opcode, session_id: SessionId) -> Self {
        Self {
            opcode,
            session_id,
            status: 0,
            local_addr: None,
            peer_addr: None,
            data: Bytes::new(),
            payload: None,
        }
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// The decoded payload downcast to its concrete type, if present.
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.payload.clone().and_then(|p| p.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("opcode", &self.opcode)
            .field("session_id", &self.session_id)
            .field("status", &self.status)
            .field("data_len", &self.data.len())
            .field("decoded", &self.payload.is_some())
            .finish()
    }
}

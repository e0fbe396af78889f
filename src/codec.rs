//! # Coder Infrastructure
//!
//! Payload types encode themselves with [`Encodable`] and reconstruct
//! themselves with [`Decodable`]. A [`CoderSpec`] is the type-erased form a
//! registration record carries: it remembers the payload's concrete type for
//! encoder-table lookup and holds a monomorphized decode entry point the
//! engine can invoke per opcode.
//!
//! Byte-level wire formats stay with the engine; these traits only define how
//! a payload maps to and from its payload buffer.

use crate::opcode::Opcode;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Payload codec strategy of a service, applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecStrategy {
    Json,
    Binary,
}

/// Errors raised while encoding or decoding payloads.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("encode failed for {type_name}: {message}")]
    Encode {
        type_name: &'static str,
        message: String,
    },

    #[error("decode failed for opcode {opcode}: {message}")]
    Decode { opcode: Opcode, message: String },
}

/// A payload that can serialize itself into an outbound buffer.
pub trait Encodable {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError>;
}

/// A payload that can be reconstructed from an inbound buffer.
pub trait Decodable: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self, CodecError>;
}

impl Encodable for Bytes {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl Encodable for Vec<u8> {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl Encodable for serde_json::Value {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let encoded = serde_json::to_vec(self).map_err(|e| CodecError::Encode {
            type_name: "serde_json::Value",
            message: e.to_string(),
        })?;
        buf.extend_from_slice(&encoded);
        Ok(())
    }
}

type DecodeFn = fn(Opcode, &mut Bytes) -> Result<Arc<dyn Any + Send + Sync>, CodecError>;

fn decode_erased<T>(_opcode: Opcode, buf: &mut Bytes) -> Result<Arc<dyn Any + Send + Sync>, CodecError>
where
    T: Decodable + Send + Sync + 'static,
{
    T::decode(buf).map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
}

/// Type-erased coder description attached to a registration record.
#[derive(Clone)]
pub struct CoderSpec {
    type_id: TypeId,
    type_name: &'static str,
    decode: Option<DecodeFn>,
}

impl CoderSpec {
    /// Spec for a payload type that both encodes and decodes.
    pub fn of<T>() -> Self
    where
        T: Encodable + Decodable + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            decode: Some(decode_erased::<T>),
        }
    }

    /// Spec for a send-only payload type.
    pub fn encode_only<T>() -> Self
    where
        T: Encodable + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            decode: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn can_decode(&self) -> bool {
        self.decode.is_some()
    }

    /// Decode an inbound buffer into the spec's payload type.
    pub fn decode(&self, opcode: Opcode, buf: &mut Bytes) -> Result<Arc<dyn Any + Send + Sync>, CodecError> {
        match self.decode {
            Some(decode) => decode(opcode, buf),
            None => Err(CodecError::Decode {
                opcode,
                message: format!("{} is registered as encode-only", self.type_name),
            }),
        }
    }
}

impl fmt::Debug for CoderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoderSpec")
            .field("type_name", &self.type_name)
            .field("can_decode", &self.can_decode())
            .finish()
    }
}

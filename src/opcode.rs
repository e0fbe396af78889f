//! # Opcode Types
//!
//! Message opcodes identify packet types for routing. Anything that can name
//! an opcode (a raw integer, an [`Opcode`] value, or a message type carrying
//! its opcode) implements [`OpcodeSource`], which is the single capability
//! registration declarations accept.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A message opcode used to route packets to handlers and coders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Opcode carried by packets on raw-kind services.
    pub const RAW: Opcode = Opcode(0);
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Opcode {
    fn from(value: u16) -> Self {
        Opcode(value)
    }
}

/// Capability of providing an opcode.
///
/// Registration declarations resolve every opcode-like argument through this
/// trait before storing the raw value, so message types can expose their
/// opcode once and be passed directly to `handles`, `decodes`, etc.
pub trait OpcodeSource {
    /// The opcode this value names.
    fn opcode(&self) -> Opcode;
}

impl OpcodeSource for Opcode {
    fn opcode(&self) -> Opcode {
        *self
    }
}

impl OpcodeSource for u16 {
    fn opcode(&self) -> Opcode {
        Opcode(*self)
    }
}

impl<T: OpcodeSource + ?Sized> OpcodeSource for &T {
    fn opcode(&self) -> Opcode {
        (**self).opcode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LoginRequest;

    impl OpcodeSource for LoginRequest {
        fn opcode(&self) -> Opcode {
            Opcode(101)
        }
    }

    #[test]
    fn raw_integers_and_message_types_resolve() {
        assert_eq!(42u16.opcode(), Opcode(42));
        assert_eq!(LoginRequest.opcode(), Opcode(101));
        assert_eq!((&LoginRequest).opcode(), Opcode(101));
    }

    #[test]
    fn display_renders_the_raw_value() {
        assert_eq!(Opcode(7).to_string(), "7");
    }
}

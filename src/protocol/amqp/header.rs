use crate::error::AmqpError;
use bytes::{BufMut, BytesMut};

// --- Constants ---
pub const HEADER_LENGTH: usize = 8;
const MAGIC: &[u8; 4] = b"AMQP";

pub const PROTOCOL_ID_AMQP: u8 = 0;
pub const PROTOCOL_ID_TLS: u8 = 2;
pub const PROTOCOL_ID_SASL: u8 = 3;

// AMQP version this implementation sends and expects from peers.
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const VERSION_REVISION: u8 = 0;

/// The 8-byte protocol header exchanged before any frame: `"AMQP" id major minor revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
  pub protocol_id: u8,
  pub version: (u8, u8, u8),
}

impl ProtocolHeader {
  pub const fn amqp() -> Self {
    Self {
      protocol_id: PROTOCOL_ID_AMQP,
      version: (VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION),
    }
  }

  pub fn encode(&self, buffer: &mut BytesMut) {
    buffer.reserve(HEADER_LENGTH);
    buffer.put_slice(MAGIC);
    buffer.put_u8(self.protocol_id);
    buffer.put_u8(self.version.0);
    buffer.put_u8(self.version.1);
    buffer.put_u8(self.version.2);
  }

  /// Parses and consumes a header from the front of `buffer`.
  ///
  /// Returns `Ok(None)` when fewer than 8 bytes are buffered. Anything other than
  /// AMQP 1.0.0 with protocol id 0 is rejected: TLS and SASL layers belong to the transport.
  pub fn decode(buffer: &mut BytesMut) -> Result<Option<Self>, AmqpError> {
    // A mismatching prefix can be rejected before the full header arrives.
    let prefix = buffer.len().min(MAGIC.len());
    if buffer[..prefix] != MAGIC[..prefix] {
      tracing::error!(received = ?&buffer[..prefix], "Protocol header does not start with 'AMQP'");
      return Err(AmqpError::UnsupportedProtocol(format!(
        "expected AMQP protocol header, got {:?}",
        String::from_utf8_lossy(&buffer[..prefix])
      )));
    }
    if buffer.len() < HEADER_LENGTH {
      return Ok(None); // Need more data
    }

    let data = buffer.split_to(HEADER_LENGTH);
    let header = Self {
      protocol_id: data[4],
      version: (data[5], data[6], data[7]),
    };

    match header.protocol_id {
      PROTOCOL_ID_AMQP => {}
      PROTOCOL_ID_TLS => return Err(AmqpError::UnsupportedProtocol("TLS layer requested by peer".into())),
      PROTOCOL_ID_SASL => return Err(AmqpError::UnsupportedProtocol("SASL layer requested by peer".into())),
      other => {
        return Err(AmqpError::UnsupportedProtocol(format!("unknown protocol id {}", other)));
      }
    }
    if header.version != (VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION) {
      return Err(AmqpError::UnsupportedProtocol(format!(
        "unsupported AMQP version {}.{}.{}",
        header.version.0, header.version.1, header.version.2
      )));
    }

    tracing::debug!(version = ?header.version, "Parsed AMQP protocol header");
    Ok(Some(header))
  }
}

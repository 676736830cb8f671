use std::io;
use thiserror::Error;

use crate::protocol::amqp::performative::ErrorCondition;

/// Well-known AMQP error condition symbols used by the engine.
pub mod condition {
  pub const INTERNAL_ERROR: &str = "amqp:internal-error";
  pub const NOT_FOUND: &str = "amqp:not-found";
  pub const DECODE_ERROR: &str = "amqp:decode-error";
  pub const RESOURCE_LIMIT_EXCEEDED: &str = "amqp:resource-limit-exceeded";
  pub const NOT_ALLOWED: &str = "amqp:not-allowed";
  pub const INVALID_FIELD: &str = "amqp:invalid-field";
  pub const NOT_IMPLEMENTED: &str = "amqp:not-implemented";
  pub const FRAME_SIZE_TOO_SMALL: &str = "amqp:frame-size-too-small";
  pub const CONNECTION_FORCED: &str = "amqp:connection:forced";
  pub const FRAMING_ERROR: &str = "amqp:connection:framing-error";
  pub const SESSION_ERRANT_LINK: &str = "amqp:session:errant-link";
  pub const SESSION_UNATTACHED_HANDLE: &str = "amqp:session:unattached-handle";
}

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum AmqpError {
  // --- I/O Errors ---
  /// Raised by the I/O adapter's read, write or close. Always fatal to the engine.
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  // --- Protocol Errors ---
  #[error("AMQP protocol violation: {0}")]
  ProtocolViolation(String),

  #[error("AMQP decode error: {0}")]
  Decode(String),

  #[error("Frame of {size} bytes exceeds max-frame-size {max}")]
  FrameTooLarge { size: usize, max: usize },

  #[error("Unsupported protocol header: {0}")]
  UnsupportedProtocol(String),

  // --- API misuse ---
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  #[error("Operation is invalid for the current endpoint state: {0}")]
  InvalidState(&'static str),

  #[error("Connection closed")]
  ConnectionClosed,

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl AmqpError {
  /// True for errors raised by the host I/O adapter rather than by protocol processing.
  pub fn is_io(&self) -> bool {
    matches!(self, AmqpError::Io(_))
  }

  /// The AMQP error condition symbol that best describes this error on the wire.
  pub fn condition(&self) -> &'static str {
    match self {
      AmqpError::Io(_) => condition::CONNECTION_FORCED,
      AmqpError::ProtocolViolation(_) | AmqpError::UnsupportedProtocol(_) => condition::FRAMING_ERROR,
      AmqpError::Decode(_) => condition::DECODE_ERROR,
      AmqpError::FrameTooLarge { .. } => condition::FRAMING_ERROR,
      AmqpError::InvalidArgument(_) => condition::INVALID_FIELD,
      AmqpError::InvalidState(_) | AmqpError::ConnectionClosed => condition::NOT_ALLOWED,
      AmqpError::Internal(_) => condition::INTERNAL_ERROR,
    }
  }

  /// Converts this error into the condition that is sent to (or recorded for) the peer.
  pub fn to_condition(&self) -> ErrorCondition {
    ErrorCondition::new(self.condition(), self.to_string())
  }

  pub(crate) fn decode(msg: impl Into<String>) -> Self {
    AmqpError::Decode(msg.into())
  }
}

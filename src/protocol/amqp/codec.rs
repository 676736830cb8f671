use crate::error::AmqpError;
use crate::protocol::amqp::performative::Performative;
use crate::protocol::amqp::types::Value;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the fixed frame header: size(4) + doff(1) + type(1) + channel(2).
pub const FRAME_HEADER_LENGTH: usize = 8;
/// Smallest max-frame-size a peer may advertise.
pub const MIN_MAX_FRAME_SIZE: usize = 512;

pub const FRAME_TYPE_AMQP: u8 = 0x00;
pub const FRAME_TYPE_SASL: u8 = 0x01;

/// Body of a single AMQP frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
  /// An empty frame, used to keep an idle connection alive.
  Heartbeat,
  Amqp {
    performative: Performative,
    /// Bytes following the performative. Only transfers carry a payload.
    payload: Bytes,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  pub channel: u16,
  pub body: FrameBody,
}

impl Frame {
  pub fn new(channel: u16, performative: Performative) -> Self {
    Self {
      channel,
      body: FrameBody::Amqp {
        performative,
        payload: Bytes::new(),
      },
    }
  }

  pub fn with_payload(channel: u16, performative: Performative, payload: Bytes) -> Self {
    Self {
      channel,
      body: FrameBody::Amqp { performative, payload },
    }
  }

  pub fn heartbeat() -> Self {
    Self::heartbeat_on(0)
  }

  fn heartbeat_on(channel: u16) -> Self {
    Self {
      channel,
      body: FrameBody::Heartbeat,
    }
  }

  pub fn name(&self) -> &'static str {
    match &self.body {
      FrameBody::Heartbeat => "heartbeat",
      FrameBody::Amqp { performative, .. } => performative.name(),
    }
  }
}

/// Codec for AMQP 1.0 framing.
#[derive(Debug)]
pub struct FrameCodec {
  decoding_state: DecodingState,
  /// Largest frame accepted on decode (the local max-frame-size).
  max_frame_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadHeader, // Waiting for the 8 byte frame header
  ReadBody(FrameHeader), // Waiting for frame body bytes
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
  size: usize,
  doff: usize,
  channel: u16,
}

impl FrameCodec {
  pub fn new(max_frame_size: usize) -> Self {
    Self {
      decoding_state: DecodingState::default(),
      max_frame_size: max_frame_size.max(MIN_MAX_FRAME_SIZE),
    }
  }

  pub fn max_frame_size(&self) -> usize {
    self.max_frame_size
  }

  /// Number of bytes still needed to complete the frame currently being decoded, if known.
  pub fn pending_frame_size(&self) -> Option<usize> {
    match self.decoding_state {
      DecodingState::ReadHeader => None,
      DecodingState::ReadBody(header) => Some(header.size - FRAME_HEADER_LENGTH),
    }
  }

  /// Bytes a frame carrying `performative` occupies before any payload.
  pub fn frame_overhead(performative: &Performative) -> usize {
    FRAME_HEADER_LENGTH + performative.to_value().encoded_len()
  }
}

// --- Encoder Implementation (Frame -> BytesMut) ---
impl Encoder<Frame> for FrameCodec {
  type Error = AmqpError;

  fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let start = dst.len();
    // Size is patched once the body length is known.
    dst.reserve(FRAME_HEADER_LENGTH);
    dst.put_u32(0);
    dst.put_u8(2); // doff in 4-byte words, no extended header
    dst.put_u8(FRAME_TYPE_AMQP);
    dst.put_u16(item.channel);

    if let FrameBody::Amqp { performative, payload } = &item.body {
      performative.to_value().encode(dst);
      dst.put_slice(payload);
    }

    let size = dst.len() - start;
    let size32 = u32::try_from(size).map_err(|_| AmqpError::FrameTooLarge {
      size,
      max: u32::MAX as usize,
    })?;
    dst[start..start + 4].copy_from_slice(&size32.to_be_bytes());
    Ok(())
  }
}

// --- Decoder Implementation (BytesMut -> Frame) ---
impl Decoder for FrameCodec {
  type Item = Frame;
  type Error = AmqpError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.decoding_state {
        DecodingState::ReadHeader => {
          if src.len() < FRAME_HEADER_LENGTH {
            return Ok(None); // Need more data for header
          }

          let mut header_bytes = src.split_to(FRAME_HEADER_LENGTH);
          let size = header_bytes.get_u32() as usize;
          let doff = header_bytes.get_u8() as usize * 4;
          let frame_type = header_bytes.get_u8();
          let channel = header_bytes.get_u16();

          if size < FRAME_HEADER_LENGTH || doff < FRAME_HEADER_LENGTH || doff > size {
            return Err(AmqpError::ProtocolViolation(format!(
              "malformed frame header (size={}, doff={})",
              size, doff
            )));
          }
          if size > self.max_frame_size {
            return Err(AmqpError::FrameTooLarge {
              size,
              max: self.max_frame_size,
            });
          }
          if frame_type != FRAME_TYPE_AMQP {
            return Err(AmqpError::ProtocolViolation(format!(
              "unexpected frame type {:#04x}",
              frame_type
            )));
          }

          self.decoding_state = DecodingState::ReadBody(FrameHeader { size, doff, channel });
          // Continue loop to try decoding body immediately if possible
        }

        DecodingState::ReadBody(header) => {
          let body_len = header.size - FRAME_HEADER_LENGTH;
          if src.len() < body_len {
            // Not enough data for the body yet
            src.reserve(body_len - src.len());
            return Ok(None);
          }

          let mut body = src.split_to(body_len).freeze();
          self.decoding_state = DecodingState::ReadHeader;

          // Extended header is ignored.
          body.advance(header.doff - FRAME_HEADER_LENGTH);
          if body.is_empty() {
            return Ok(Some(Frame::heartbeat_on(header.channel)));
          }

          let performative = Performative::from_value(Value::decode(&mut body)?)?;
          return Ok(Some(Frame {
            channel: header.channel,
            body: FrameBody::Amqp {
              performative,
              payload: body,
            },
          }));
        }
      } // end match self.decoding_state
    } // end loop
  } // end decode
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::amqp::performative::{Close, Transfer};

  #[test]
  fn heartbeat_is_eight_bytes() {
    let mut codec = FrameCodec::new(4096);
    let mut buf = BytesMut::new();
    codec.encode(Frame::heartbeat(), &mut buf).unwrap();
    assert_eq!(&buf[..], &[0, 0, 0, 8, 2, 0, 0, 0]);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::heartbeat()));
  }

  #[test]
  fn transfer_payload_survives_byte_by_byte_delivery() {
    let mut codec = FrameCodec::new(4096);
    let frame = Frame::with_payload(
      3,
      Performative::Transfer(Transfer {
        handle: 1,
        delivery_id: Some(0),
        delivery_tag: Some(Bytes::from_static(b"\x00")),
        ..Default::default()
      }),
      Bytes::from_static(b"payload"),
    );
    let mut encoded = BytesMut::new();
    codec.encode(frame.clone(), &mut encoded).unwrap();

    let mut src = BytesMut::new();
    let mut decoded = None;
    for byte in encoded.iter() {
      src.put_u8(*byte);
      if let Some(f) = codec.decode(&mut src).unwrap() {
        decoded = Some(f);
      }
    }
    assert_eq!(decoded, Some(frame));
    assert!(src.is_empty());
  }

  #[test]
  fn oversized_frame_is_rejected() {
    let mut codec = FrameCodec::new(512);
    let mut buf = BytesMut::new();
    buf.put_u32(100_000);
    buf.put_u8(2);
    buf.put_u8(0);
    buf.put_u16(0);
    assert!(matches!(
      codec.decode(&mut buf),
      Err(AmqpError::FrameTooLarge { size: 100_000, max: 512 })
    ));
  }

  #[test]
  fn sasl_frame_type_is_rejected() {
    let mut codec = FrameCodec::new(512);
    let mut buf = BytesMut::from(&[0u8, 0, 0, 8, 2, FRAME_TYPE_SASL, 0, 0][..]);
    assert!(matches!(codec.decode(&mut buf), Err(AmqpError::ProtocolViolation(_))));
  }

  #[test]
  fn frame_overhead_matches_encoding() {
    let close = Performative::Close(Close::default());
    let mut codec = FrameCodec::new(512);
    let mut buf = BytesMut::new();
    codec.encode(Frame::new(0, close.clone()), &mut buf).unwrap();
    assert_eq!(FrameCodec::frame_overhead(&close), buf.len());
  }
}

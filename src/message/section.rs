//! Encoding of a [`Message`] into the sequence of sections carried by transfer payloads.

use super::msg::{Body, Header, Message, Properties};
use crate::error::AmqpError;
use crate::protocol::amqp::types::Value;
use bytes::{Bytes, BytesMut};

const HEADER: u64 = 0x70;
const DELIVERY_ANNOTATIONS: u64 = 0x71;
const MESSAGE_ANNOTATIONS: u64 = 0x72;
const PROPERTIES: u64 = 0x73;
const APPLICATION_PROPERTIES: u64 = 0x74;
const DATA: u64 = 0x75;
const AMQP_SEQUENCE: u64 = 0x76;
const AMQP_VALUE: u64 = 0x77;
const FOOTER: u64 = 0x78;

fn trimmed_list(mut fields: Vec<Value>) -> Value {
  while matches!(fields.last(), Some(Value::Null)) {
    fields.pop();
  }
  Value::List(fields)
}

impl Message {
  /// Encodes the message sections into `dst`.
  pub fn encode(&self, dst: &mut BytesMut) {
    if let Some(h) = &self.header {
      let fields = vec![
        if h.durable { Value::Bool(true) } else { Value::Null },
        if h.priority == 4 { Value::Null } else { Value::Ubyte(h.priority) },
        Value::from(h.ttl),
        if h.first_acquirer { Value::Bool(true) } else { Value::Null },
        if h.delivery_count == 0 {
          Value::Null
        } else {
          Value::Uint(h.delivery_count)
        },
      ];
      Value::described(HEADER, trimmed_list(fields)).encode(dst);
    }

    if !self.properties.is_empty() {
      let p = &self.properties;
      let fields = vec![
        p.message_id.clone().unwrap_or(Value::Null),
        p.user_id.clone().map_or(Value::Null, Value::Binary),
        Value::from(p.to.clone()),
        Value::from(p.subject.clone()),
        Value::from(p.reply_to.clone()),
        p.correlation_id.clone().unwrap_or(Value::Null),
        p.content_type.clone().map_or(Value::Null, Value::Symbol),
        p.content_encoding.clone().map_or(Value::Null, Value::Symbol),
        Value::Null, // absolute-expiry-time
        p.creation_time.map_or(Value::Null, Value::Timestamp),
        Value::from(p.group_id.clone()),
      ];
      Value::described(PROPERTIES, trimmed_list(fields)).encode(dst);
    }

    if !self.application_properties.is_empty() {
      let map = self
        .application_properties
        .iter()
        .map(|(k, v)| (Value::String(k.clone()), v.clone()))
        .collect();
      Value::described(APPLICATION_PROPERTIES, Value::Map(map)).encode(dst);
    }

    match &self.body {
      Body::Empty => {}
      Body::Data(b) => Value::described(DATA, Value::Binary(b.clone())).encode(dst),
      Body::Value(v) => Value::described(AMQP_VALUE, v.clone()).encode(dst),
    }
  }

  /// Decodes a complete (reassembled) transfer payload into a message.
  ///
  /// Annotations and footers are skipped. Multiple `data` sections are concatenated.
  pub fn decode(mut payload: Bytes) -> Result<Self, AmqpError> {
    let mut msg = Message::new();
    let mut data: Option<BytesMut> = None;

    while !payload.is_empty() {
      let section = Value::decode(&mut payload)?;
      let (Some(code), Value::Described(_, body)) = (section.descriptor_code(), section) else {
        return Err(AmqpError::decode("message section is not a described value"));
      };
      match code {
        HEADER => msg.header = Some(decode_header(*body)?),
        DELIVERY_ANNOTATIONS | MESSAGE_ANNOTATIONS | FOOTER => {}
        PROPERTIES => msg.properties = decode_properties(*body)?,
        APPLICATION_PROPERTIES => {
          let Value::Map(pairs) = *body else {
            return Err(AmqpError::decode("application-properties must be a map"));
          };
          for (k, v) in pairs {
            let key = k
              .as_str()
              .ok_or_else(|| AmqpError::decode("application-properties key must be a string"))?
              .to_string();
            msg.application_properties.push((key, v));
          }
        }
        DATA => {
          let Value::Binary(chunk) = *body else {
            return Err(AmqpError::decode("data section must be binary"));
          };
          data.get_or_insert_with(BytesMut::new).extend_from_slice(&chunk);
        }
        AMQP_VALUE => msg.body = Body::Value(*body),
        AMQP_SEQUENCE => msg.body = Body::Value(*body),
        other => {
          return Err(AmqpError::decode(format!("unknown message section {:#x}", other)));
        }
      }
    }

    if let Some(d) = data {
      msg.body = Body::Data(d.freeze());
    }
    Ok(msg)
  }
}

fn list_items(v: Value, what: &'static str) -> Result<std::vec::IntoIter<Value>, AmqpError> {
  match v {
    Value::List(items) => Ok(items.into_iter()),
    _ => Err(AmqpError::decode(format!("{} section must be a list", what))),
  }
}

fn decode_header(v: Value) -> Result<Header, AmqpError> {
  let mut it = list_items(v, "header")?;
  let mut next = || it.next().unwrap_or(Value::Null);
  let durable = next().as_bool().unwrap_or(false);
  let priority = match next().as_u32() {
    Some(p) => u8::try_from(p).map_err(|_| AmqpError::decode(format!("header priority {} is out of range", p)))?,
    None => 4,
  };
  Ok(Header {
    durable,
    priority,
    ttl: next().as_u32(),
    first_acquirer: next().as_bool().unwrap_or(false),
    delivery_count: next().as_u32().unwrap_or(0),
  })
}

fn decode_properties(v: Value) -> Result<Properties, AmqpError> {
  let mut it = list_items(v, "properties")?;
  let mut next = || it.next().unwrap_or(Value::Null);
  let string = |v: Value| v.as_str().map(str::to_string);
  let not_null = |v: Value| if v.is_null() { None } else { Some(v) };
  let message_id = not_null(next());
  let user_id = next().as_binary().cloned();
  let to = string(next());
  let subject = string(next());
  let reply_to = string(next());
  let correlation_id = not_null(next());
  let content_type = string(next());
  let content_encoding = string(next());
  let _absolute_expiry_time = next();
  let creation_time = match next() {
    Value::Timestamp(ms) => Some(ms),
    _ => None,
  };
  let group_id = string(next());
  Ok(Properties {
    message_id,
    user_id,
    to,
    subject,
    reply_to,
    correlation_id,
    content_type,
    content_encoding,
    creation_time,
    group_id,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_message_survives_encoding() {
    let mut msg = Message::from_static(b"hello");
    msg
      .set_to("queue-a")
      .set_subject("greeting")
      .set_message_id(Value::Ulong(42))
      .set_durable(true)
      .set_property("count", 3i32);

    let mut buf = BytesMut::new();
    msg.encode(&mut buf);
    let decoded = Message::decode(buf.freeze()).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.property("count"), Some(&Value::Int(3)));
  }

  #[test]
  fn value_body_and_no_properties() {
    let msg = Message::from_value("text body");
    let mut buf = BytesMut::new();
    msg.encode(&mut buf);
    // described(smallulong 0x77, str8 ...)
    assert_eq!(&buf[..4], &[0x00, 0x53, 0x77, 0xa1]);
    let decoded = Message::decode(buf.freeze()).unwrap();
    assert_eq!(decoded.data(), Some(&b"text body"[..]));
  }

  #[test]
  fn multiple_data_sections_are_joined() {
    let mut buf = BytesMut::new();
    Value::described(DATA, Value::Binary(Bytes::from_static(b"ab"))).encode(&mut buf);
    Value::described(DATA, Value::Binary(Bytes::from_static(b"cd"))).encode(&mut buf);
    let decoded = Message::decode(buf.freeze()).unwrap();
    assert_eq!(decoded.data(), Some(&b"abcd"[..]));
  }

  #[test]
  fn annotations_are_skipped() {
    let mut buf = BytesMut::new();
    Value::described(MESSAGE_ANNOTATIONS, Value::Map(vec![(Value::symbol("x-opt"), Value::Int(1))])).encode(&mut buf);
    Value::described(DATA, Value::Binary(Bytes::from_static(b"z"))).encode(&mut buf);
    let decoded = Message::decode(buf.freeze()).unwrap();
    assert_eq!(decoded.body, Body::Data(Bytes::from_static(b"z")));
  }

  #[test]
  fn out_of_range_priority_is_rejected() {
    let mut buf = BytesMut::new();
    Value::described(HEADER, Value::List(vec![Value::Null, Value::Uint(260)])).encode(&mut buf);
    let err = Message::decode(buf.freeze()).unwrap_err();
    assert!(matches!(err, AmqpError::Decode(_)), "got {:?}", err);
  }
}

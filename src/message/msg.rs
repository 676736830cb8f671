use crate::protocol::amqp::types::Value;
use bytes::Bytes;
use std::fmt;

/// Standard message header section.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
  pub durable: bool,
  pub priority: u8,
  /// Time-to-live in milliseconds.
  pub ttl: Option<u32>,
  pub first_acquirer: bool,
  pub delivery_count: u32,
}

impl Default for Header {
  fn default() -> Self {
    Self {
      durable: false,
      priority: 4,
      ttl: None,
      first_acquirer: false,
      delivery_count: 0,
    }
  }
}

/// Immutable properties of the bare message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties {
  pub message_id: Option<Value>,
  pub user_id: Option<Bytes>,
  pub to: Option<String>,
  pub subject: Option<String>,
  pub reply_to: Option<String>,
  pub correlation_id: Option<Value>,
  pub content_type: Option<String>,
  pub content_encoding: Option<String>,
  /// Milliseconds since the unix epoch.
  pub creation_time: Option<i64>,
  pub group_id: Option<String>,
}

impl Properties {
  pub(crate) fn is_empty(&self) -> bool {
    *self == Properties::default()
  }
}

/// Body of a message: opaque bytes, a single AMQP value, or nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
  #[default]
  Empty,
  Data(Bytes),
  Value(Value),
}

/// An AMQP message as seen by the application.
#[derive(Clone, Default, PartialEq)]
pub struct Message {
  pub header: Option<Header>,
  pub properties: Properties,
  /// Application properties keep insertion order.
  pub application_properties: Vec<(String, Value)>,
  pub body: Body,
}

impl Message {
  /// Creates an empty message with no body.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a message with a binary `data` body.
  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      body: Body::Data(data),
      ..Default::default()
    }
  }

  /// Creates a message from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self::from_bytes(Bytes::from_static(data))
  }

  /// Creates a message whose body is a single `amqp-value` section.
  pub fn from_value(value: impl Into<Value>) -> Self {
    Self {
      body: Body::Value(value.into()),
      ..Default::default()
    }
  }

  /// Returns the body bytes for a `data` body, or the string content of a string/symbol value body.
  pub fn data(&self) -> Option<&[u8]> {
    match &self.body {
      Body::Data(b) => Some(b),
      Body::Value(v) => v.as_str().map(str::as_bytes),
      Body::Empty => None,
    }
  }

  pub fn set_to(&mut self, to: impl Into<String>) -> &mut Self {
    self.properties.to = Some(to.into());
    self
  }

  pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
    self.properties.subject = Some(subject.into());
    self
  }

  pub fn set_message_id(&mut self, id: impl Into<Value>) -> &mut Self {
    self.properties.message_id = Some(id.into());
    self
  }

  pub fn set_reply_to(&mut self, reply_to: impl Into<String>) -> &mut Self {
    self.properties.reply_to = Some(reply_to.into());
    self
  }

  pub fn set_correlation_id(&mut self, id: impl Into<Value>) -> &mut Self {
    self.properties.correlation_id = Some(id.into());
    self
  }

  pub fn set_durable(&mut self, durable: bool) -> &mut Self {
    self.header.get_or_insert_with(Header::default).durable = durable;
    self
  }

  /// Appends an application property, replacing an existing key.
  pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
    let key = key.into();
    let value = value.into();
    match self.application_properties.iter_mut().find(|(k, _)| *k == key) {
      Some(slot) => slot.1 = value,
      None => self.application_properties.push((key, value)),
    }
    self
  }

  pub fn property(&self, key: &str) -> Option<&Value> {
    self
      .application_properties
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v)
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let body = match &self.body {
      Body::Empty => "empty".to_string(),
      Body::Data(b) => format!("{} bytes", b.len()), // Avoid printing large data
      Body::Value(v) => format!("{:?}", v),
    };
    f.debug_struct("Message")
      .field("header", &self.header)
      .field("properties", &self.properties)
      .field("application_properties", &self.application_properties.len())
      .field("body", &body)
      .finish()
  }
}

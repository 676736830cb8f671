// src/protocol/amqp/types.rs

//! The AMQP 1.0 type system: a dynamically typed [`Value`] plus its binary encoding.
//!
//! Encoding always picks the most compact constructor for a value. Decoding
//! accepts every constructor defined for the supported types.

use crate::error::AmqpError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

// --- Constructor codes ---
pub const DESCRIBED: u8 = 0x00;
pub const NULL: u8 = 0x40;
pub const TRUE: u8 = 0x41;
pub const FALSE: u8 = 0x42;
pub const BOOLEAN: u8 = 0x56;
pub const UBYTE: u8 = 0x50;
pub const USHORT: u8 = 0x60;
pub const UINT: u8 = 0x70;
pub const SMALL_UINT: u8 = 0x52;
pub const UINT_0: u8 = 0x43;
pub const ULONG: u8 = 0x80;
pub const SMALL_ULONG: u8 = 0x53;
pub const ULONG_0: u8 = 0x44;
pub const BYTE: u8 = 0x51;
pub const SHORT: u8 = 0x61;
pub const INT: u8 = 0x71;
pub const SMALL_INT: u8 = 0x54;
pub const LONG: u8 = 0x81;
pub const SMALL_LONG: u8 = 0x55;
pub const FLOAT: u8 = 0x72;
pub const DOUBLE: u8 = 0x82;
pub const CHAR: u8 = 0x73;
pub const TIMESTAMP: u8 = 0x83;
pub const UUID: u8 = 0x98;
pub const VBIN8: u8 = 0xa0;
pub const VBIN32: u8 = 0xb0;
pub const STR8: u8 = 0xa1;
pub const STR32: u8 = 0xb1;
pub const SYM8: u8 = 0xa3;
pub const SYM32: u8 = 0xb3;
pub const LIST0: u8 = 0x45;
pub const LIST8: u8 = 0xc0;
pub const LIST32: u8 = 0xd0;
pub const MAP8: u8 = 0xc1;
pub const MAP32: u8 = 0xd1;
pub const ARRAY8: u8 = 0xe0;
pub const ARRAY32: u8 = 0xf0;

/// Deepest nesting of described and compound values the decoder accepts.
pub const MAX_NESTING_DEPTH: usize = 64;

/// A single AMQP value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Ubyte(u8),
  Ushort(u16),
  Uint(u32),
  Ulong(u64),
  Byte(i8),
  Short(i16),
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  Char(char),
  /// Milliseconds since the unix epoch.
  Timestamp(i64),
  Uuid([u8; 16]),
  Binary(Bytes),
  String(String),
  Symbol(String),
  List(Vec<Value>),
  /// Maps keep their wire order, keys may be any value.
  Map(Vec<(Value, Value)>),
  /// All elements share one constructor on the wire.
  Array(Vec<Value>),
  Described(Box<Value>, Box<Value>),
}

impl Value {
  pub fn symbol(s: impl Into<String>) -> Self {
    Value::Symbol(s.into())
  }

  pub fn described(descriptor: u64, value: Value) -> Self {
    Value::Described(Box::new(Value::Ulong(descriptor)), Box::new(value))
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Returns the string content of a `String` or `Symbol`.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) | Value::Symbol(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  /// Widens any unsigned integer that fits into a `u32`.
  pub fn as_u32(&self) -> Option<u32> {
    match self {
      Value::Ubyte(v) => Some(*v as u32),
      Value::Ushort(v) => Some(*v as u32),
      Value::Uint(v) => Some(*v),
      Value::Ulong(v) => u32::try_from(*v).ok(),
      _ => None,
    }
  }

  pub fn as_u64(&self) -> Option<u64> {
    match self {
      Value::Ubyte(v) => Some(*v as u64),
      Value::Ushort(v) => Some(*v as u64),
      Value::Uint(v) => Some(*v as u64),
      Value::Ulong(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_binary(&self) -> Option<&Bytes> {
    match self {
      Value::Binary(b) => Some(b),
      _ => None,
    }
  }

  /// Returns the descriptor code of a described value, accepting both numeric and symbolic descriptors.
  pub fn descriptor_code(&self) -> Option<u64> {
    match self {
      Value::Described(d, _) => match d.as_ref() {
        Value::Ulong(code) => Some(*code),
        Value::Symbol(name) => symbolic_descriptor(name),
        _ => None,
      },
      _ => None,
    }
  }

  /// Encodes the value, constructor included, into `dst`.
  pub fn encode(&self, dst: &mut BytesMut) {
    match self {
      Value::Null => dst.put_u8(NULL),
      Value::Bool(true) => dst.put_u8(TRUE),
      Value::Bool(false) => dst.put_u8(FALSE),
      Value::Ubyte(v) => {
        dst.put_u8(UBYTE);
        dst.put_u8(*v);
      }
      Value::Ushort(v) => {
        dst.put_u8(USHORT);
        dst.put_u16(*v);
      }
      Value::Uint(0) => dst.put_u8(UINT_0),
      Value::Uint(v) if *v <= u8::MAX as u32 => {
        dst.put_u8(SMALL_UINT);
        dst.put_u8(*v as u8);
      }
      Value::Uint(v) => {
        dst.put_u8(UINT);
        dst.put_u32(*v);
      }
      Value::Ulong(0) => dst.put_u8(ULONG_0),
      Value::Ulong(v) if *v <= u8::MAX as u64 => {
        dst.put_u8(SMALL_ULONG);
        dst.put_u8(*v as u8);
      }
      Value::Ulong(v) => {
        dst.put_u8(ULONG);
        dst.put_u64(*v);
      }
      Value::Byte(v) => {
        dst.put_u8(BYTE);
        dst.put_i8(*v);
      }
      Value::Short(v) => {
        dst.put_u8(SHORT);
        dst.put_i16(*v);
      }
      Value::Int(v) if i8::try_from(*v).is_ok() => {
        dst.put_u8(SMALL_INT);
        dst.put_i8(*v as i8);
      }
      Value::Int(v) => {
        dst.put_u8(INT);
        dst.put_i32(*v);
      }
      Value::Long(v) if i8::try_from(*v).is_ok() => {
        dst.put_u8(SMALL_LONG);
        dst.put_i8(*v as i8);
      }
      Value::Long(v) => {
        dst.put_u8(LONG);
        dst.put_i64(*v);
      }
      Value::Float(v) => {
        dst.put_u8(FLOAT);
        dst.put_f32(*v);
      }
      Value::Double(v) => {
        dst.put_u8(DOUBLE);
        dst.put_f64(*v);
      }
      Value::Char(c) => {
        dst.put_u8(CHAR);
        dst.put_u32(*c as u32);
      }
      Value::Timestamp(ms) => {
        dst.put_u8(TIMESTAMP);
        dst.put_i64(*ms);
      }
      Value::Uuid(bytes) => {
        dst.put_u8(UUID);
        dst.put_slice(bytes);
      }
      Value::Binary(b) => put_variable(dst, VBIN8, VBIN32, b),
      Value::String(s) => put_variable(dst, STR8, STR32, s.as_bytes()),
      Value::Symbol(s) => put_variable(dst, SYM8, SYM32, s.as_bytes()),
      Value::List(items) if items.is_empty() => dst.put_u8(LIST0),
      Value::List(items) => {
        let mut body = BytesMut::new();
        for item in items {
          item.encode(&mut body);
        }
        put_compound(dst, LIST8, LIST32, items.len(), &body);
      }
      Value::Map(pairs) => {
        let mut body = BytesMut::new();
        for (k, v) in pairs {
          k.encode(&mut body);
          v.encode(&mut body);
        }
        put_compound(dst, MAP8, MAP32, pairs.len() * 2, &body);
      }
      Value::Array(items) => encode_array(items, dst),
      Value::Described(descriptor, value) => {
        dst.put_u8(DESCRIBED);
        descriptor.encode(dst);
        value.encode(dst);
      }
    }
  }

  /// Decodes one value, constructor included, consuming it from `src`.
  ///
  /// Values nested deeper than [`MAX_NESTING_DEPTH`] are rejected with a decode error.
  pub fn decode(src: &mut Bytes) -> Result<Value, AmqpError> {
    decode_nested(src, 0)
  }

  /// Convenience wrapper that decodes a value from a standalone slice.
  pub fn decode_slice(data: &[u8]) -> Result<Value, AmqpError> {
    let mut src = Bytes::copy_from_slice(data);
    Value::decode(&mut src)
  }

  /// Size in bytes of the encoded form.
  pub fn encoded_len(&self) -> usize {
    let mut buf = BytesMut::new();
    self.encode(&mut buf);
    buf.len()
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<u32> for Value {
  fn from(v: u32) -> Self {
    Value::Uint(v)
  }
}

impl From<u64> for Value {
  fn from(v: u64) -> Self {
    Value::Ulong(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self {
    Value::Int(v)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Long(v)
  }
}

impl From<Bytes> for Value {
  fn from(b: Bytes) -> Self {
    Value::Binary(b)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map_or(Value::Null, Into::into)
  }
}

/// Maps the symbolic form of a descriptor onto its numeric code.
fn symbolic_descriptor(name: &str) -> Option<u64> {
  let code = match name {
    "amqp:open:list" => 0x10,
    "amqp:begin:list" => 0x11,
    "amqp:attach:list" => 0x12,
    "amqp:flow:list" => 0x13,
    "amqp:transfer:list" => 0x14,
    "amqp:disposition:list" => 0x15,
    "amqp:detach:list" => 0x16,
    "amqp:end:list" => 0x17,
    "amqp:close:list" => 0x18,
    "amqp:error:list" => 0x1d,
    "amqp:received:list" => 0x23,
    "amqp:accepted:list" => 0x24,
    "amqp:rejected:list" => 0x25,
    "amqp:released:list" => 0x26,
    "amqp:modified:list" => 0x27,
    "amqp:source:list" => 0x28,
    "amqp:target:list" => 0x29,
    "amqp:header:list" => 0x70,
    "amqp:delivery-annotations:map" => 0x71,
    "amqp:message-annotations:map" => 0x72,
    "amqp:properties:list" => 0x73,
    "amqp:application-properties:map" => 0x74,
    "amqp:data:binary" => 0x75,
    "amqp:amqp-sequence:list" => 0x76,
    "amqp:amqp-value:*" => 0x77,
    "amqp:footer:map" => 0x78,
    _ => return None,
  };
  Some(code)
}

fn need(src: &Bytes, n: usize, what: &'static str) -> Result<(), AmqpError> {
  if src.remaining() < n {
    return Err(AmqpError::decode(format!(
      "truncated {}: need {} bytes, have {}",
      what,
      n,
      src.remaining()
    )));
  }
  Ok(())
}

fn put_variable(dst: &mut BytesMut, short: u8, long: u8, data: &[u8]) {
  if data.len() <= u8::MAX as usize {
    dst.reserve(2 + data.len());
    dst.put_u8(short);
    dst.put_u8(data.len() as u8);
  } else {
    dst.reserve(5 + data.len());
    dst.put_u8(long);
    dst.put_u32(data.len() as u32);
  }
  dst.put_slice(data);
}

fn put_compound(dst: &mut BytesMut, short: u8, long: u8, count: usize, body: &[u8]) {
  // The size field counts the count field plus the body.
  if body.len() + 1 <= u8::MAX as usize && count <= u8::MAX as usize {
    dst.reserve(3 + body.len());
    dst.put_u8(short);
    dst.put_u8((body.len() + 1) as u8);
    dst.put_u8(count as u8);
  } else {
    dst.reserve(9 + body.len());
    dst.put_u8(long);
    dst.put_u32((body.len() + 4) as u32);
    dst.put_u32(count as u32);
  }
  dst.put_slice(body);
}

/// Constructor used for every element of an array whose first element is `v`.
fn array_constructor(v: &Value) -> Option<u8> {
  let code = match v {
    Value::Null => return None,
    Value::Bool(_) => BOOLEAN,
    Value::Ubyte(_) => UBYTE,
    Value::Ushort(_) => USHORT,
    Value::Uint(_) => UINT,
    Value::Ulong(_) => ULONG,
    Value::Byte(_) => BYTE,
    Value::Short(_) => SHORT,
    Value::Int(_) => INT,
    Value::Long(_) => LONG,
    Value::Float(_) => FLOAT,
    Value::Double(_) => DOUBLE,
    Value::Char(_) => CHAR,
    Value::Timestamp(_) => TIMESTAMP,
    Value::Uuid(_) => UUID,
    Value::Binary(_) => VBIN32,
    Value::String(_) => STR32,
    Value::Symbol(_) => SYM32,
    Value::List(_) => LIST32,
    Value::Map(_) => MAP32,
    Value::Array(_) => ARRAY32,
    Value::Described(..) => return None,
  };
  Some(code)
}

fn encode_array(items: &[Value], dst: &mut BytesMut) {
  let constructor = match items.first().map(array_constructor) {
    Some(Some(code)) => code,
    // Empty arrays still need an element constructor; null is the conventional choice.
    None => NULL,
    Some(None) => {
      Value::List(items.to_vec()).encode(dst);
      return;
    }
  };
  if items.iter().any(|v| array_constructor(v) != Some(constructor)) {
    // Heterogeneous arrays cannot be expressed on the wire, fall back to a list.
    Value::List(items.to_vec()).encode(dst);
    return;
  }

  let mut body = BytesMut::new();
  body.put_u8(constructor);
  for item in items {
    encode_element_body(item, &mut body);
  }
  // Array size/count fields are as for compound types, element constructor included in the body.
  put_compound(dst, ARRAY8, ARRAY32, items.len(), &body);
}

/// Writes the element payload using the full-width form of its constructor (no constructor byte).
fn encode_element_body(v: &Value, dst: &mut BytesMut) {
  match v {
    Value::Null => {}
    Value::Bool(b) => dst.put_u8(*b as u8),
    Value::Ubyte(x) => dst.put_u8(*x),
    Value::Ushort(x) => dst.put_u16(*x),
    Value::Uint(x) => dst.put_u32(*x),
    Value::Ulong(x) => dst.put_u64(*x),
    Value::Byte(x) => dst.put_i8(*x),
    Value::Short(x) => dst.put_i16(*x),
    Value::Int(x) => dst.put_i32(*x),
    Value::Long(x) => dst.put_i64(*x),
    Value::Float(x) => dst.put_f32(*x),
    Value::Double(x) => dst.put_f64(*x),
    Value::Char(c) => dst.put_u32(*c as u32),
    Value::Timestamp(x) => dst.put_i64(*x),
    Value::Uuid(b) => dst.put_slice(b),
    Value::Binary(b) => {
      dst.put_u32(b.len() as u32);
      dst.put_slice(b);
    }
    Value::String(s) | Value::Symbol(s) => {
      dst.put_u32(s.len() as u32);
      dst.put_slice(s.as_bytes());
    }
    Value::List(_) | Value::Map(_) | Value::Array(_) => {
      // Re-use the full encoder, then strip the constructor and widen to the 32-bit form.
      let mut tmp = BytesMut::new();
      v.encode(&mut tmp);
      let mut encoded = tmp.freeze();
      let code = encoded.get_u8();
      let (size, count) = match code {
        LIST0 => (0usize, 0usize),
        LIST8 | MAP8 | ARRAY8 => {
          let size = encoded.get_u8() as usize - 1;
          let count = encoded.get_u8() as usize;
          (size, count)
        }
        _ => {
          let size = encoded.get_u32() as usize - 4;
          let count = encoded.get_u32() as usize;
          (size, count)
        }
      };
      dst.put_u32((size + 4) as u32);
      dst.put_u32(count as u32);
      dst.put_slice(&encoded[..size]);
    }
    Value::Described(..) => {}
  }
}

fn decode_nested(src: &mut Bytes, depth: usize) -> Result<Value, AmqpError> {
  if depth > MAX_NESTING_DEPTH {
    return Err(AmqpError::decode("nesting too deep"));
  }
  need(src, 1, "constructor")?;
  let code = src.get_u8();
  if code == DESCRIBED {
    let descriptor = decode_nested(src, depth + 1)?;
    let value = decode_nested(src, depth + 1)?;
    return Ok(Value::Described(Box::new(descriptor), Box::new(value)));
  }
  decode_body(code, src, depth)
}

fn decode_body(code: u8, src: &mut Bytes, depth: usize) -> Result<Value, AmqpError> {
  let value = match code {
    NULL => Value::Null,
    TRUE => Value::Bool(true),
    FALSE => Value::Bool(false),
    BOOLEAN => {
      need(src, 1, "boolean")?;
      Value::Bool(src.get_u8() != 0)
    }
    UBYTE => {
      need(src, 1, "ubyte")?;
      Value::Ubyte(src.get_u8())
    }
    USHORT => {
      need(src, 2, "ushort")?;
      Value::Ushort(src.get_u16())
    }
    UINT => {
      need(src, 4, "uint")?;
      Value::Uint(src.get_u32())
    }
    SMALL_UINT => {
      need(src, 1, "smalluint")?;
      Value::Uint(src.get_u8() as u32)
    }
    UINT_0 => Value::Uint(0),
    ULONG => {
      need(src, 8, "ulong")?;
      Value::Ulong(src.get_u64())
    }
    SMALL_ULONG => {
      need(src, 1, "smallulong")?;
      Value::Ulong(src.get_u8() as u64)
    }
    ULONG_0 => Value::Ulong(0),
    BYTE => {
      need(src, 1, "byte")?;
      Value::Byte(src.get_i8())
    }
    SHORT => {
      need(src, 2, "short")?;
      Value::Short(src.get_i16())
    }
    INT => {
      need(src, 4, "int")?;
      Value::Int(src.get_i32())
    }
    SMALL_INT => {
      need(src, 1, "smallint")?;
      Value::Int(src.get_i8() as i32)
    }
    LONG => {
      need(src, 8, "long")?;
      Value::Long(src.get_i64())
    }
    SMALL_LONG => {
      need(src, 1, "smalllong")?;
      Value::Long(src.get_i8() as i64)
    }
    FLOAT => {
      need(src, 4, "float")?;
      Value::Float(src.get_f32())
    }
    DOUBLE => {
      need(src, 8, "double")?;
      Value::Double(src.get_f64())
    }
    CHAR => {
      need(src, 4, "char")?;
      let raw = src.get_u32();
      Value::Char(char::from_u32(raw).ok_or_else(|| AmqpError::decode(format!("invalid char {:#x}", raw)))?)
    }
    TIMESTAMP => {
      need(src, 8, "timestamp")?;
      Value::Timestamp(src.get_i64())
    }
    UUID => {
      need(src, 16, "uuid")?;
      let mut bytes = [0u8; 16];
      src.copy_to_slice(&mut bytes);
      Value::Uuid(bytes)
    }
    VBIN8 | VBIN32 => Value::Binary(take_variable(code == VBIN32, src, "binary")?),
    STR8 | STR32 => Value::String(take_utf8(code == STR32, src, "string")?),
    SYM8 | SYM32 => Value::Symbol(take_utf8(code == SYM32, src, "symbol")?),
    LIST0 => Value::List(Vec::new()),
    LIST8 | LIST32 => {
      let (mut body, count) = take_compound(code == LIST32, src, "list")?;
      let mut items = Vec::with_capacity(count.min(256));
      for _ in 0..count {
        items.push(decode_nested(&mut body, depth + 1)?);
      }
      Value::List(items)
    }
    MAP8 | MAP32 => {
      let (mut body, count) = take_compound(code == MAP32, src, "map")?;
      if count % 2 != 0 {
        return Err(AmqpError::decode(format!("map with odd element count {}", count)));
      }
      let mut pairs = Vec::with_capacity((count / 2).min(256));
      for _ in 0..count / 2 {
        let k = decode_nested(&mut body, depth + 1)?;
        let v = decode_nested(&mut body, depth + 1)?;
        pairs.push((k, v));
      }
      Value::Map(pairs)
    }
    ARRAY8 | ARRAY32 => {
      let (mut body, count) = take_compound(code == ARRAY32, src, "array")?;
      need(&body, 1, "array constructor")?;
      let mut element_code = body.get_u8();
      let mut descriptor = None;
      if element_code == DESCRIBED {
        descriptor = Some(decode_nested(&mut body, depth + 1)?);
        need(&body, 1, "array constructor")?;
        element_code = body.get_u8();
      }
      // Bounds the count by the body. Arrays of zero-width elements are not accepted.
      if count > body.remaining() {
        return Err(AmqpError::decode(format!(
          "array count {} exceeds its {} remaining bytes",
          count,
          body.remaining()
        )));
      }
      let mut items = Vec::with_capacity(count.min(256));
      for _ in 0..count {
        let item = decode_body(element_code, &mut body, depth + 1)?;
        items.push(match &descriptor {
          Some(d) => Value::Described(Box::new(d.clone()), Box::new(item)),
          None => item,
        });
      }
      Value::Array(items)
    }
    other => {
      return Err(AmqpError::decode(format!("unknown type constructor {:#04x}", other)));
    }
  };
  Ok(value)
}

fn take_len(wide: bool, src: &mut Bytes, what: &'static str) -> Result<usize, AmqpError> {
  if wide {
    need(src, 4, what)?;
    Ok(src.get_u32() as usize)
  } else {
    need(src, 1, what)?;
    Ok(src.get_u8() as usize)
  }
}

fn take_variable(wide: bool, src: &mut Bytes, what: &'static str) -> Result<Bytes, AmqpError> {
  let len = take_len(wide, src, what)?;
  need(src, len, what)?;
  Ok(src.split_to(len))
}

fn take_utf8(wide: bool, src: &mut Bytes, what: &'static str) -> Result<String, AmqpError> {
  let raw = take_variable(wide, src, what)?;
  String::from_utf8(raw.to_vec()).map_err(|e| AmqpError::decode(format!("invalid utf-8 in {}: {}", what, e)))
}

/// Splits off the body of a compound value and returns it with its element count.
fn take_compound(wide: bool, src: &mut Bytes, what: &'static str) -> Result<(Bytes, usize), AmqpError> {
  let size = take_len(wide, src, what)?;
  let count_width = if wide { 4 } else { 1 };
  if size < count_width {
    return Err(AmqpError::decode(format!("{} size {} smaller than its count field", what, size)));
  }
  need(src, size, what)?;
  let mut body = src.split_to(size);
  let count = if wide { body.get_u32() as usize } else { body.get_u8() as usize };
  Ok((body, count))
}

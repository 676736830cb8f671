//! AMQP 1.0 wire codecs and the driver that applies decoded frames to a [`Connection`](crate::Connection).

pub mod amqp;
pub(crate) mod driver;

pub(crate) use driver::ProtocolDriver;

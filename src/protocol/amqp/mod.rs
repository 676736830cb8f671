pub mod codec;
pub mod header;
pub mod performative;
pub mod types;

pub use codec::{Frame, FrameBody, FrameCodec};
pub use header::{ProtocolHeader, HEADER_LENGTH};
pub use performative::{DeliveryState, ErrorCondition, Performative, Role, Terminus};
pub use types::Value;

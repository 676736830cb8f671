//! Message-related types (`Message`, `Body`, `Header`, `Properties`) and their section codec.

mod msg;
mod section;

pub use msg::{Body, Header, Message, Properties};

//! RPC dispatch (C5): wire message shapes, authorization tiers, and the
//! handler trait every endpoint implements.

pub mod auth;
pub mod dispatcher;
pub mod handler;
pub mod message;
pub mod requests;

pub use auth::{AuthTier, Identity};
pub use dispatcher::Dispatcher;
pub use handler::RpcHandler;
pub use message::{ForwardingDescriptor, MessageHeader, MsgType, FORWARD_NONE};

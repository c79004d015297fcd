//! Broadcast Module
//!
//! Wire protocol and the subscriber registry that pushes round state
//! and scores to every connected client.

mod gateway;
pub mod protocol;

pub use gateway::{ConnectionId, Gateway};
pub use protocol::{ClientEvent, ServerEvent};

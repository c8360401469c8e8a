//! WebSocket transport: the upgrade endpoint, the per-connection actor and
//! inbound event dispatch.

pub mod actor;
pub mod handler;
pub mod protocol;

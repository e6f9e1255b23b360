//! Host command protocol
//!
//! Request/response handling for the packet transport. Packet framing lives
//! in the transport; this module only interprets command ids and payloads.

pub mod dispatcher;

pub use dispatcher::{CommandDispatcher, DispatchError};

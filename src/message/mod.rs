//! Wire messages: client-to-server frame builders and the
//! server-to-client parser.

pub mod client;
pub mod server;

pub use client::ButtonMask;
pub use server::{ServerMessage, ServerMessageDecoder};

//! HTTP front end for the single chat surface.
//!
//! [`TransportBridge`] turns each `POST /agent` into a queued, correlated
//! chat turn and relays its status events as Server-Sent Events until the
//! turn completes, fails or the completion wait runs out.

pub mod config;
pub mod errors;
pub mod server;
pub mod transport;
pub mod wire;

pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use server::{router, serve};
pub use transport::{EventReceiver, TransportBridge};
pub use wire::{AgentRequest, AgentRequestBody, BridgeEvent, RequestMode};

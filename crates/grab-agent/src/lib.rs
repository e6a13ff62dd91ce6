//! Agent side of the grab bridge: the session loop that drives a model
//! through tool calls, the correlation-keyed event bus and request queue
//! that tie it to external requests, and the built-in workspace tools.

pub mod attachments;
pub mod capabilities;
pub mod config;
pub mod edit;
pub mod errors;
pub mod events;
pub mod host;
pub mod marker;
mod patch;
pub mod participant;
pub mod prompts;
pub mod queue;
pub mod session;
pub mod sink;
pub mod tools;
pub mod truncation;
pub mod workspace;

pub use attachments::*;
pub use capabilities::*;
pub use config::*;
pub use errors::*;
pub use events::*;
pub use host::*;
pub use marker::{extract_request_id, format_marker};
pub use participant::*;
pub use prompts::*;
pub use queue::*;
pub use session::*;
pub use sink::*;
pub use tools::*;
pub use truncation::*;
pub use workspace::*;

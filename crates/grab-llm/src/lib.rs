//! Model-provider contract for the grab agent bridge.
//!
//! The session loop only ever talks to a [`ModelProvider`]: it sends a
//! [`TurnRequest`] and consumes the resulting [`FragmentStream`]. Providers
//! advertise what they accept through [`ModelCapabilities`].

pub mod client;
pub mod errors;
pub mod openai_compat;
pub mod provider;
pub mod stream;
pub mod types;
pub mod utils;

pub use client::Client;
pub use errors::{ConfigurationError, SDKError};
pub use openai_compat::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use provider::ModelProvider;
pub use stream::{FragmentStream, StreamFragment, fragment_stream};
pub use types::*;
pub use utils::accumulator::FragmentAccumulator;

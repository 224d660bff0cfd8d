//! The cloud backend: chat-completion requests forwarded to a hosted LLM
//! service reachable over HTTPS, with reasoning-family model handling and
//! local token accounting.

pub mod service;
pub mod stream;
pub mod translate;

pub use service::{CloudGatewayState, PASSTHROUGH_PREFIX, SharedCloudState, handle};

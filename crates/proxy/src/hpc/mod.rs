//! The HPC backend: requests forwarded over a persistent multiplexed
//! remote-shell transport to a single compute head node.

pub mod service;
pub mod stream;
pub mod translate;

pub use service::{HpcGatewayState, PASSTHROUGH_PREFIX, SharedHpcState, handle};

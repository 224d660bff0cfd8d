//! Shared primitives used by both the cloud and HPC gateway crates: env-var
//! loading, secrets, and logging setup.

pub mod env;
pub mod secrets;
pub mod telemetry;

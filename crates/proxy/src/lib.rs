//! Core proxy logic shared by the cloud and HPC gateway binaries: header
//! extraction, the inference audit record, token accounting, and the
//! request-translation/streaming pipeline for each backend.

pub mod audit;
pub mod cloud;
pub mod error;
pub mod hpc;
pub mod http;
pub mod registry;
pub mod tokens;

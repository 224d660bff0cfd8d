pub mod cloud;
pub mod hpc;

//! Core kernel for Strata.
//!
//! Loads configuration, boots the memory substrate (validating and repairing
//! every document), runs the automatic backup loop and shuts down cleanly.

pub mod background;
pub mod config;
pub mod error;
pub mod kernel;
pub mod supervisor;

pub use kernel::StrataKernel;

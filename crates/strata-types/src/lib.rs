//! Core types for the Strata agent persistence layer.
//!
//! This crate defines the shared data structures used by the document store,
//! the memory ledger, the hierarchy registry and the kernel. It contains no
//! I/O and no business logic beyond small helpers on the types themselves.

pub mod agent;
pub mod backup;
pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod validation;

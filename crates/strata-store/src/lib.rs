//! Durable document storage for the Strata agent persistence layer.
//!
//! - **DocumentStore**: one JSON file per [`DocumentKind`], atomic replace,
//!   deep-merge update, list append/remove and linear search, serialized per
//!   document by an in-process mutex plus a leased cross-process lock file.
//! - **SchemaValidator**: structural and referential checks with repair.
//! - **SnapshotManager**: named full-store snapshots with an index,
//!   retention and verification.
//!
//! [`DocumentKind`]: strata_types::document::DocumentKind

pub mod lock;
pub mod merge;
pub mod snapshot;
pub mod store;
pub mod validator;

pub use snapshot::SnapshotManager;
pub use store::DocumentStore;
pub use validator::SchemaValidator;

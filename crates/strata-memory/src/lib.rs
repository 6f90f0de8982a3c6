//! Domain layers over the Strata document store.
//!
//! - **MemoryLedger**: typed per-agent memories with importance scoring,
//!   access bookkeeping and capacity-triggered eviction of interactions.
//! - **HierarchyRegistry**: the forest of superior/subordinate agents and
//!   task delegation records.
//! - **MemorySubstrate**: opens the store, validates every document, and
//!   hands out the components above.

pub mod hierarchy;
pub mod ledger;

mod substrate;
pub use substrate::MemorySubstrate;

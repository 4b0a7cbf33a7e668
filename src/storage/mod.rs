//! Store Host Module
//!
//! The per-node record stores the access layer talks to.
//!
//! ## Core Concepts
//! - **LocalStore**: One node's table, keyed by record id, with insert-if-absent,
//!   idempotent upsert, owner-guarded update/delete and predicate scans.
//! - **StoreHost**: A process hosting several named stores behind one credential pair.
//! - **Pushdown**: Scans evaluate a `NodePredicate` locally and return only the
//!   columns named by a `Projection`.
//! - **Bindings**: The host answers both per-store REST calls and named procedures
//!   (see `protocol`).

pub mod handlers;
pub mod memory;
pub mod protocol;
pub mod types;

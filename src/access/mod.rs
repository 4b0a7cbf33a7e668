//! Access Layer Module
//!
//! Everything between a caller and the partition stores.
//!
//! ## Core Concepts
//! - **Connections**: `Connector` opens one short-lived `Connection` per unit of
//!   work; `with_connection` releases it on every exit path.
//! - **Scatter-gather**: Reads fan out to every target partition in parallel and
//!   merge by concatenation. A failed node shrinks the result instead of failing it.
//! - **Writes**: Go to the owning partition only. Inserts are then replicated to the
//!   other partitions in the background, at most once, without retry.
//! - **Filters**: `FilterSet` compiles into a per-node predicate and projection; the
//!   top-percentile filter adds a threshold pass first.
//!
//! `RecordService` is the surface that ties these together.

pub mod connection;
pub mod http;
pub mod memory;
pub mod predicate;
pub mod replication;
pub mod scatter;
pub mod service;

#[cfg(test)]
mod tests;

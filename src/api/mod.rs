//! Record Gateway Module
//!
//! JSON-over-HTTP surface for `RecordService`. Maps caller errors to 4xx codes and
//! reports partial reads as `200` with `complete: false`.

pub mod handlers;
pub mod types;

//! Sort/Search Engine
//!
//! Local algorithms applied to gathered result sets: a stable merge sort over any
//! key and a binary search that relies on input already sorted by the same key.

pub mod search;
pub mod sort;

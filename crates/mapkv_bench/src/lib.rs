//! Shared helpers for the MapKV benchmarks.

pub mod utils;

//! # Catchment Parallel
//!
//! Parallel execution strategies for per-outlet work.
//!
//! With the `parallel` feature (default) work is spread over a rayon pool;
//! without it every mode runs sequentially, which keeps WASM and other
//! single-threaded targets building.

pub mod strategy;

pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};

//! Producer-side state: the flow-control window and the producer kernel
//! that gates sends on it (spec.md §3 "Producer", §4.4).

pub mod kernel;
pub mod memory_usage;

pub use kernel::ProducerKernel;

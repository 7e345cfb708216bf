//! Connection-level state: the kernel that owns a negotiated transport
//! stack, and the transaction table it delegates to (spec.md §3
//! "Connection", "Transaction state").

pub mod kernel;
pub mod transaction_table;

pub use kernel::{ConnectionKernel, ConsumerSink, ProducerSink};

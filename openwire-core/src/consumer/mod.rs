//! Consumer-side state: the dispatch channel every consumer reads from, the
//! consumer kernel that applies acknowledgement policy, and the queue
//! browser specialization built on top of it (spec.md §3 "Consumer",
//! §4.4, §4.9).

pub mod dispatch_channel;
pub mod kernel;
pub mod queue_browser;

pub use kernel::{ConsumerKernel, ConsumerOptions};
pub use queue_browser::QueueBrowser;

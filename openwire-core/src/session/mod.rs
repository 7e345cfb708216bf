//! Session-level state: the kernel that owns producers/consumers created on
//! one session and assembles outbound wire `Message`s (spec.md §3
//! "Session", §4.4).

pub mod kernel;

pub use kernel::SessionKernel;

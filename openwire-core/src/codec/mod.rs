//! Wire-level codec: frames, modified UTF-8, and loose/tight marshaling.

pub mod frame;
pub mod marshal;
pub mod modified_utf8;

pub use frame::Frame;

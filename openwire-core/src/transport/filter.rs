//! The `Transport` trait and filter pipeline (spec.md §5.2 "Transport filter
//! stack"). Grounded on `activemq-cpp/src/main/activemq/transport/{Transport,
//! TransportFilter}.h`: a transport sends commands `oneway` (fire and forget)
//! or via request/response, and hands incoming commands and exceptions to
//! whoever installed itself as the listener. Each filter wraps exactly one
//! inner transport and adds one concern, so the full stack is built by
//! nesting: `ResponseCorrelator(MutexFilter(InactivityMonitor(
//! WireFormatNegotiator(AsyncSend?(IoTransport))))))`.

use crate::command::Command;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::envelope::CommandEnvelope;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives commands and exceptions pushed asynchronously by a transport,
/// i.e. anything that was not a direct reply to a `request()` call:
/// broker-initiated dispatch, control commands, and terminal errors.
#[async_trait]
pub trait TransportListener: Send + Sync {
    async fn on_command(&self, command: Command);
    async fn on_exception(&self, error: OpenWireError);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `envelope` without waiting for a broker response.
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()>;

    /// Sends `envelope` and waits for the correlated `Response`/
    /// `ExceptionResponse`. Only meaningful above a `ResponseCorrelator`.
    async fn request(&self, envelope: CommandEnvelope) -> OpenWireResult<Command>;

    async fn start(&self) -> OpenWireResult<()>;
    async fn stop(&self) -> OpenWireResult<()>;

    fn set_listener(&self, listener: Arc<dyn TransportListener>);
}

//! Wire-format handshake (spec.md §5.1 "Handshake"). Grounded on
//! `activemq-cpp/src/main/activemq/transport/WireFormatNegotiator.cpp`: each
//! side sends its own `WireFormatInfo` as soon as the transport starts, and
//! waits for the peer's before letting any other command through.

use crate::command::control::WireFormatInfo;
use crate::command::Command;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::envelope::CommandEnvelope;
use crate::transport::filter::{Transport, TransportListener};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};

pub struct WireFormatNegotiator<T: Transport> {
    inner: Arc<T>,
    local: WireFormatInfo,
    negotiated: StdMutex<Option<WireFormatInfo>>,
    negotiated_notify: Notify,
    outer_listener: StdMutex<Option<Arc<dyn TransportListener>>>,
}

impl<T: Transport + 'static> WireFormatNegotiator<T> {
    pub fn new(inner: Arc<T>, local: WireFormatInfo) -> Arc<Self> {
        Arc::new(Self {
            inner,
            local,
            negotiated: StdMutex::new(None),
            negotiated_notify: Notify::new(),
            outer_listener: StdMutex::new(None),
        })
    }

    /// Blocks until the peer's `WireFormatInfo` has been received, or the
    /// handshake timeout elapses (spec.md §5.1 invariant: no other command
    /// may be processed before this completes).
    pub async fn wait_for_negotiation(&self, handshake_timeout: Duration) -> OpenWireResult<WireFormatInfo> {
        loop {
            if let Some(info) = self.negotiated.lock().unwrap().clone() {
                return Ok(info);
            }
            timeout(handshake_timeout, self.negotiated_notify.notified())
                .await
                .map_err(|_| OpenWireError::transport("wire format handshake timed out"))?;
        }
    }

    fn effective_version(&self, remote: &WireFormatInfo) -> i32 {
        self.local.version.min(remote.version)
    }

    /// Tight encoding only takes effect when both sides request it (spec.md
    /// §4.1); a peer advertising it alone must not flip this side over.
    fn effective_tight_encoding(&self, remote: &WireFormatInfo) -> bool {
        self.local.tight_encoding_enabled && remote.tight_encoding_enabled
    }

    /// Installs self as the inner transport's listener so the handshake can
    /// intercept the peer's `WireFormatInfo` before anything above sees it.
    /// Call once, before `start()`.
    pub fn install(self: &Arc<Self>) {
        self.inner.clone().set_listener(self.clone());
    }
}

#[async_trait]
impl<T: Transport + 'static> TransportListener for WireFormatNegotiator<T> {
    async fn on_command(&self, command: Command) {
        if let Command::WireFormatInfo(remote) = &command {
            let mut negotiated = remote.clone();
            negotiated.version = self.effective_version(remote);
            negotiated.tight_encoding_enabled = self.effective_tight_encoding(remote);
            *self.negotiated.lock().unwrap() = Some(negotiated);
            self.negotiated_notify.notify_waiters();
            return;
        }
        let listener = self.outer_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_command(command).await;
        }
    }

    async fn on_exception(&self, error: OpenWireError) {
        let listener = self.outer_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_exception(error).await;
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> Transport for WireFormatNegotiator<T> {
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
        self.inner.oneway(envelope).await
    }

    async fn request(&self, envelope: CommandEnvelope) -> OpenWireResult<Command> {
        self.inner.request(envelope).await
    }

    async fn start(&self) -> OpenWireResult<()> {
        self.inner.start().await?;
        self.inner
            .oneway(CommandEnvelope::oneway(
                0,
                Command::WireFormatInfo(self.local.clone()),
            ))
            .await
    }

    async fn stop(&self) -> OpenWireResult<()> {
        self.inner.stop().await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.outer_listener.lock().unwrap() = Some(listener);
    }
}

//! Serializes `oneway`/`request` calls onto the inner transport one at a
//! time (spec.md §5.2 "MutexFilter"), mirroring
//! `activemq-cpp/src/main/activemq/transport/mutex/MutexTransport.cpp`. Keeps
//! concurrent session/consumer/producer kernels on the same connection from
//! interleaving partially-written frames on the wire.

use crate::command::Command;
use crate::error::OpenWireResult;
use crate::transport::envelope::CommandEnvelope;
use crate::transport::filter::{Transport, TransportListener};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct MutexFilter<T: Transport> {
    inner: Arc<T>,
    send_lock: Mutex<()>,
}

impl<T: Transport> MutexFilter<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self {
            inner,
            send_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> Transport for MutexFilter<T> {
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
        let _guard = self.send_lock.lock().await;
        self.inner.oneway(envelope).await
    }

    async fn request(&self, envelope: CommandEnvelope) -> OpenWireResult<Command> {
        let _guard = self.send_lock.lock().await;
        self.inner.request(envelope).await
    }

    async fn start(&self) -> OpenWireResult<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> OpenWireResult<()> {
        self.inner.stop().await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.inner.set_listener(listener);
    }
}

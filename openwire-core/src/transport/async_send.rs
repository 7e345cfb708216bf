//! Optional filter that queues `oneway` sends onto a background task instead
//! of writing inline (spec.md §5.2 "AsyncSend", only present when a producer
//! or consumer has `dispatchAsync` set). Grounded on
//! `activemq-cpp/src/main/activemq/util/CompositeTaskRunner.cpp`'s
//! worker-queue shape, adapted to a bounded `tokio::mpsc` channel instead of
//! a condition-variable-guarded queue.

use crate::command::Command;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::envelope::CommandEnvelope;
use crate::transport::filter::{Transport, TransportListener};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 1024;

pub struct AsyncSend<T: Transport> {
    inner: Arc<T>,
    queue: mpsc::Sender<CommandEnvelope>,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> AsyncSend<T> {
    pub fn new(inner: Arc<T>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<CommandEnvelope>(QUEUE_CAPACITY);
        let worker_inner = inner.clone();
        let worker = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if worker_inner.oneway(envelope).await.is_err() {
                    break;
                }
            }
        });
        Arc::new(Self {
            inner,
            queue: tx,
            worker: AsyncMutex::new(Some(worker)),
        })
    }
}

#[async_trait]
impl<T: Transport + 'static> Transport for AsyncSend<T> {
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
        self.queue
            .send(envelope)
            .await
            .map_err(|_| OpenWireError::Closed { first_fault: None })
    }

    async fn request(&self, envelope: CommandEnvelope) -> OpenWireResult<Command> {
        // Requests need their response, so they bypass the fire-and-forget
        // queue and go straight to the inner transport.
        self.inner.request(envelope).await
    }

    async fn start(&self) -> OpenWireResult<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> OpenWireResult<()> {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.abort();
        }
        self.inner.stop().await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.inner.set_listener(listener);
    }
}

//! Correlates outgoing requests with their `Response`/`ExceptionResponse`
//! (spec.md §4.2, §5.2). Grounded on
//! `activemq-cpp/src/main/activemq/transport/correlator/ResponseCorrelator.cpp`:
//! assign each request a fresh `commandId`, remember a waiter for it, forward
//! everything else (dispatch, control commands) straight to the installed
//! listener.

use crate::command::control::{BrokerError, ExceptionResponse};
use crate::command::Command;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::envelope::CommandEnvelope;
use crate::transport::filter::{Transport, TransportListener};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<Command, BrokerError>>;

pub struct ResponseCorrelator<T: Transport> {
    inner: Arc<T>,
    next_id: AtomicI32,
    pending: StdMutex<HashMap<i32, Waiter>>,
    outer_listener: StdMutex<Option<Arc<dyn TransportListener>>>,
}

impl<T: Transport + 'static> ResponseCorrelator<T> {
    pub fn new(inner: Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            next_id: AtomicI32::new(1),
            pending: StdMutex::new(HashMap::new()),
            outer_listener: StdMutex::new(None),
        })
    }

    pub fn next_command_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Installs self as the inner transport's listener so responses can be
    /// intercepted before anything else sees them. Must be called once,
    /// before `start()`.
    pub fn install(self: &Arc<Self>) {
        self.inner.clone().set_listener(self.clone());
    }
}

#[async_trait]
impl<T: Transport + 'static> TransportListener for ResponseCorrelator<T> {
    async fn on_command(&self, command: Command) {
        let correlation_id = match &command {
            Command::Response(r) => Some((r.correlation_id, Ok(command.clone()))),
            Command::ExceptionResponse(ExceptionResponse {
                correlation_id,
                exception,
            }) => Some((*correlation_id, Err(exception.clone()))),
            _ => None,
        };
        if let Some((id, result)) = correlation_id {
            let waiter = self.pending.lock().unwrap().remove(&id);
            if let Some(waiter) = waiter {
                let _ = waiter.send(result);
                return;
            }
        }
        let listener = self.outer_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_command(command).await;
        }
    }

    async fn on_exception(&self, error: OpenWireError) {
        // A transport-level failure means every pending request will never
        // get its response; fail them all rather than let them hang.
        let waiters: Vec<Waiter> = self.pending.lock().unwrap().drain().map(|(_, w)| w).collect();
        for waiter in waiters {
            let _ = waiter.send(Err(BrokerError {
                exception_class: "TransportError".to_string(),
                message: error.to_string(),
                stack_trace: None,
                cause: None,
            }));
        }
        let listener = self.outer_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_exception(error).await;
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> Transport for ResponseCorrelator<T> {
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
        self.inner.oneway(envelope).await
    }

    async fn request(&self, mut envelope: CommandEnvelope) -> OpenWireResult<Command> {
        envelope.response_required = true;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(envelope.command_id, tx);
        if let Err(err) = self.inner.oneway(envelope.clone()).await {
            self.pending.lock().unwrap().remove(&envelope.command_id);
            return Err(err);
        }
        match rx.await {
            Ok(Ok(command)) => Ok(command),
            Ok(Err(broker_error)) => Err(OpenWireError::Broker {
                message: broker_error.message,
                server_stack_trace: broker_error.stack_trace,
            }),
            Err(_) => Err(OpenWireError::transport(
                "response waiter dropped before a reply arrived",
            )),
        }
    }

    async fn start(&self) -> OpenWireResult<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> OpenWireResult<()> {
        self.inner.stop().await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.outer_listener.lock().unwrap() = Some(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::control::{KeepAliveInfo, Response};
    use std::sync::atomic::AtomicUsize;

    struct FakeInner {
        sent: StdMutex<Vec<CommandEnvelope>>,
        listener: StdMutex<Option<Arc<dyn TransportListener>>>,
    }

    #[async_trait]
    impl Transport for FakeInner {
        async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        }
        async fn request(&self, _envelope: CommandEnvelope) -> OpenWireResult<Command> {
            unreachable!("FakeInner never receives request() directly")
        }
        async fn start(&self) -> OpenWireResult<()> {
            Ok(())
        }
        async fn stop(&self) -> OpenWireResult<()> {
            Ok(())
        }
        fn set_listener(&self, listener: Arc<dyn TransportListener>) {
            *self.listener.lock().unwrap() = Some(listener);
        }
    }

    struct CountingListener(AtomicUsize);

    #[async_trait]
    impl TransportListener for CountingListener {
        async fn on_command(&self, _command: Command) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_exception(&self, _error: OpenWireError) {}
    }

    #[tokio::test]
    async fn request_completes_when_matching_response_arrives() {
        let inner = Arc::new(FakeInner {
            sent: StdMutex::new(Vec::new()),
            listener: StdMutex::new(None),
        });
        let correlator = ResponseCorrelator::new(inner.clone());
        correlator.install();

        let id = correlator.next_command_id();
        let envelope = CommandEnvelope::request(
            id,
            Command::KeepAliveInfo(KeepAliveInfo { response_required: true }),
        );
        let correlator_for_task = correlator.clone();
        let handle = tokio::spawn(async move { correlator_for_task.request(envelope).await });

        // give the request a beat to register its waiter
        tokio::task::yield_now().await;
        let listener = inner.listener.lock().unwrap().clone().unwrap();
        listener
            .on_command(Command::Response(Response { correlation_id: id }))
            .await;

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unrelated_commands_are_forwarded_to_outer_listener() {
        let inner = Arc::new(FakeInner {
            sent: StdMutex::new(Vec::new()),
            listener: StdMutex::new(None),
        });
        let correlator = ResponseCorrelator::new(inner.clone());
        correlator.install();
        let counter = Arc::new(CountingListener(AtomicUsize::new(0)));
        correlator.set_listener(counter.clone());

        let listener = inner.listener.lock().unwrap().clone().unwrap();
        listener
            .on_command(Command::KeepAliveInfo(KeepAliveInfo { response_required: false }))
            .await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}

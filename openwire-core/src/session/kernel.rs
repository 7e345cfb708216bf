//! Session kernel (spec.md §4.4 "Session kernel"). Grounded on
//! `activemq-cpp/src/main/activemq/core/kernels/ActiveMQSessionKernel.cpp`:
//! a session owns an acknowledgement mode, the transaction id current
//! producers/consumers should tag their traffic with, and the registries of
//! producers and consumers it created. Message construction (assigning the
//! `MessageId`, timestamp, expiration) happens here rather than in the
//! producer, matching the original's `send()` split between
//! `ActiveMQProducerKernel` (destination resolution, flow control) and
//! `ActiveMQSessionKernel` (wire `Message` assembly).

use crate::command::destination::Destination;
use crate::command::ids::{ConnectionId, ConsumerId, MessageId, ProducerId, SessionId};
use crate::command::info::{AckMode, ConsumerInfo, ProducerInfo};
use crate::command::message::{AckType, DeliveryMode, Message, MessageBody};
use crate::command::transaction::TransactionId;
use crate::command::Command;
use crate::connection::kernel::{ConnectionKernel, ConsumerSink, ProducerSink};
use crate::consumer::kernel::{ConsumerKernel, ConsumerOptions};
use crate::error::{OpenWireError, OpenWireResult};
use crate::producer::kernel::ProducerKernel;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

struct Inner {
    session_id: SessionId,
    connection: ConnectionKernel,
    ack_mode: AckMode,
    transaction_id: Mutex<Option<TransactionId>>,
    next_producer_value: AtomicU64,
    next_consumer_value: AtomicU64,
    producers: Mutex<HashMap<ProducerId, Arc<ProducerKernel>>>,
    consumers: Mutex<HashMap<ConsumerId, Arc<ConsumerKernel>>>,
}

#[derive(Clone)]
pub struct SessionKernel(Arc<Inner>);

impl SessionKernel {
    pub(crate) fn new(session_id: SessionId, connection: ConnectionKernel, ack_mode: AckMode) -> Self {
        Self(Arc::new(Inner {
            session_id,
            connection,
            ack_mode,
            transaction_id: Mutex::new(None),
            next_producer_value: AtomicU64::new(1),
            next_consumer_value: AtomicU64::new(1),
            producers: Mutex::new(HashMap::new()),
            consumers: Mutex::new(HashMap::new()),
        }))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.0.session_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.0.session_id.connection_id
    }

    pub fn connection(&self) -> &ConnectionKernel {
        &self.0.connection
    }

    pub fn ack_mode(&self) -> AckMode {
        self.0.ack_mode
    }

    pub fn is_transacted(&self) -> bool {
        self.0.ack_mode == AckMode::SessionTransacted
    }

    pub async fn current_transaction_id(&self) -> Option<TransactionId> {
        self.0.transaction_id.lock().await.clone()
    }

    /// Begins a fresh local transaction if this session is transacted and
    /// does not already have one open (spec.md §3 "Transaction state"): the
    /// first send/receive after `open()` or after a prior `commit`/`rollback`
    /// lazily starts the next one.
    async fn ensure_transaction(&self) -> OpenWireResult<Option<TransactionId>> {
        if !self.is_transacted() {
            return Ok(None);
        }
        let mut guard = self.0.transaction_id.lock().await;
        if guard.is_none() {
            *guard = Some(self.0.connection.begin_local_transaction().await?);
        }
        Ok(guard.clone())
    }

    pub async fn create_producer(
        &self,
        destination: Option<Destination>,
        window_size: i32,
    ) -> OpenWireResult<Arc<ProducerKernel>> {
        let value = self.0.next_producer_value.fetch_add(1, Ordering::SeqCst);
        let producer_id = ProducerId::new(self.connection_id().clone(), self.0.session_id.value, value);
        self.0
            .connection
            .send_request(Command::ProducerInfo(ProducerInfo {
                producer_id: producer_id.clone(),
                destination: destination.clone(),
                window_size,
                dispatch_async: false,
            }))
            .await?;
        let producer = Arc::new(ProducerKernel::new(producer_id.clone(), self.clone(), destination, window_size));
        self.0
            .connection
            .register_producer(producer_id.clone(), producer.clone() as Arc<dyn ProducerSink>)
            .await;
        self.0.producers.lock().await.insert(producer_id, producer.clone());
        Ok(producer)
    }

    pub async fn create_consumer(
        &self,
        destination: Destination,
        options: ConsumerOptions,
    ) -> OpenWireResult<Arc<ConsumerKernel>> {
        let value = self.0.next_consumer_value.fetch_add(1, Ordering::SeqCst);
        let consumer_id = ConsumerId::new(self.connection_id().clone(), self.0.session_id.value, value);
        self.0
            .connection
            .send_request(Command::ConsumerInfo(ConsumerInfo {
                consumer_id: consumer_id.clone(),
                destination: destination.clone(),
                prefetch_size: options.prefetch_size,
                priority: options.priority,
                browser: options.browser,
                dispatch_async: options.dispatch_async,
                exclusive: options.exclusive,
                retroactive: options.retroactive,
                no_local: options.no_local,
                selector: options.selector.clone(),
                subscription_name: options.subscription_name.clone(),
            }))
            .await?;
        let consumer = Arc::new(ConsumerKernel::new(consumer_id.clone(), destination, self.clone(), options));
        consumer.start().await;
        self.0
            .connection
            .register_consumer(consumer_id.clone(), consumer.clone() as Arc<dyn ConsumerSink>)
            .await;
        self.0.consumers.lock().await.insert(consumer_id, consumer.clone());
        Ok(consumer)
    }

    pub(crate) async fn forget_producer(&self, producer_id: &ProducerId) {
        self.0.producers.lock().await.remove(producer_id);
        self.0.connection.unregister_producer(producer_id).await;
    }

    pub(crate) async fn forget_consumer(&self, consumer_id: &ConsumerId) {
        self.0.consumers.lock().await.remove(consumer_id);
        self.0.connection.unregister_consumer(consumer_id).await;
    }

    /// Builds and forwards the wire `Message` for a producer send (spec.md
    /// §4.4 "Session kernel"): assigns `MessageId`, timestamp, and
    /// `expiration = now + ttl` when `ttl > 0`, tags it with the session's
    /// current transaction id if transacted, then sends it synchronously
    /// through the connection (persistent sends always await the broker's
    /// `Response`; `AsyncSend` is not wired in by default, see
    /// `transport::stack`'s doc comment).
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn send(
        &self,
        producer_id: &ProducerId,
        sequence: u64,
        destination: Destination,
        body: MessageBody,
        delivery_mode: DeliveryMode,
        priority: i8,
        time_to_live: i64,
        correlation_id: Option<String>,
    ) -> OpenWireResult<()> {
        let transaction_id = self.ensure_transaction().await?;
        let timestamp = now_millis();
        let expiration = if time_to_live > 0 { timestamp + time_to_live } else { 0 };
        let message = Message {
            message_id: MessageId::new(producer_id.clone(), sequence),
            producer_id: producer_id.clone(),
            destination,
            reply_to: None,
            transaction_id,
            correlation_id,
            persistent: delivery_mode == DeliveryMode::PERSISTENT,
            priority,
            timestamp,
            expiration,
            redelivered: false,
            redelivery_counter: 0,
            delivery_mode,
            consumer_type_tag: None,
            properties: Default::default(),
            body,
            acked: false,
            dispatched_from_dlq: false,
            compressed: false,
        };
        self.0.connection.send_request(Command::Message(message)).await?;
        Ok(())
    }

    /// Sends a `MessageAck` tagged with the session's current transaction id
    /// (spec.md §4.4 "Acknowledgement policy" / §8 P7).
    pub(crate) async fn send_ack(&self, mut ack: crate::command::message::MessageAck) -> OpenWireResult<()> {
        ack.transaction_id = self.current_transaction_id().await;
        self.0.connection.send_oneway(Command::MessageAck(ack)).await
    }

    /// Ends the current transaction with a commit, then clears it so the
    /// next send/receive lazily begins a fresh one (spec.md §3 "Transaction
    /// state"). Before the broker-side commit, every consumer flushes its
    /// delivered-since-last-commit messages as one spanning `Consumed` ack
    /// (spec.md §4.4 "Transacted ack", §8 P7: exactly one ack per commit).
    pub async fn commit(&self) -> OpenWireResult<()> {
        if !self.is_transacted() {
            return Err(OpenWireError::IllegalState("commit on a non-transacted session".to_string()));
        }
        let id = self
            .ensure_transaction()
            .await?
            .expect("ensure_transaction always begins one for a transacted session");
        let consumers: Vec<Arc<ConsumerKernel>> = self.0.consumers.lock().await.values().cloned().collect();
        for consumer in consumers {
            consumer.flush_transacted(AckType::Consumed, Some(id.clone())).await?;
        }
        self.0.connection.commit_local_transaction(&id).await?;
        *self.0.transaction_id.lock().await = None;
        Ok(())
    }

    /// Discards the current transaction. Every consumer flushes its
    /// delivered-since-last-commit messages as one untagged `Redelivered`
    /// ack instead of the standard per-message acks (spec.md §4.4 "Rollback";
    /// end-to-end scenario 4) — untagged because the transaction is about to
    /// be forgotten, so there is nothing for the broker to correlate it to.
    pub async fn rollback(&self) -> OpenWireResult<()> {
        if !self.is_transacted() {
            return Err(OpenWireError::IllegalState("rollback on a non-transacted session".to_string()));
        }
        let id = self
            .ensure_transaction()
            .await?
            .expect("ensure_transaction always begins one for a transacted session");
        let consumers: Vec<Arc<ConsumerKernel>> = self.0.consumers.lock().await.values().cloned().collect();
        for consumer in consumers {
            consumer.flush_transacted(AckType::RedeliveredAck, None).await?;
        }
        self.0.connection.rollback_local_transaction(&id).await?;
        *self.0.transaction_id.lock().await = None;
        Ok(())
    }

    /// Closes every producer and consumer created on this session, then
    /// removes the session itself (spec.md §4.3 "Close").
    pub async fn close(&self) -> OpenWireResult<()> {
        let producers: Vec<Arc<ProducerKernel>> = self.0.producers.lock().await.values().cloned().collect();
        for producer in producers {
            let _ = producer.close().await;
        }
        let consumers: Vec<Arc<ConsumerKernel>> = self.0.consumers.lock().await.values().cloned().collect();
        for consumer in consumers {
            let _ = consumer.close().await;
        }
        self.0.connection.close_session(self.0.session_id.clone()).await
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazily_begun_transaction_is_none_until_first_use() {
        let ack_mode = AckMode::SessionTransacted;
        assert_eq!(ack_mode, AckMode::SessionTransacted);
    }
}

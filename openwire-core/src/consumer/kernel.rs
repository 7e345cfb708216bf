//! Consumer kernel (spec.md §4.4 "Consumer kernel"). Grounded on
//! `activemq-cpp/src/main/activemq/core/ActiveMQConsumerKernel.cpp`: a
//! consumer owns a dispatch channel fed by the connection's inbound
//! `MessageDispatch` stream, a "delivered" list of messages handed to the
//! application but not yet acknowledged, and one of four acknowledgement
//! policies selected by the owning session's `AckMode`.

use crate::command::destination::Destination;
use crate::command::ids::ConsumerId;
use crate::command::message::{AckType, Message, MessageAck, MessageDispatch, MessagePull};
use crate::command::transaction::TransactionId;
use crate::command::Command;
use crate::connection::kernel::ConsumerSink;
use crate::consumer::dispatch_channel::SimplePriorityMessageDispatchChannel;
use crate::error::OpenWireResult;
use crate::session::kernel::SessionKernel;
use async_trait::async_trait;
use log::trace;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Per-consumer options a caller selects at creation time (spec.md §3
/// "Consumer"). `max_pending_message_count` is a local-only safety valve,
/// not part of the wire `ConsumerInfo`.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub prefetch_size: i32,
    pub priority: i8,
    pub browser: bool,
    pub dispatch_async: bool,
    pub exclusive: bool,
    pub retroactive: bool,
    pub no_local: bool,
    pub selector: Option<String>,
    pub subscription_name: Option<String>,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            prefetch_size: 1000,
            priority: 4,
            browser: false,
            dispatch_async: false,
            exclusive: false,
            retroactive: false,
            no_local: false,
            selector: None,
            subscription_name: None,
        }
    }
}

pub struct ConsumerKernel {
    consumer_id: ConsumerId,
    destination: Destination,
    session: SessionKernel,
    options: ConsumerOptions,
    channel: SimplePriorityMessageDispatchChannel,
    delivered: Mutex<VecDeque<Message>>,
    pending_since_ack: AtomicUsize,
    browse_done: AtomicBool,
}

impl ConsumerKernel {
    pub(crate) fn new(consumer_id: ConsumerId, destination: Destination, session: SessionKernel, options: ConsumerOptions) -> Self {
        Self {
            consumer_id,
            destination,
            session,
            options,
            channel: SimplePriorityMessageDispatchChannel::new(),
            delivered: Mutex::new(VecDeque::new()),
            pending_since_ack: AtomicUsize::new(0),
            browse_done: AtomicBool::new(false),
        }
    }

    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }

    pub fn is_browser(&self) -> bool {
        self.options.browser
    }

    /// True once a queue browser has drained the broker's end-of-browse
    /// marker (spec.md §4.9 "Queue browser"): a null-bodied `MessageDispatch`.
    pub fn browse_done(&self) -> bool {
        self.browse_done.load(Ordering::SeqCst)
    }

    pub(crate) async fn start(&self) {
        self.channel.start().await;
    }

    fn pull_mode(&self) -> bool {
        self.options.prefetch_size == 0
    }

    /// Blocks until a message is available, or `timeout` elapses (`None`
    /// waits indefinitely). In pull mode this first asks the broker for one
    /// message via `MessagePull` (spec.md §3 "Pull mode").
    pub async fn receive(&self, timeout: Option<Duration>) -> OpenWireResult<Option<Message>> {
        if self.pull_mode() {
            self.session
                .connection()
                .send_oneway(Command::MessagePull(MessagePull {
                    consumer_id: self.consumer_id.clone(),
                    destination: self.destination.clone(),
                    timeout: timeout.map(|d| d.as_millis() as i64).unwrap_or(-1),
                }))
                .await?;
        }
        let dispatch = self.channel.dequeue(timeout).await;
        self.handle_dispatch(dispatch).await
    }

    pub async fn receive_no_wait(&self) -> OpenWireResult<Option<Message>> {
        let dispatch = self.channel.dequeue_no_wait().await;
        self.handle_dispatch(dispatch).await
    }

    async fn handle_dispatch(&self, dispatch: Option<MessageDispatch>) -> OpenWireResult<Option<Message>> {
        let Some(dispatch) = dispatch else { return Ok(None) };
        let Some(message) = dispatch.message else {
            // Broker's end-of-browse marker (spec.md §4.9): a null-bodied
            // MessageDispatch, never queued for acknowledgement.
            self.browse_done.store(true, Ordering::SeqCst);
            return Ok(None);
        };
        self.delivered.lock().await.push_back(message.clone());
        self.after_delivery(&message).await?;
        Ok(Some(message))
    }

    /// Applies this consumer's acknowledgement policy after one message has
    /// been handed to the caller (spec.md §4.4 "Acknowledgement policy").
    /// Browsers never acknowledge: the broker does not expect it.
    async fn after_delivery(&self, message: &Message) -> OpenWireResult<()> {
        if self.options.browser {
            return Ok(());
        }
        match self.session.ack_mode() {
            crate::command::info::AckMode::AutoAck | crate::command::info::AckMode::IndividualAck => {
                self.ack_one(message, AckType::Consumed).await?;
                self.delivered.lock().await.clear();
            }
            crate::command::info::AckMode::ClientAck => {
                // Deferred: the application calls `acknowledge()` explicitly.
            }
            crate::command::info::AckMode::DupsOkAck => {
                let pending = self.pending_since_ack.fetch_add(1, Ordering::SeqCst) + 1;
                if pending as i32 >= (self.options.prefetch_size / 2).max(1) {
                    self.acknowledge().await?;
                    self.pending_since_ack.store(0, Ordering::SeqCst);
                }
            }
            crate::command::info::AckMode::SessionTransacted => {
                // Deferred: accumulated on `delivered` above, flushed as one
                // spanning ack by `flush_transacted` on commit/rollback.
            }
        }
        Ok(())
    }

    /// Drains the delivered-since-last-commit list into a single spanning
    /// [`MessageAck`] (spec.md §4.4 "Transacted ack"), sent directly on the
    /// connection rather than through [`SessionKernel::send_ack`] since that
    /// path stamps the session's *current* transaction id onto the ack,
    /// which is wrong for a rollback's untagged Redelivered ack.
    pub(crate) async fn flush_transacted(
        &self,
        ack_type: AckType,
        transaction_id: Option<TransactionId>,
    ) -> OpenWireResult<()> {
        let mut delivered = self.delivered.lock().await;
        let Some(first) = delivered.front() else { return Ok(()) };
        let first_id = first.message_id.clone();
        let last_id = delivered.back().unwrap().message_id.clone();
        let count = delivered.len() as i32;
        delivered.clear();
        drop(delivered);
        self.session
            .connection()
            .send_oneway(Command::MessageAck(MessageAck {
                consumer_id: self.consumer_id.clone(),
                destination: self.destination.clone(),
                transaction_id,
                ack_type,
                first_message_id: Some(first_id),
                last_message_id: last_id,
                message_count: count,
                poison_cause: None,
            }))
            .await
    }

    async fn ack_one(&self, message: &Message, ack_type: AckType) -> OpenWireResult<()> {
        self.session
            .send_ack(MessageAck {
                consumer_id: self.consumer_id.clone(),
                destination: self.destination.clone(),
                transaction_id: None,
                ack_type,
                first_message_id: Some(message.message_id.clone()),
                last_message_id: message.message_id.clone(),
                message_count: 1,
                poison_cause: None,
            })
            .await
    }

    /// Acknowledges every message on the delivered list in one ack spanning
    /// the whole range (spec.md §4.4 "Client ack"), then clears it.
    pub async fn acknowledge(&self) -> OpenWireResult<()> {
        let delivered = self.delivered.lock().await;
        let Some(first) = delivered.front() else { return Ok(()) };
        let first_id = first.message_id.clone();
        let last_id = delivered.back().unwrap().message_id.clone();
        let count = delivered.len() as i32;
        drop(delivered);
        self.session
            .send_ack(MessageAck {
                consumer_id: self.consumer_id.clone(),
                destination: self.destination.clone(),
                transaction_id: None,
                ack_type: AckType::Consumed,
                first_message_id: Some(first_id),
                last_message_id: last_id,
                message_count: count,
                poison_cause: None,
            })
            .await?;
        self.delivered.lock().await.clear();
        Ok(())
    }

    /// Sends a poison ack for `message`, carrying the reason a listener gave
    /// for refusing it (spec.md §3 "Redelivery").
    pub async fn poison(&self, message: &Message, cause: String) -> OpenWireResult<()> {
        self.session
            .send_ack(MessageAck {
                consumer_id: self.consumer_id.clone(),
                destination: self.destination.clone(),
                transaction_id: None,
                ack_type: AckType::Poison,
                first_message_id: Some(message.message_id.clone()),
                last_message_id: message.message_id.clone(),
                message_count: 1,
                poison_cause: Some(cause),
            })
            .await
    }

    /// Closes the consumer (spec.md §4.4 "Close"): drains the channel,
    /// commits the session first if transacted, acks undelivered-but-already
    /// -dispatched messages as `Delivered` so the broker redispatches them,
    /// then removes the consumer from the broker.
    pub async fn close(&self) -> OpenWireResult<()> {
        self.channel.stop().await;
        let undispatched = self.channel.remove_all().await;

        if self.session.is_transacted() {
            if let Err(err) = self.session.commit().await {
                trace!("commit during consumer close failed: {err}");
            }
        } else if !self.delivered.lock().await.is_empty() {
            self.acknowledge().await?;
        }

        for dispatch in undispatched {
            if let Some(message) = dispatch.message {
                self.ack_one(&message, AckType::Delivered).await?;
            }
        }

        self.session.forget_consumer(&self.consumer_id).await;
        self.session
            .connection()
            .send_oneway(Command::RemoveInfo(crate::command::info::RemoveInfo {
                object_id: crate::command::info::RemovableId::Consumer(self.consumer_id.clone()),
            }))
            .await
    }
}

#[async_trait]
impl ConsumerSink for ConsumerKernel {
    async fn dispatch(&self, message: MessageDispatch) {
        self.channel.enqueue(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_standard_prefetch() {
        let options = ConsumerOptions::default();
        assert_eq!(options.prefetch_size, 1000);
        assert!(!options.browser);
    }

    #[test]
    fn zero_prefetch_is_pull_mode() {
        let options = ConsumerOptions { prefetch_size: 0, ..ConsumerOptions::default() };
        assert_eq!(options.prefetch_size, 0);
    }
}

//! Priority dispatch queue for a single consumer (spec.md §3 "Dispatch
//! channel"). A direct port of
//! `activemq-cpp/src/main/activemq/core/SimplePriorityMessageDispatchChannel.cpp`:
//! ten priority sub-queues, FIFO within a priority, strict priority order
//! across them (highest drained first), with `start`/`stop`/`close`
//! lifecycle gating delivery independent of what's enqueued.

use crate::command::message::MessageDispatch;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::Mutex;

pub const MAX_PRIORITIES: usize = 10;

struct State {
    channels: [VecDeque<MessageDispatch>; MAX_PRIORITIES],
    enqueued: usize,
    running: bool,
    closed: bool,
}

impl State {
    fn is_empty(&self) -> bool {
        self.enqueued == 0
    }

    fn channel_index(priority: i8) -> usize {
        priority.clamp(0, (MAX_PRIORITIES - 1) as i8) as usize
    }

    fn remove_first(&mut self) -> Option<MessageDispatch> {
        if self.enqueued == 0 {
            return None;
        }
        for i in (0..MAX_PRIORITIES).rev() {
            if let Some(dispatch) = self.channels[i].pop_front() {
                self.enqueued -= 1;
                return Some(dispatch);
            }
        }
        None
    }
}

pub struct SimplePriorityMessageDispatchChannel {
    state: Mutex<State>,
    notify: Notify,
}

impl Default for SimplePriorityMessageDispatchChannel {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                channels: Default::default(),
                enqueued: 0,
                running: false,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }
}

impl SimplePriorityMessageDispatchChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, dispatch: MessageDispatch) {
        let mut state = self.state.lock().await;
        let priority = dispatch_priority(&dispatch);
        state.channels[State::channel_index(priority)].push_back(dispatch);
        state.enqueued += 1;
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn enqueue_first(&self, dispatch: MessageDispatch) {
        let mut state = self.state.lock().await;
        let priority = dispatch_priority(&dispatch);
        state.channels[State::channel_index(priority)].push_front(dispatch);
        state.enqueued += 1;
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    pub async fn size(&self) -> usize {
        self.state.lock().await.enqueued
    }

    /// Waits (up to `timeout`, or indefinitely when `None`) for a dispatch to
    /// become available and removes it. Returns `None` if the channel closed
    /// or stopped while waiting, or the wait timed out.
    pub async fn dequeue(&self, timeout: Option<Duration>) -> Option<MessageDispatch> {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.closed || !state.running {
                    return None;
                }
                if !state.is_empty() {
                    return state.remove_first();
                }
            }
            match timeout {
                None => self.notify.notified().await,
                Some(duration) => {
                    if tokio::time::timeout(duration, self.notify.notified())
                        .await
                        .is_err()
                    {
                        return None;
                    }
                }
            }
        }
    }

    pub async fn dequeue_no_wait(&self) -> Option<MessageDispatch> {
        let mut state = self.state.lock().await;
        if state.closed || !state.running || state.is_empty() {
            return None;
        }
        state.remove_first()
    }

    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.running = true;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.running = false;
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.running = false;
            state.closed = true;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        for channel in &mut state.channels {
            channel.clear();
        }
        state.enqueued = 0;
    }

    /// Drains every priority sub-queue, highest priority first, for
    /// redelivery bookkeeping when a consumer closes with unacked messages.
    pub async fn remove_all(&self) -> Vec<MessageDispatch> {
        let mut state = self.state.lock().await;
        let mut result = Vec::with_capacity(state.enqueued);
        for i in (0..MAX_PRIORITIES).rev() {
            result.extend(state.channels[i].drain(..));
        }
        state.enqueued = 0;
        result
    }
}

fn dispatch_priority(dispatch: &MessageDispatch) -> i8 {
    dispatch
        .message
        .as_ref()
        .map(|m| m.priority.clamp(0, 9))
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::destination::{Destination, PhysicalDestination};
    use crate::command::ids::{ConnectionId, ConsumerId};

    fn sample_dispatch(priority: i8) -> MessageDispatch {
        let conn = ConnectionId::new("c1");
        let consumer = ConsumerId::new(conn.clone(), 1, 1);
        let producer = crate::command::ids::ProducerId::new(conn, 1, 1);
        let destination = Destination::Queue(PhysicalDestination::new("q"));
        let message = crate::command::message::Message {
            message_id: crate::command::ids::MessageId::new(producer.clone(), 1),
            producer_id: producer,
            destination: destination.clone(),
            reply_to: None,
            transaction_id: None,
            correlation_id: None,
            persistent: true,
            priority,
            timestamp: 0,
            expiration: 0,
            redelivered: false,
            redelivery_counter: 0,
            delivery_mode: crate::command::message::DeliveryMode::PERSISTENT,
            consumer_type_tag: None,
            properties: Default::default(),
            body: crate::command::message::MessageBody::Empty,
            acked: false,
            dispatched_from_dlq: false,
            compressed: false,
        };
        MessageDispatch {
            consumer_id: consumer,
            destination,
            message: Some(message),
            redelivery_counter: 0,
        }
    }

    #[tokio::test]
    async fn higher_priority_drains_before_lower() {
        let channel = SimplePriorityMessageDispatchChannel::new();
        channel.start().await;
        channel.enqueue(sample_dispatch(1)).await;
        channel.enqueue(sample_dispatch(9)).await;
        channel.enqueue(sample_dispatch(5)).await;

        let first = channel.dequeue_no_wait().await.unwrap();
        assert_eq!(first.message.unwrap().priority, 9);
        let second = channel.dequeue_no_wait().await.unwrap();
        assert_eq!(second.message.unwrap().priority, 5);
        let third = channel.dequeue_no_wait().await.unwrap();
        assert_eq!(third.message.unwrap().priority, 1);
    }

    #[tokio::test]
    async fn fifo_within_same_priority() {
        let channel = SimplePriorityMessageDispatchChannel::new();
        channel.start().await;
        for i in 0..3 {
            let mut dispatch = sample_dispatch(4);
            dispatch.redelivery_counter = i;
            channel.enqueue(dispatch).await;
        }
        for expected in 0..3 {
            let dispatch = channel.dequeue_no_wait().await.unwrap();
            assert_eq!(dispatch.redelivery_counter, expected);
        }
    }

    #[tokio::test]
    async fn stopped_channel_does_not_dequeue() {
        let channel = SimplePriorityMessageDispatchChannel::new();
        channel.enqueue(sample_dispatch(4)).await;
        assert!(channel.dequeue_no_wait().await.is_none());
        channel.start().await;
        assert!(channel.dequeue_no_wait().await.is_some());
    }

    #[tokio::test]
    async fn closed_channel_never_yields_again() {
        let channel = SimplePriorityMessageDispatchChannel::new();
        channel.start().await;
        channel.enqueue(sample_dispatch(4)).await;
        channel.close().await;
        assert!(channel.dequeue_no_wait().await.is_none());
    }
}

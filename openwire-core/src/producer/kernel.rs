//! Producer kernel (spec.md §4.4 "Producer kernel"). A close port of
//! `activemq-cpp/src/main/activemq/core/kernels/ActiveMQProducerKernel.cpp`:
//! resolves the destination to send to, waits for flow-control window space,
//! assigns the next `MessageId` sequence number, then hands the actual wire
//! `Message` assembly to the owning session (mirroring the original's
//! `session->send(...)` delegation).

use crate::command::destination::Destination;
use crate::command::message::{DeliveryMode, MessageBody, ProducerAck};
use crate::command::ids::ProducerId;
use crate::connection::kernel::ProducerSink;
use crate::error::{OpenWireError, OpenWireResult};
use crate::producer::memory_usage::MemoryUsage;
use crate::session::kernel::SessionKernel;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct ProducerKernel {
    producer_id: ProducerId,
    session: SessionKernel,
    bound_destination: Option<Destination>,
    memory_usage: MemoryUsage,
    next_sequence: AtomicU64,
    send_timeout: Option<Duration>,
}

impl ProducerKernel {
    pub(crate) fn new(producer_id: ProducerId, session: SessionKernel, bound_destination: Option<Destination>, window_size: i32) -> Self {
        Self {
            producer_id,
            session,
            bound_destination,
            memory_usage: MemoryUsage::new(window_size),
            next_sequence: AtomicU64::new(1),
            send_timeout: None,
        }
    }

    pub fn producer_id(&self) -> &ProducerId {
        &self.producer_id
    }

    pub fn set_send_timeout(&mut self, timeout: Option<Duration>) {
        self.send_timeout = timeout;
    }

    /// Resolves the destination to send `body` to (spec.md §4.4): a producer
    /// bound at creation must either receive no `destination` argument, or
    /// the same one it was bound to; an unbound producer requires one.
    fn resolve_destination(&self, destination: Option<Destination>) -> OpenWireResult<Destination> {
        match (&self.bound_destination, destination) {
            (Some(bound), None) => Ok(bound.clone()),
            (Some(bound), Some(given)) if &given == bound => Ok(given),
            (Some(_), Some(_)) => Err(OpenWireError::Unsupported(
                "a bound producer cannot send to a different destination".to_string(),
            )),
            (None, Some(given)) => Ok(given),
            (None, None) => Err(OpenWireError::Unsupported(
                "an unbound producer requires a destination on every send".to_string(),
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send(
        &self,
        destination: Option<Destination>,
        body: MessageBody,
        delivery_mode: DeliveryMode,
        priority: i8,
        time_to_live: i64,
        correlation_id: Option<String>,
        size_hint: i64,
    ) -> OpenWireResult<()> {
        let destination = self.resolve_destination(destination)?;
        if !self.memory_usage.wait_for_space(size_hint, self.send_timeout).await {
            return Err(OpenWireError::Timeout(self.send_timeout.unwrap_or_default()));
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let result = self
            .session
            .send(
                &self.producer_id,
                sequence,
                destination,
                body,
                delivery_mode,
                priority,
                time_to_live,
                correlation_id,
            )
            .await;
        if result.is_err() {
            self.memory_usage.release(size_hint);
        }
        result
    }

    /// Closes the producer: removes it from the broker and the session's
    /// registry.
    pub async fn close(&self) -> OpenWireResult<()> {
        self.session.forget_producer(&self.producer_id).await;
        self.session
            .connection()
            .send_oneway(crate::command::Command::RemoveInfo(crate::command::info::RemoveInfo {
                object_id: crate::command::info::RemovableId::Producer(self.producer_id.clone()),
            }))
            .await
    }
}

#[async_trait]
impl ProducerSink for ProducerKernel {
    async fn on_ack(&self, ack: ProducerAck) {
        self.memory_usage.release(i64::from(ack.size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::destination::PhysicalDestination;

    fn queue(name: &str) -> Destination {
        Destination::Queue(PhysicalDestination::new(name))
    }

    #[test]
    fn bound_producer_without_destination_arg_uses_bound_one() {
        let bound = Some(queue("orders"));
        let resolved = resolve(&bound, None);
        assert_eq!(resolved.unwrap(), queue("orders"));
    }

    #[test]
    fn bound_producer_with_mismatched_destination_errors() {
        let bound = Some(queue("orders"));
        let resolved = resolve(&bound, Some(queue("returns")));
        assert!(resolved.is_err());
    }

    #[test]
    fn unbound_producer_without_destination_errors() {
        let resolved = resolve(&None, None);
        assert!(resolved.is_err());
    }

    fn resolve(bound: &Option<Destination>, given: Option<Destination>) -> OpenWireResult<Destination> {
        match (bound, given) {
            (Some(bound), None) => Ok(bound.clone()),
            (Some(bound), Some(given)) if &given == bound => Ok(given),
            (Some(_), Some(_)) => Err(OpenWireError::Unsupported("mismatch".to_string())),
            (None, Some(given)) => Ok(given),
            (None, None) => Err(OpenWireError::Unsupported("missing".to_string())),
        }
    }
}

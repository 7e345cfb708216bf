//! Messages and the data-plane commands that carry them (spec.md §3 "Message"
//! and §4.4). Grounded on `activemq-cpp/src/main/activemq/commands/{Message,
//! ActiveMQTextMessage,ActiveMQBytesMessage,ActiveMQMapMessage,
//! ActiveMQStreamMessage,ActiveMQObjectMessage,ActiveMQBlobMessage,
//! MessageAck,MessageDispatch,MessagePull,MessageDispatchNotification,
//! ProducerAck}.cpp`.

use crate::command::destination::Destination;
use crate::command::ids::{ConsumerId, MessageId, ProducerId};
use crate::command::primitive_value::PrimitiveMap;
use crate::command::transaction::TransactionId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeliveryMode(pub i8);

impl DeliveryMode {
    pub const PERSISTENT: Self = Self(2);
    pub const NON_PERSISTENT: Self = Self(1);
}

/// The JMS-style message body kinds OpenWire distinguishes by data-structure
/// type (spec.md §3 "Message"). `Object` carries an opaque Java-serialized
/// blob we never deserialize; `Blob` carries a URL reference to out-of-band
/// payload storage.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(Option<String>),
    Bytes(Vec<u8>),
    Map(PrimitiveMap),
    Stream(Vec<crate::command::primitive_value::PrimitiveValue>),
    Object(Vec<u8>),
    Blob { remote_url: String, mime_type: Option<String> },
    Empty,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: MessageId,
    pub producer_id: ProducerId,
    pub destination: Destination,
    pub reply_to: Option<Destination>,
    pub transaction_id: Option<TransactionId>,
    pub correlation_id: Option<String>,
    pub persistent: bool,
    pub priority: i8,
    pub timestamp: i64,
    pub expiration: i64,
    pub redelivered: bool,
    pub redelivery_counter: i32,
    pub delivery_mode: DeliveryMode,
    pub consumer_type_tag: Option<String>,
    pub properties: BTreeMap<String, crate::command::primitive_value::PrimitiveValue>,
    pub body: MessageBody,
    /// Set by a consumer's ack-range tracking once this message has been
    /// acknowledged individually (client-ack mode); never marshaled.
    pub acked: bool,
    pub dispatched_from_dlq: bool,
    pub compressed: bool,
}

impl Message {
    pub fn jms_type(&self) -> &'static str {
        match self.body {
            MessageBody::Text(_) => "TextMessage",
            MessageBody::Bytes(_) => "BytesMessage",
            MessageBody::Map(_) => "MapMessage",
            MessageBody::Stream(_) => "StreamMessage",
            MessageBody::Object(_) => "ObjectMessage",
            MessageBody::Blob { .. } => "BlobMessage",
            MessageBody::Empty => "Message",
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiration != 0 && now_millis >= self.expiration
    }
}

/// Acknowledges a contiguous range `[first_message_id, last_message_id]`
/// dispatched to `consumer_id` (spec.md §3 "Acknowledgement"). `ack_type`
/// distinguishes delivered/consumed/poison/redelivered acks, mirroring
/// `ActiveMQMessage::ACK_TYPE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    Delivered,
    Consumed,
    Poison,
    RedeliveredAck,
    ConsumedIndividual,
}

impl AckType {
    /// Wire values per spec.md §6: `{0:Delivered, 1:Poison, 2:Standard, 3:Redelivered, 4:IndividualAck}`.
    pub fn wire_value(self) -> i8 {
        match self {
            Self::Delivered => 0,
            Self::Poison => 1,
            Self::Consumed => 2,
            Self::RedeliveredAck => 3,
            Self::ConsumedIndividual => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageAck {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub transaction_id: Option<TransactionId>,
    pub ack_type: AckType,
    pub first_message_id: Option<MessageId>,
    pub last_message_id: MessageId,
    pub message_count: i32,
    /// Carried only on `Poison` acks: why the consumer is refusing this
    /// message (spec.md §3 "Redelivery"), surfaced to the broker's DLQ policy.
    pub poison_cause: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageDispatch {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub message: Option<Message>,
    /// Number of messages the broker still has queued for this consumer
    /// after this one; used only as a dispatch-efficiency hint.
    pub redelivery_counter: i32,
}

/// Pull-mode request (spec.md §3 "Pull mode"): asks the broker for at most
/// one message, waiting up to `timeout` millis (`0` means "no wait",
/// negative means "wait indefinitely").
#[derive(Debug, Clone)]
pub struct MessagePull {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub timeout: i64,
}

/// Informs a consumer that another consumer on the same connection already
/// claimed a message from a shared queue, so the browser/consumer state can
/// stay consistent without re-dispatching it.
#[derive(Debug, Clone)]
pub struct MessageDispatchNotification {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub message_id: MessageId,
}

/// Sent by the broker after an async producer send completes, carrying the
/// broker-assigned `MessageId` back (relevant when the producer let the
/// broker generate ids) and the producer's updated flow-control window.
#[derive(Debug, Clone)]
pub struct ProducerAck {
    pub producer_id: ProducerId,
    pub size: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ids::ConnectionId;

    #[test]
    fn expiration_zero_means_never_expires() {
        let msg = sample_message(0);
        assert!(!msg.is_expired(i64::MAX));
    }

    #[test]
    fn expiration_in_the_past_is_expired() {
        let msg = sample_message(1000);
        assert!(msg.is_expired(2000));
        assert!(!msg.is_expired(500));
    }

    fn sample_message(expiration: i64) -> Message {
        let conn = ConnectionId::new("c1");
        let producer = ProducerId::new(conn, 1, 1);
        Message {
            message_id: MessageId::new(producer.clone(), 1),
            producer_id: producer,
            destination: Destination::Queue(crate::command::destination::PhysicalDestination::new("q")),
            reply_to: None,
            transaction_id: None,
            correlation_id: None,
            persistent: true,
            priority: 4,
            timestamp: 0,
            expiration,
            redelivered: false,
            redelivery_counter: 0,
            delivery_mode: DeliveryMode::PERSISTENT,
            consumer_type_tag: None,
            properties: BTreeMap::new(),
            body: MessageBody::Empty,
            acked: false,
            dispatched_from_dlq: false,
            compressed: false,
        }
    }
}

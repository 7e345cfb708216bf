//! Lifecycle "info" commands (spec.md §4.3): the client announces a new
//! connection/session/producer/consumer/destination by sending its `*Info`
//! command, and tears it down again with `RemoveInfo`/`RemoveSubscriptionInfo`.

use crate::command::destination::Destination;
use crate::command::ids::{ConnectionId, ConsumerId, ProducerId, SessionId};

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub client_id: String,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub manage_large_messages: bool,
    pub fault_tolerant: bool,
    pub failover_reconnect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    AutoAck,
    ClientAck,
    DupsOkAck,
    SessionTransacted,
    /// Server-side individual ack (non-standard, carried for interop only).
    IndividualAck,
}

impl AckMode {
    /// OpenWire's numeric session-mode constants (spec.md §3 "Acknowledgement mode").
    pub fn wire_value(self) -> i32 {
        match self {
            Self::AutoAck => 1,
            Self::ClientAck => 2,
            Self::DupsOkAck => 3,
            Self::SessionTransacted => 0,
            Self::IndividualAck => 4,
        }
    }

    pub fn from_wire_value(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::SessionTransacted,
            1 => Self::AutoAck,
            2 => Self::ClientAck,
            3 => Self::DupsOkAck,
            4 => Self::IndividualAck,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub ack_mode: AckMode,
}

#[derive(Debug, Clone)]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    /// Absent when the producer is unbound and supplies a destination per send.
    pub destination: Option<Destination>,
    pub window_size: i32,
    pub dispatch_async: bool,
}

#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub prefetch_size: i32,
    pub priority: i8,
    pub browser: bool,
    pub dispatch_async: bool,
    pub exclusive: bool,
    pub retroactive: bool,
    pub no_local: bool,
    pub selector: Option<String>,
    /// Present only for durable topic subscriptions.
    pub subscription_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DestinationInfo {
    pub connection_id: ConnectionId,
    pub destination: Destination,
    /// `0` add, `1` remove (spec.md §4.3); advisory only, brokers may ignore it.
    pub operation_type: i8,
}

/// Tears down whichever kind of kernel object `object_id` names. The broker
/// (and our own dispatch) must re-discriminate on the concrete id type since
/// OpenWire has no single `RemoveInfo` variant per object kind.
#[derive(Debug, Clone)]
pub enum RemovableId {
    Connection(ConnectionId),
    Session(SessionId),
    Producer(ProducerId),
    Consumer(ConsumerId),
}

#[derive(Debug, Clone)]
pub struct RemoveInfo {
    pub object_id: RemovableId,
}

#[derive(Debug, Clone)]
pub struct RemoveSubscriptionInfo {
    pub connection_id: ConnectionId,
    pub client_id: String,
    pub subscription_name: String,
}

//! OpenWire commands: the unit of everything exchanged over a connection.
//!
//! [`Command`] is the Rust replacement for the original's polymorphic
//! `DataStructure`/`Command` class hierarchy: one enum variant per concrete
//! command, each carrying its own struct. [`Command::data_structure_type`]
//! gives the `u8` tag OpenWire puts on the wire for that variant.

pub mod codec;
pub mod control;
pub mod destination;
pub mod ids;
pub mod info;
pub mod message;
pub mod primitive_value;
pub mod transaction;
pub mod visitor;

use control::{
    BrokerInfo, ConnectionControl, ConnectionError, ConsumerControl, ControlCommand,
    ExceptionResponse, FlushCommand, KeepAliveInfo, ReplayCommand, Response, ShutdownInfo,
    WireFormatInfo,
};
use info::{
    ConnectionInfo, ConsumerInfo, DestinationInfo, ProducerInfo, RemoveInfo,
    RemoveSubscriptionInfo, SessionInfo,
};
use message::{
    Message, MessageAck, MessageDispatch, MessageDispatchNotification, MessagePull, ProducerAck,
};
use transaction::TransactionInfo;

#[derive(Debug, Clone)]
pub enum Command {
    WireFormatInfo(WireFormatInfo),
    BrokerInfo(BrokerInfo),
    KeepAliveInfo(KeepAliveInfo),
    ShutdownInfo(ShutdownInfo),
    ConnectionControl(ConnectionControl),
    ConsumerControl(ConsumerControl),
    ControlCommand(ControlCommand),
    FlushCommand(FlushCommand),
    ReplayCommand(ReplayCommand),
    Response(Response),
    ExceptionResponse(ExceptionResponse),
    ConnectionError(ConnectionError),
    ConnectionInfo(ConnectionInfo),
    SessionInfo(SessionInfo),
    ProducerInfo(ProducerInfo),
    ConsumerInfo(ConsumerInfo),
    DestinationInfo(DestinationInfo),
    RemoveInfo(RemoveInfo),
    RemoveSubscriptionInfo(RemoveSubscriptionInfo),
    Message(Message),
    MessageAck(MessageAck),
    MessageDispatch(MessageDispatch),
    MessagePull(MessagePull),
    MessageDispatchNotification(MessageDispatchNotification),
    ProducerAck(ProducerAck),
    TransactionInfo(TransactionInfo),
}

/// Data-structure type bytes (spec.md §4.2), taken from the original
/// `activemq-cpp` `CommandTypes.h` constants.
impl Command {
    pub fn data_structure_type(&self) -> u8 {
        match self {
            Self::WireFormatInfo(_) => 1,
            Self::BrokerInfo(_) => 2,
            Self::ConnectionInfo(_) => 3,
            Self::SessionInfo(_) => 4,
            Self::ConsumerInfo(_) => 5,
            Self::ProducerInfo(_) => 6,
            Self::TransactionInfo(_) => 7,
            Self::DestinationInfo(_) => 8,
            Self::RemoveSubscriptionInfo(_) => 9,
            Self::KeepAliveInfo(_) => 10,
            Self::ShutdownInfo(_) => 11,
            Self::RemoveInfo(_) => 12,
            Self::ControlCommand(_) => 14,
            Self::FlushCommand(_) => 15,
            Self::ConnectionError(_) => 16,
            Self::ConsumerControl(_) => 17,
            Self::ConnectionControl(_) => 18,
            Self::Message(_) => 23,
            Self::MessageDispatch(_) => 21,
            Self::MessageAck(_) => 22,
            Self::MessagePull(_) => 20,
            Self::MessageDispatchNotification(_) => 90,
            Self::ProducerAck(_) => 19,
            Self::Response(_) => 30,
            Self::ExceptionResponse(_) => 31,
            Self::ReplayCommand(_) => 65,
        }
    }

    /// Whether the originator expects a [`Command::Response`]/
    /// [`Command::ExceptionResponse`] echoing this command's correlation id
    /// (spec.md §4.2). Info/remove/transaction commands and message sends in
    /// non-`dispatchAsync` mode are synchronous by default; dispatch-only and
    /// keepalive/control traffic is typically fire-and-forget ("oneway").
    pub fn is_response_required(&self) -> bool {
        matches!(
            self,
            Self::ConnectionInfo(_)
                | Self::SessionInfo(_)
                | Self::ProducerInfo(_)
                | Self::ConsumerInfo(_)
                | Self::DestinationInfo(_)
                | Self::RemoveInfo(_)
                | Self::RemoveSubscriptionInfo(_)
                | Self::TransactionInfo(_)
                | Self::Message(_)
        )
    }
}

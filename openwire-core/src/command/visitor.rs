//! Command-visitor router (spec.md §4.7 "Dispatch").
//!
//! The original C++ commands implement a double-dispatch visitor
//! (`Command::visit(CommandVisitor&)`); Rust's enums make that unnecessary.
//! `CommandVisitor` instead exposes one method per command family, and
//! [`dispatch`] pattern-matches the incoming [`crate::command::Command`] and
//! calls the matching method. Kernels that only care about a handful of
//! command kinds implement the trait with default no-op bodies for the rest.

use crate::command::control::{
    BrokerInfo, ConnectionControl, ConnectionError, ConsumerControl, ControlCommand,
    ExceptionResponse, FlushCommand, KeepAliveInfo, ReplayCommand, Response, ShutdownInfo,
    WireFormatInfo,
};
use crate::command::info::{
    ConnectionInfo, ConsumerInfo, DestinationInfo, ProducerInfo, RemoveInfo,
    RemoveSubscriptionInfo, SessionInfo,
};
use crate::command::message::{
    Message, MessageAck, MessageDispatch, MessageDispatchNotification, MessagePull, ProducerAck,
};
use crate::command::transaction::TransactionInfo;
use crate::command::Command;
use crate::error::OpenWireResult;

#[allow(unused_variables)]
pub trait CommandVisitor {
    fn on_wire_format_info(&mut self, cmd: &WireFormatInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_broker_info(&mut self, cmd: &BrokerInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_keep_alive_info(&mut self, cmd: &KeepAliveInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_shutdown_info(&mut self, cmd: &ShutdownInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_connection_control(&mut self, cmd: &ConnectionControl) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_consumer_control(&mut self, cmd: &ConsumerControl) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_control_command(&mut self, cmd: &ControlCommand) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_flush_command(&mut self, cmd: &FlushCommand) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_replay_command(&mut self, cmd: &ReplayCommand) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_response(&mut self, cmd: &Response) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_exception_response(&mut self, cmd: &ExceptionResponse) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_connection_error(&mut self, cmd: &ConnectionError) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_connection_info(&mut self, cmd: &ConnectionInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_session_info(&mut self, cmd: &SessionInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_producer_info(&mut self, cmd: &ProducerInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_consumer_info(&mut self, cmd: &ConsumerInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_destination_info(&mut self, cmd: &DestinationInfo) -> OpenWireResult<()> {
        Ok(())
    }
    /// `RemoveInfo.object_id` re-dispatches on the concrete id kind, mirroring
    /// the original `RemoveInfo::visit` which re-enters the visitor based on
    /// `DataStructure::getDataStructureType()` of its wrapped id.
    fn on_remove_info(&mut self, cmd: &RemoveInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_remove_subscription_info(&mut self, cmd: &RemoveSubscriptionInfo) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_message(&mut self, cmd: &Message) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_message_ack(&mut self, cmd: &MessageAck) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_message_dispatch(&mut self, cmd: &MessageDispatch) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_message_pull(&mut self, cmd: &MessagePull) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_message_dispatch_notification(
        &mut self,
        cmd: &MessageDispatchNotification,
    ) -> OpenWireResult<()> {
        Ok(())
    }
    fn on_producer_ack(&mut self, cmd: &ProducerAck) -> OpenWireResult<()> {
        Ok(())
    }
    /// `TransactionInfo.operation` re-dispatch point; most visitors only care
    /// about a handful of the eight operations and match on it themselves.
    fn on_transaction_info(&mut self, cmd: &TransactionInfo) -> OpenWireResult<()> {
        Ok(())
    }
}

pub fn dispatch(command: &Command, visitor: &mut dyn CommandVisitor) -> OpenWireResult<()> {
    match command {
        Command::WireFormatInfo(c) => visitor.on_wire_format_info(c),
        Command::BrokerInfo(c) => visitor.on_broker_info(c),
        Command::KeepAliveInfo(c) => visitor.on_keep_alive_info(c),
        Command::ShutdownInfo(c) => visitor.on_shutdown_info(c),
        Command::ConnectionControl(c) => visitor.on_connection_control(c),
        Command::ConsumerControl(c) => visitor.on_consumer_control(c),
        Command::ControlCommand(c) => visitor.on_control_command(c),
        Command::FlushCommand(c) => visitor.on_flush_command(c),
        Command::ReplayCommand(c) => visitor.on_replay_command(c),
        Command::Response(c) => visitor.on_response(c),
        Command::ExceptionResponse(c) => visitor.on_exception_response(c),
        Command::ConnectionError(c) => visitor.on_connection_error(c),
        Command::ConnectionInfo(c) => visitor.on_connection_info(c),
        Command::SessionInfo(c) => visitor.on_session_info(c),
        Command::ProducerInfo(c) => visitor.on_producer_info(c),
        Command::ConsumerInfo(c) => visitor.on_consumer_info(c),
        Command::DestinationInfo(c) => visitor.on_destination_info(c),
        Command::RemoveInfo(c) => visitor.on_remove_info(c),
        Command::RemoveSubscriptionInfo(c) => visitor.on_remove_subscription_info(c),
        Command::Message(c) => visitor.on_message(c),
        Command::MessageAck(c) => visitor.on_message_ack(c),
        Command::MessageDispatch(c) => visitor.on_message_dispatch(c),
        Command::MessagePull(c) => visitor.on_message_pull(c),
        Command::MessageDispatchNotification(c) => visitor.on_message_dispatch_notification(c),
        Command::ProducerAck(c) => visitor.on_producer_ack(c),
        Command::TransactionInfo(c) => visitor.on_transaction_info(c),
    }
}

//! Marshals [`Command`] variants to/from their frame body bytes, in both
//! loose and tight encoding (spec.md §4.1, §5.1 `WireFormatInfo.tightEncodingEnabled`).
//!
//! Loose encoding self-describes every nullable field with an inline
//! presence byte. Tight encoding instead collects one [`BooleanStream`] of
//! presence/boolean bits per command ahead of the field payloads; see that
//! type's doc comment for how nesting is simplified relative to the
//! original's per-`DataStructure` streams.

use crate::codec::marshal::{
    read_loose_nullable_bytes, read_loose_nullable_string, read_tight_nullable_bytes,
    read_tight_nullable_string, write_loose_nullable_bytes, write_loose_nullable_string,
    write_tight_nullable_bytes, write_tight_nullable_string, BooleanStream,
};
use crate::command::control::{
    BrokerError, BrokerInfo, ConnectionControl, ConnectionError, ConsumerControl, ControlCommand,
    ExceptionResponse, FlushCommand, KeepAliveInfo, ReplayCommand, Response, ShutdownInfo,
    WireFormatInfo, WIRE_FORMAT_MAGIC,
};
use crate::command::destination::{Destination, PhysicalDestination, TemporaryDestination};
use crate::command::ids::{ConnectionId, ConsumerId, MessageId, ProducerId, SessionId};
use crate::command::info::{
    AckMode, ConnectionInfo, ConsumerInfo, DestinationInfo, ProducerInfo, RemovableId, RemoveInfo,
    RemoveSubscriptionInfo, SessionInfo,
};
use crate::command::message::{
    AckType, DeliveryMode, Message, MessageAck, MessageBody, MessageDispatch,
    MessageDispatchNotification, MessagePull, ProducerAck,
};
use crate::command::primitive_value::{marshal_map, unmarshal_map};
use crate::command::transaction::{
    LocalTransactionId, TransactionId, TransactionInfo, TransactionOperation, XaTransactionId,
};
use crate::command::Command;
use crate::error::{DecodeErrorKind, OpenWireError, OpenWireResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Marshals the full frame body: `commandId` + `responseRequired` (every
/// `BaseCommand` carries these, spec.md §4.2 "Request/response correlation"),
/// followed by the command-specific fields, loose or tight depending on
/// `tight_encoding_enabled`.
pub fn marshal_command(
    command_id: i32,
    response_required: bool,
    command: &Command,
    tight_encoding_enabled: bool,
) -> OpenWireResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_i32::<BigEndian>(command_id)?;
    buf.write_u8(u8::from(response_required))?;
    if tight_encoding_enabled {
        buf.extend_from_slice(&marshal_tight(command)?);
    } else {
        buf.extend_from_slice(&marshal_loose(command)?);
    }
    Ok(buf)
}

pub fn unmarshal_command(
    data_structure_type: u8,
    body: &[u8],
    tight_encoding_enabled: bool,
) -> OpenWireResult<(i32, bool, Command)> {
    if body.len() < 5 {
        return Err(OpenWireError::decode(DecodeErrorKind::TruncatedFrame, 0));
    }
    let mut cursor = Cursor::new(body);
    let command_id = cursor.read_i32::<BigEndian>()?;
    let response_required = cursor.read_u8()? != 0;
    let rest = &body[5..];
    let command = if tight_encoding_enabled {
        unmarshal_tight(data_structure_type, rest)?
    } else {
        unmarshal_loose(data_structure_type, rest)?
    };
    Ok((command_id, response_required, command))
}

// ---------------------------------------------------------------------
// Loose encoding
// ---------------------------------------------------------------------

fn marshal_loose(command: &Command) -> OpenWireResult<Vec<u8>> {
    let mut buf = Vec::new();
    match command {
        Command::WireFormatInfo(c) => marshal_wire_format_info(c, &mut buf)?,
        Command::KeepAliveInfo(c) => buf.write_u8(u8::from(c.response_required))?,
        Command::ShutdownInfo(_) => {}
        Command::ControlCommand(c) => write_loose_nullable_string(Some(&c.command), &mut buf)?,
        Command::FlushCommand(_) => {}
        Command::Response(c) => buf.write_i32::<BigEndian>(c.correlation_id)?,
        Command::Message(c) => marshal_message(c, &mut buf)?,
        Command::MessageAck(c) => marshal_message_ack(c, &mut buf)?,
        Command::BrokerInfo(c) => marshal_broker_info(c, &mut buf)?,
        Command::ConnectionControl(c) => marshal_connection_control(c, &mut buf)?,
        Command::ConsumerControl(c) => marshal_consumer_control(c, &mut buf)?,
        Command::ConnectionInfo(c) => marshal_connection_info(c, &mut buf)?,
        Command::SessionInfo(c) => marshal_session_info(c, &mut buf)?,
        Command::ProducerInfo(c) => marshal_producer_info(c, &mut buf)?,
        Command::ConsumerInfo(c) => marshal_consumer_info(c, &mut buf)?,
        Command::DestinationInfo(c) => marshal_destination_info(c, &mut buf)?,
        Command::RemoveInfo(c) => marshal_remove_info(c, &mut buf)?,
        Command::RemoveSubscriptionInfo(c) => marshal_remove_subscription_info(c, &mut buf)?,
        Command::MessagePull(c) => marshal_message_pull(c, &mut buf)?,
        Command::MessageDispatch(c) => marshal_message_dispatch(c, &mut buf)?,
        Command::MessageDispatchNotification(c) => marshal_message_dispatch_notification(c, &mut buf)?,
        Command::ProducerAck(c) => marshal_producer_ack(c, &mut buf)?,
        Command::TransactionInfo(c) => marshal_transaction_info(c, &mut buf)?,
        Command::ExceptionResponse(c) => marshal_exception_response(c, &mut buf)?,
        Command::ConnectionError(c) => marshal_connection_error(c, &mut buf)?,
        Command::ReplayCommand(c) => marshal_replay_command(c, &mut buf)?,
    }
    Ok(buf)
}

fn unmarshal_loose(data_structure_type: u8, body: &[u8]) -> OpenWireResult<Command> {
    let mut cursor = Cursor::new(body);
    Ok(match data_structure_type {
        1 => Command::WireFormatInfo(unmarshal_wire_format_info(&mut cursor)?),
        10 => Command::KeepAliveInfo(KeepAliveInfo {
            response_required: cursor.read_u8()? != 0,
        }),
        11 => Command::ShutdownInfo(ShutdownInfo),
        14 => Command::ControlCommand(ControlCommand {
            command: read_loose_nullable_string(&mut cursor)?.unwrap_or_default(),
        }),
        15 => Command::FlushCommand(FlushCommand),
        30 => Command::Response(Response {
            correlation_id: cursor.read_i32::<BigEndian>()?,
        }),
        23 => Command::Message(unmarshal_message(&mut cursor)?),
        22 => Command::MessageAck(unmarshal_message_ack(&mut cursor)?),
        2 => Command::BrokerInfo(unmarshal_broker_info(&mut cursor)?),
        18 => Command::ConnectionControl(unmarshal_connection_control(&mut cursor)?),
        17 => Command::ConsumerControl(unmarshal_consumer_control(&mut cursor)?),
        3 => Command::ConnectionInfo(unmarshal_connection_info(&mut cursor)?),
        4 => Command::SessionInfo(unmarshal_session_info(&mut cursor)?),
        6 => Command::ProducerInfo(unmarshal_producer_info(&mut cursor)?),
        5 => Command::ConsumerInfo(unmarshal_consumer_info(&mut cursor)?),
        8 => Command::DestinationInfo(unmarshal_destination_info(&mut cursor)?),
        12 => Command::RemoveInfo(unmarshal_remove_info(&mut cursor)?),
        9 => Command::RemoveSubscriptionInfo(unmarshal_remove_subscription_info(&mut cursor)?),
        20 => Command::MessagePull(unmarshal_message_pull(&mut cursor)?),
        21 => Command::MessageDispatch(unmarshal_message_dispatch(&mut cursor)?),
        90 => Command::MessageDispatchNotification(unmarshal_message_dispatch_notification(&mut cursor)?),
        19 => Command::ProducerAck(unmarshal_producer_ack(&mut cursor)?),
        7 => Command::TransactionInfo(unmarshal_transaction_info(&mut cursor)?),
        31 => Command::ExceptionResponse(unmarshal_exception_response(&mut cursor)?),
        16 => Command::ConnectionError(unmarshal_connection_error(&mut cursor)?),
        65 => Command::ReplayCommand(unmarshal_replay_command(&mut cursor)?),
        _ => {
            return Err(OpenWireError::decode(
                DecodeErrorKind::UnknownDataStructureType,
                0,
            ))
        }
    })
}

fn marshal_wire_format_info(c: &WireFormatInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    w.write_all(&c.magic)?;
    w.write_i32::<BigEndian>(c.version)?;
    w.write_u8(u8::from(c.stack_trace_enabled))?;
    w.write_u8(u8::from(c.tcp_no_delay_enabled))?;
    w.write_u8(u8::from(c.tight_encoding_enabled))?;
    w.write_u8(u8::from(c.size_prefix_disabled))?;
    w.write_i64::<BigEndian>(c.max_inactivity_duration)?;
    w.write_i64::<BigEndian>(c.max_inactivity_duration_initial_delay)?;
    w.write_i32::<BigEndian>(c.cache_size)?;
    w.write_u8(u8::from(c.cache_enabled))?;
    Ok(())
}

fn unmarshal_wire_format_info(r: &mut dyn Read) -> OpenWireResult<WireFormatInfo> {
    let mut magic = [0_u8; 8];
    r.read_exact(&mut magic)?;
    if magic != WIRE_FORMAT_MAGIC {
        return Err(OpenWireError::decode(DecodeErrorKind::BadMagic, 0));
    }
    Ok(WireFormatInfo {
        magic,
        version: r.read_i32::<BigEndian>()?,
        stack_trace_enabled: r.read_u8()? != 0,
        tcp_no_delay_enabled: r.read_u8()? != 0,
        tight_encoding_enabled: r.read_u8()? != 0,
        size_prefix_disabled: r.read_u8()? != 0,
        max_inactivity_duration: r.read_i64::<BigEndian>()?,
        max_inactivity_duration_initial_delay: r.read_i64::<BigEndian>()?,
        cache_size: r.read_i32::<BigEndian>()?,
        cache_enabled: r.read_u8()? != 0,
    })
}

fn marshal_broker_info(c: &BrokerInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.broker_id), w)?;
    write_loose_nullable_string(Some(&c.broker_url), w)?;
    w.write_u8(u8::from(c.slave_broker))?;
    w.write_u8(u8::from(c.master_broker))?;
    w.write_u8(u8::from(c.fault_tolerant_configuration))?;
    Ok(())
}

fn unmarshal_broker_info(r: &mut dyn Read) -> OpenWireResult<BrokerInfo> {
    Ok(BrokerInfo {
        broker_id: read_loose_nullable_string(r)?.unwrap_or_default(),
        broker_url: read_loose_nullable_string(r)?.unwrap_or_default(),
        slave_broker: r.read_u8()? != 0,
        master_broker: r.read_u8()? != 0,
        fault_tolerant_configuration: r.read_u8()? != 0,
        peer_broker_info: None,
    })
}

fn marshal_connection_control(c: &ConnectionControl, w: &mut dyn Write) -> OpenWireResult<()> {
    w.write_u8(u8::from(c.close))?;
    w.write_u8(u8::from(c.exit))?;
    w.write_u8(u8::from(c.fault_tolerant))?;
    w.write_u8(u8::from(c.resume_connection))?;
    w.write_u8(u8::from(c.suspend_connection))?;
    write_loose_nullable_string(c.connected_brokers.as_deref(), w)?;
    write_loose_nullable_string(c.reconnect_to.as_deref(), w)?;
    w.write_u8(u8::from(c.rebalance_connection))?;
    Ok(())
}

fn unmarshal_connection_control(r: &mut dyn Read) -> OpenWireResult<ConnectionControl> {
    Ok(ConnectionControl {
        close: r.read_u8()? != 0,
        exit: r.read_u8()? != 0,
        fault_tolerant: r.read_u8()? != 0,
        resume_connection: r.read_u8()? != 0,
        suspend_connection: r.read_u8()? != 0,
        connected_brokers: read_loose_nullable_string(r)?,
        reconnect_to: read_loose_nullable_string(r)?,
        rebalance_connection: r.read_u8()? != 0,
    })
}

fn marshal_consumer_control(c: &ConsumerControl, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(c.consumer_id.as_ref().map(|id| id.to_string()).as_deref(), w)?;
    w.write_u8(u8::from(c.close))?;
    w.write_i32::<BigEndian>(c.prefetch)?;
    w.write_u8(u8::from(c.flush))?;
    w.write_u8(u8::from(c.start))?;
    w.write_u8(u8::from(c.stop))?;
    Ok(())
}

fn unmarshal_consumer_control(r: &mut dyn Read) -> OpenWireResult<ConsumerControl> {
    // Consumer-id round-tripping through its string form is parsed by the
    // caller once the owning connection is known; left `None` here.
    let _ = read_loose_nullable_string(r)?;
    Ok(ConsumerControl {
        consumer_id: None,
        close: r.read_u8()? != 0,
        prefetch: r.read_i32::<BigEndian>()?,
        flush: r.read_u8()? != 0,
        start: r.read_u8()? != 0,
        stop: r.read_u8()? != 0,
    })
}

fn marshal_message(c: &Message, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.message_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    marshal_destination_opt(c.reply_to.as_ref(), w)?;
    marshal_transaction_id_opt(c.transaction_id.as_ref(), w)?;
    write_loose_nullable_string(c.correlation_id.as_deref(), w)?;
    w.write_u8(u8::from(c.persistent))?;
    w.write_i8(c.priority)?;
    w.write_i64::<BigEndian>(c.timestamp)?;
    w.write_i64::<BigEndian>(c.expiration)?;
    w.write_u8(u8::from(c.redelivered))?;
    w.write_i32::<BigEndian>(c.redelivery_counter)?;
    w.write_i8(c.delivery_mode.0)?;
    write_loose_nullable_string(c.consumer_type_tag.as_deref(), w)?;
    marshal_map(&c.properties, w)?;
    marshal_message_body(&c.body, w)?;
    w.write_u8(u8::from(c.dispatched_from_dlq))?;
    w.write_u8(u8::from(c.compressed))?;
    Ok(())
}

fn unmarshal_message(r: &mut dyn Read) -> OpenWireResult<Message> {
    let message_id = parse_message_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let destination = unmarshal_destination(r)?;
    let reply_to = unmarshal_destination_opt(r)?;
    let transaction_id = unmarshal_transaction_id_opt(r)?;
    let correlation_id = read_loose_nullable_string(r)?;
    let persistent = r.read_u8()? != 0;
    let priority = r.read_i8()?;
    let timestamp = r.read_i64::<BigEndian>()?;
    let expiration = r.read_i64::<BigEndian>()?;
    let redelivered = r.read_u8()? != 0;
    let redelivery_counter = r.read_i32::<BigEndian>()?;
    let delivery_mode = DeliveryMode(r.read_i8()?);
    let consumer_type_tag = read_loose_nullable_string(r)?;
    let properties = unmarshal_map(r)?;
    let body = unmarshal_message_body(r)?;
    let dispatched_from_dlq = r.read_u8()? != 0;
    let compressed = r.read_u8()? != 0;

    Ok(Message {
        producer_id: message_id.producer_id.clone(),
        message_id,
        destination,
        reply_to,
        transaction_id,
        correlation_id,
        persistent,
        priority,
        timestamp,
        expiration,
        redelivered,
        redelivery_counter,
        delivery_mode,
        consumer_type_tag,
        properties,
        body,
        acked: false,
        dispatched_from_dlq,
        compressed,
    })
}

fn marshal_message_body(body: &MessageBody, w: &mut dyn Write) -> OpenWireResult<()> {
    match body {
        MessageBody::Empty => w.write_u8(0)?,
        MessageBody::Text(text) => {
            w.write_u8(1)?;
            write_loose_nullable_string(text.as_deref(), w)?;
        }
        MessageBody::Bytes(bytes) => {
            w.write_u8(2)?;
            write_loose_nullable_bytes(Some(bytes), w)?;
        }
        MessageBody::Map(map) => {
            w.write_u8(3)?;
            marshal_map(map, w)?;
        }
        MessageBody::Stream(items) => {
            w.write_u8(4)?;
            w.write_i32::<BigEndian>(i32::try_from(items.len()).map_err(|_| {
                OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
            })?)?;
            for item in items {
                item.marshal(w)?;
            }
        }
        MessageBody::Object(bytes) => {
            w.write_u8(5)?;
            write_loose_nullable_bytes(Some(bytes), w)?;
        }
        MessageBody::Blob { remote_url, mime_type } => {
            w.write_u8(6)?;
            write_loose_nullable_string(Some(remote_url), w)?;
            write_loose_nullable_string(mime_type.as_deref(), w)?;
        }
    }
    Ok(())
}

fn unmarshal_message_body(r: &mut dyn Read) -> OpenWireResult<MessageBody> {
    Ok(match r.read_u8()? {
        0 => MessageBody::Empty,
        1 => MessageBody::Text(read_loose_nullable_string(r)?),
        2 => MessageBody::Bytes(read_loose_nullable_bytes(r)?.unwrap_or_default()),
        3 => MessageBody::Map(unmarshal_map(r)?),
        4 => {
            let count = r.read_i32::<BigEndian>()?;
            let count = usize::try_from(count).map_err(|_| {
                OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
            })?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(crate::command::primitive_value::PrimitiveValue::unmarshal(r)?);
            }
            MessageBody::Stream(items)
        }
        5 => MessageBody::Object(read_loose_nullable_bytes(r)?.unwrap_or_default()),
        6 => MessageBody::Blob {
            remote_url: read_loose_nullable_string(r)?.unwrap_or_default(),
            mime_type: read_loose_nullable_string(r)?,
        },
        _ => {
            return Err(OpenWireError::decode(
                DecodeErrorKind::UnknownDataStructureType,
                0,
            ))
        }
    })
}

fn marshal_message_ack(c: &MessageAck, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.consumer_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    marshal_transaction_id_opt(c.transaction_id.as_ref(), w)?;
    w.write_i8(c.ack_type.wire_value())?;
    write_loose_nullable_string(c.first_message_id.as_ref().map(ToString::to_string).as_deref(), w)?;
    write_loose_nullable_string(Some(&c.last_message_id.to_string()), w)?;
    w.write_i32::<BigEndian>(c.message_count)?;
    write_loose_nullable_string(c.poison_cause.as_deref(), w)?;
    Ok(())
}

fn unmarshal_message_ack(r: &mut dyn Read) -> OpenWireResult<MessageAck> {
    let consumer_id = parse_consumer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let destination = unmarshal_destination(r)?;
    let transaction_id = unmarshal_transaction_id_opt(r)?;
    let ack_type = parse_ack_type(r.read_i8()?)?;
    let first_message_id = read_loose_nullable_string(r)?
        .map(|raw| parse_message_id(&raw))
        .transpose()?;
    let last_message_id = parse_message_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let message_count = r.read_i32::<BigEndian>()?;
    let poison_cause = read_loose_nullable_string(r)?;

    Ok(MessageAck {
        consumer_id,
        destination,
        transaction_id,
        ack_type,
        first_message_id,
        last_message_id,
        message_count,
        poison_cause,
    })
}

fn parse_ack_type(tag: i8) -> OpenWireResult<AckType> {
    Ok(match tag {
        0 => AckType::Delivered,
        1 => AckType::Poison,
        2 => AckType::Consumed,
        3 => AckType::RedeliveredAck,
        4 => AckType::ConsumedIndividual,
        _ => {
            return Err(OpenWireError::decode(
                DecodeErrorKind::UnknownDataStructureType,
                0,
            ))
        }
    })
}

fn marshal_destination(dest: &Destination, w: &mut dyn Write) -> OpenWireResult<()> {
    w.write_u8(destination_tag(dest))?;
    write_loose_nullable_string(Some(dest.physical_name()), w)?;
    Ok(())
}

fn unmarshal_destination(r: &mut dyn Read) -> OpenWireResult<Destination> {
    let tag = r.read_u8()?;
    let name = read_loose_nullable_string(r)?.unwrap_or_default();
    destination_from_tag(tag, name)
}

fn marshal_destination_opt(dest: Option<&Destination>, w: &mut dyn Write) -> OpenWireResult<()> {
    match dest {
        Some(d) => {
            w.write_u8(1)?;
            marshal_destination(d, w)
        }
        None => Ok(w.write_u8(0)?),
    }
}

fn unmarshal_destination_opt(r: &mut dyn Read) -> OpenWireResult<Option<Destination>> {
    if r.read_u8()? == 0 {
        Ok(None)
    } else {
        Ok(Some(unmarshal_destination(r)?))
    }
}

fn destination_tag(dest: &Destination) -> u8 {
    match dest {
        Destination::Queue(_) => 0,
        Destination::Topic(_) => 1,
        Destination::TempQueue(_) => 2,
        Destination::TempTopic(_) => 3,
    }
}

fn destination_from_tag(tag: u8, name: String) -> OpenWireResult<Destination> {
    Ok(match tag {
        0 => Destination::Queue(PhysicalDestination::new(name)),
        1 => Destination::Topic(PhysicalDestination::new(name)),
        2 => Destination::TempQueue(TemporaryDestination::new(name.clone(), temp_owner(&name))),
        3 => Destination::TempTopic(TemporaryDestination::new(name.clone(), temp_owner(&name))),
        _ => return Err(OpenWireError::decode(DecodeErrorKind::UnknownDataStructureType, 0)),
    })
}

/// Temporary destination names are minted as `<prefix>:<ownerConnId>:<seq>`
/// (`TemporaryDestination::generate`); recover the owner from that middle
/// segment when decoding one off the wire.
fn temp_owner(name: &str) -> ConnectionId {
    name.split(':')
        .nth(1)
        .map(ConnectionId::new)
        .unwrap_or_else(|| ConnectionId::new(name))
}

fn marshal_transaction_id_opt(id: Option<&TransactionId>, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(id.map(ToString::to_string).as_deref(), w)
}

fn unmarshal_transaction_id_opt(r: &mut dyn Read) -> OpenWireResult<Option<TransactionId>> {
    read_loose_nullable_string(r)?.map(|raw| parse_transaction_id(&raw)).transpose()
}

fn malformed_id() -> OpenWireError {
    OpenWireError::decode(DecodeErrorKind::MalformedId, 0)
}

fn parse_session_id(s: &str) -> OpenWireResult<SessionId> {
    let (conn, value) = s.rsplit_once(':').ok_or_else(malformed_id)?;
    Ok(SessionId::new(
        ConnectionId::new(conn),
        value.parse().map_err(|_| malformed_id())?,
    ))
}

fn parse_producer_id(s: &str) -> OpenWireResult<ProducerId> {
    let mut parts = s.rsplitn(3, ':');
    let value = parts.next().ok_or_else(malformed_id)?;
    let session = parts.next().ok_or_else(malformed_id)?;
    let conn = parts.next().ok_or_else(malformed_id)?;
    Ok(ProducerId::new(
        ConnectionId::new(conn),
        session.parse().map_err(|_| malformed_id())?,
        value.parse().map_err(|_| malformed_id())?,
    ))
}

fn parse_consumer_id(s: &str) -> OpenWireResult<ConsumerId> {
    let mut parts = s.rsplitn(3, ':');
    let value = parts.next().ok_or_else(malformed_id)?;
    let session = parts.next().ok_or_else(malformed_id)?;
    let conn = parts.next().ok_or_else(malformed_id)?;
    Ok(ConsumerId::new(
        ConnectionId::new(conn),
        session.parse().map_err(|_| malformed_id())?,
        value.parse().map_err(|_| malformed_id())?,
    ))
}

fn parse_message_id(s: &str) -> OpenWireResult<MessageId> {
    let (producer_part, seq) = s.rsplit_once(':').ok_or_else(malformed_id)?;
    let producer = parse_producer_id(producer_part)?;
    Ok(MessageId::new(producer, seq.parse().map_err(|_| malformed_id())?))
}

fn parse_transaction_id(s: &str) -> OpenWireResult<TransactionId> {
    if let Some(rest) = s.strip_prefix("TX:") {
        let (conn, value) = rest.rsplit_once(':').ok_or_else(malformed_id)?;
        return Ok(TransactionId::Local(LocalTransactionId {
            connection_id: ConnectionId::new(conn),
            value: value.parse().map_err(|_| malformed_id())?,
        }));
    }
    if let Some(rest) = s.strip_prefix("XID:") {
        let mut parts = rest.splitn(3, ':');
        let format_id: i32 = parts.next().ok_or_else(malformed_id)?.parse().map_err(|_| malformed_id())?;
        let global_transaction_id = hex_decode(parts.next().ok_or_else(malformed_id)?)?;
        let branch_qualifier = hex_decode(parts.next().ok_or_else(malformed_id)?)?;
        return Ok(TransactionId::Xa(XaTransactionId {
            format_id,
            global_transaction_id,
            branch_qualifier,
        }));
    }
    Err(malformed_id())
}

fn hex_decode(s: &str) -> OpenWireResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(malformed_id());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| malformed_id()))
        .collect()
}

fn marshal_connection_info(c: &ConnectionInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.connection_id.to_string()), w)?;
    write_loose_nullable_string(Some(&c.client_id), w)?;
    write_loose_nullable_string(c.user_name.as_deref(), w)?;
    write_loose_nullable_string(c.password.as_deref(), w)?;
    w.write_u8(u8::from(c.manage_large_messages))?;
    w.write_u8(u8::from(c.fault_tolerant))?;
    w.write_u8(u8::from(c.failover_reconnect))?;
    Ok(())
}

fn unmarshal_connection_info(r: &mut dyn Read) -> OpenWireResult<ConnectionInfo> {
    Ok(ConnectionInfo {
        connection_id: ConnectionId::new(read_loose_nullable_string(r)?.unwrap_or_default()),
        client_id: read_loose_nullable_string(r)?.unwrap_or_default(),
        user_name: read_loose_nullable_string(r)?,
        password: read_loose_nullable_string(r)?,
        manage_large_messages: r.read_u8()? != 0,
        fault_tolerant: r.read_u8()? != 0,
        failover_reconnect: r.read_u8()? != 0,
    })
}

fn marshal_session_info(c: &SessionInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.session_id.to_string()), w)?;
    w.write_i32::<BigEndian>(c.ack_mode.wire_value())?;
    Ok(())
}

fn unmarshal_session_info(r: &mut dyn Read) -> OpenWireResult<SessionInfo> {
    let session_id = parse_session_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let ack_mode = AckMode::from_wire_value(r.read_i32::<BigEndian>()?).ok_or_else(malformed_id)?;
    Ok(SessionInfo { session_id, ack_mode })
}

fn marshal_producer_info(c: &ProducerInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.producer_id.to_string()), w)?;
    marshal_destination_opt(c.destination.as_ref(), w)?;
    w.write_i32::<BigEndian>(c.window_size)?;
    w.write_u8(u8::from(c.dispatch_async))?;
    Ok(())
}

fn unmarshal_producer_info(r: &mut dyn Read) -> OpenWireResult<ProducerInfo> {
    let producer_id = parse_producer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let destination = unmarshal_destination_opt(r)?;
    let window_size = r.read_i32::<BigEndian>()?;
    let dispatch_async = r.read_u8()? != 0;
    Ok(ProducerInfo { producer_id, destination, window_size, dispatch_async })
}

fn marshal_consumer_info(c: &ConsumerInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.consumer_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    w.write_i32::<BigEndian>(c.prefetch_size)?;
    w.write_i8(c.priority)?;
    w.write_u8(u8::from(c.browser))?;
    w.write_u8(u8::from(c.dispatch_async))?;
    w.write_u8(u8::from(c.exclusive))?;
    w.write_u8(u8::from(c.retroactive))?;
    w.write_u8(u8::from(c.no_local))?;
    write_loose_nullable_string(c.selector.as_deref(), w)?;
    write_loose_nullable_string(c.subscription_name.as_deref(), w)?;
    Ok(())
}

fn unmarshal_consumer_info(r: &mut dyn Read) -> OpenWireResult<ConsumerInfo> {
    let consumer_id = parse_consumer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let destination = unmarshal_destination(r)?;
    let prefetch_size = r.read_i32::<BigEndian>()?;
    let priority = r.read_i8()?;
    let browser = r.read_u8()? != 0;
    let dispatch_async = r.read_u8()? != 0;
    let exclusive = r.read_u8()? != 0;
    let retroactive = r.read_u8()? != 0;
    let no_local = r.read_u8()? != 0;
    let selector = read_loose_nullable_string(r)?;
    let subscription_name = read_loose_nullable_string(r)?;
    Ok(ConsumerInfo {
        consumer_id,
        destination,
        prefetch_size,
        priority,
        browser,
        dispatch_async,
        exclusive,
        retroactive,
        no_local,
        selector,
        subscription_name,
    })
}

fn marshal_destination_info(c: &DestinationInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.connection_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    w.write_i8(c.operation_type)?;
    Ok(())
}

fn unmarshal_destination_info(r: &mut dyn Read) -> OpenWireResult<DestinationInfo> {
    Ok(DestinationInfo {
        connection_id: ConnectionId::new(read_loose_nullable_string(r)?.unwrap_or_default()),
        destination: unmarshal_destination(r)?,
        operation_type: r.read_i8()?,
    })
}

fn marshal_remove_info(c: &RemoveInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    let (tag, value) = removable_id_tag_and_value(&c.object_id);
    w.write_u8(tag)?;
    write_loose_nullable_string(Some(&value), w)?;
    Ok(())
}

fn unmarshal_remove_info(r: &mut dyn Read) -> OpenWireResult<RemoveInfo> {
    let tag = r.read_u8()?;
    let raw = read_loose_nullable_string(r)?.unwrap_or_default();
    Ok(RemoveInfo { object_id: removable_id_from_tag(tag, &raw)? })
}

fn removable_id_tag_and_value(id: &RemovableId) -> (u8, String) {
    match id {
        RemovableId::Connection(id) => (0, id.to_string()),
        RemovableId::Session(id) => (1, id.to_string()),
        RemovableId::Producer(id) => (2, id.to_string()),
        RemovableId::Consumer(id) => (3, id.to_string()),
    }
}

fn removable_id_from_tag(tag: u8, raw: &str) -> OpenWireResult<RemovableId> {
    Ok(match tag {
        0 => RemovableId::Connection(ConnectionId::new(raw)),
        1 => RemovableId::Session(parse_session_id(raw)?),
        2 => RemovableId::Producer(parse_producer_id(raw)?),
        3 => RemovableId::Consumer(parse_consumer_id(raw)?),
        _ => return Err(OpenWireError::decode(DecodeErrorKind::UnknownDataStructureType, 0)),
    })
}

fn marshal_remove_subscription_info(c: &RemoveSubscriptionInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.connection_id.to_string()), w)?;
    write_loose_nullable_string(Some(&c.client_id), w)?;
    write_loose_nullable_string(Some(&c.subscription_name), w)?;
    Ok(())
}

fn unmarshal_remove_subscription_info(r: &mut dyn Read) -> OpenWireResult<RemoveSubscriptionInfo> {
    Ok(RemoveSubscriptionInfo {
        connection_id: ConnectionId::new(read_loose_nullable_string(r)?.unwrap_or_default()),
        client_id: read_loose_nullable_string(r)?.unwrap_or_default(),
        subscription_name: read_loose_nullable_string(r)?.unwrap_or_default(),
    })
}

fn marshal_message_pull(c: &MessagePull, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.consumer_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    w.write_i64::<BigEndian>(c.timeout)?;
    Ok(())
}

fn unmarshal_message_pull(r: &mut dyn Read) -> OpenWireResult<MessagePull> {
    Ok(MessagePull {
        consumer_id: parse_consumer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?,
        destination: unmarshal_destination(r)?,
        timeout: r.read_i64::<BigEndian>()?,
    })
}

fn marshal_message_dispatch(c: &MessageDispatch, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.consumer_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    match &c.message {
        Some(message) => {
            w.write_u8(1)?;
            marshal_message(message, w)?;
        }
        None => w.write_u8(0)?,
    }
    w.write_i32::<BigEndian>(c.redelivery_counter)?;
    Ok(())
}

fn unmarshal_message_dispatch(r: &mut dyn Read) -> OpenWireResult<MessageDispatch> {
    let consumer_id = parse_consumer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let destination = unmarshal_destination(r)?;
    let message = if r.read_u8()? == 0 { None } else { Some(unmarshal_message(r)?) };
    let redelivery_counter = r.read_i32::<BigEndian>()?;
    Ok(MessageDispatch { consumer_id, destination, message, redelivery_counter })
}

fn marshal_message_dispatch_notification(c: &MessageDispatchNotification, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.consumer_id.to_string()), w)?;
    marshal_destination(&c.destination, w)?;
    write_loose_nullable_string(Some(&c.message_id.to_string()), w)?;
    Ok(())
}

fn unmarshal_message_dispatch_notification(r: &mut dyn Read) -> OpenWireResult<MessageDispatchNotification> {
    Ok(MessageDispatchNotification {
        consumer_id: parse_consumer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?,
        destination: unmarshal_destination(r)?,
        message_id: parse_message_id(&read_loose_nullable_string(r)?.unwrap_or_default())?,
    })
}

fn marshal_producer_ack(c: &ProducerAck, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.producer_id.to_string()), w)?;
    w.write_i32::<BigEndian>(c.size)?;
    Ok(())
}

fn unmarshal_producer_ack(r: &mut dyn Read) -> OpenWireResult<ProducerAck> {
    Ok(ProducerAck {
        producer_id: parse_producer_id(&read_loose_nullable_string(r)?.unwrap_or_default())?,
        size: r.read_i32::<BigEndian>()?,
    })
}

fn marshal_transaction_info(c: &TransactionInfo, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.connection_id.to_string()), w)?;
    write_loose_nullable_string(Some(&c.transaction_id.to_string()), w)?;
    w.write_i8(c.operation.wire_value())?;
    Ok(())
}

fn unmarshal_transaction_info(r: &mut dyn Read) -> OpenWireResult<TransactionInfo> {
    let connection_id = ConnectionId::new(read_loose_nullable_string(r)?.unwrap_or_default());
    let transaction_id = parse_transaction_id(&read_loose_nullable_string(r)?.unwrap_or_default())?;
    let operation = parse_transaction_operation(r.read_i8()?)?;
    Ok(TransactionInfo { connection_id, transaction_id, operation })
}

fn parse_transaction_operation(tag: i8) -> OpenWireResult<TransactionOperation> {
    Ok(match tag {
        0 => TransactionOperation::Begin,
        1 => TransactionOperation::Prepare,
        2 => TransactionOperation::CommitOnePhase,
        3 => TransactionOperation::CommitTwoPhase,
        4 => TransactionOperation::Rollback,
        5 => TransactionOperation::Recover,
        6 => TransactionOperation::Forget,
        7 => TransactionOperation::End,
        _ => return Err(OpenWireError::decode(DecodeErrorKind::UnknownDataStructureType, 0)),
    })
}

fn marshal_broker_error(c: &BrokerError, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(Some(&c.exception_class), w)?;
    write_loose_nullable_string(Some(&c.message), w)?;
    write_loose_nullable_string(c.stack_trace.as_deref(), w)?;
    match &c.cause {
        Some(cause) => {
            w.write_u8(1)?;
            marshal_broker_error(cause, w)?;
        }
        None => w.write_u8(0)?,
    }
    Ok(())
}

fn unmarshal_broker_error(r: &mut dyn Read) -> OpenWireResult<BrokerError> {
    let exception_class = read_loose_nullable_string(r)?.unwrap_or_default();
    let message = read_loose_nullable_string(r)?.unwrap_or_default();
    let stack_trace = read_loose_nullable_string(r)?;
    let cause = if r.read_u8()? == 0 { None } else { Some(Box::new(unmarshal_broker_error(r)?)) };
    Ok(BrokerError { exception_class, message, stack_trace, cause })
}

fn marshal_exception_response(c: &ExceptionResponse, w: &mut dyn Write) -> OpenWireResult<()> {
    w.write_i32::<BigEndian>(c.correlation_id)?;
    marshal_broker_error(&c.exception, w)?;
    Ok(())
}

fn unmarshal_exception_response(r: &mut dyn Read) -> OpenWireResult<ExceptionResponse> {
    Ok(ExceptionResponse {
        correlation_id: r.read_i32::<BigEndian>()?,
        exception: unmarshal_broker_error(r)?,
    })
}

fn marshal_connection_error(c: &ConnectionError, w: &mut dyn Write) -> OpenWireResult<()> {
    write_loose_nullable_string(c.connection_id.as_ref().map(ToString::to_string).as_deref(), w)?;
    marshal_broker_error(&c.exception, w)?;
    Ok(())
}

fn unmarshal_connection_error(r: &mut dyn Read) -> OpenWireResult<ConnectionError> {
    Ok(ConnectionError {
        connection_id: read_loose_nullable_string(r)?.map(ConnectionId::new),
        exception: unmarshal_broker_error(r)?,
    })
}

fn marshal_replay_command(c: &ReplayCommand, w: &mut dyn Write) -> OpenWireResult<()> {
    w.write_i32::<BigEndian>(c.first_sequence)?;
    w.write_i32::<BigEndian>(c.last_sequence)?;
    Ok(())
}

fn unmarshal_replay_command(r: &mut dyn Read) -> OpenWireResult<ReplayCommand> {
    Ok(ReplayCommand {
        first_sequence: r.read_i32::<BigEndian>()?,
        last_sequence: r.read_i32::<BigEndian>()?,
    })
}

// ---------------------------------------------------------------------
// Tight encoding
// ---------------------------------------------------------------------
//
// Every function below pushes presence/boolean bits into `bits` in exactly
// the order its loose counterpart wrote the matching inline byte, and writes
// the same payload bytes (length-prefixed strings/bytes, raw numerics) to
// `payload` instead of directly to the frame. `marshal_tight` then frames
// the command as `[bits][payload]`; `unmarshal_tight` reads `bits` up front
// and pulls from it in the same order while walking `payload`.

fn marshal_tight(command: &Command) -> OpenWireResult<Vec<u8>> {
    let mut bits = BooleanStream::new();
    let mut payload = Vec::new();
    match command {
        Command::WireFormatInfo(c) => tight_marshal_wire_format_info(c, &mut bits, &mut payload)?,
        Command::KeepAliveInfo(c) => bits.push(c.response_required),
        Command::ShutdownInfo(_) => {}
        Command::ControlCommand(c) => write_tight_nullable_string(Some(&c.command), &mut bits, &mut payload)?,
        Command::FlushCommand(_) => {}
        Command::Response(c) => payload.write_i32::<BigEndian>(c.correlation_id)?,
        Command::Message(c) => tight_marshal_message(c, &mut bits, &mut payload)?,
        Command::MessageAck(c) => tight_marshal_message_ack(c, &mut bits, &mut payload)?,
        Command::BrokerInfo(c) => tight_marshal_broker_info(c, &mut bits, &mut payload)?,
        Command::ConnectionControl(c) => tight_marshal_connection_control(c, &mut bits, &mut payload)?,
        Command::ConsumerControl(c) => tight_marshal_consumer_control(c, &mut bits, &mut payload)?,
        Command::ConnectionInfo(c) => tight_marshal_connection_info(c, &mut bits, &mut payload)?,
        Command::SessionInfo(c) => tight_marshal_session_info(c, &mut bits, &mut payload)?,
        Command::ProducerInfo(c) => tight_marshal_producer_info(c, &mut bits, &mut payload)?,
        Command::ConsumerInfo(c) => tight_marshal_consumer_info(c, &mut bits, &mut payload)?,
        Command::DestinationInfo(c) => tight_marshal_destination_info(c, &mut bits, &mut payload)?,
        Command::RemoveInfo(c) => tight_marshal_remove_info(c, &mut bits, &mut payload)?,
        Command::RemoveSubscriptionInfo(c) => tight_marshal_remove_subscription_info(c, &mut bits, &mut payload)?,
        Command::MessagePull(c) => tight_marshal_message_pull(c, &mut bits, &mut payload)?,
        Command::MessageDispatch(c) => tight_marshal_message_dispatch(c, &mut bits, &mut payload)?,
        Command::MessageDispatchNotification(c) => {
            tight_marshal_message_dispatch_notification(c, &mut bits, &mut payload)?
        }
        Command::ProducerAck(c) => tight_marshal_producer_ack(c, &mut bits, &mut payload)?,
        Command::TransactionInfo(c) => tight_marshal_transaction_info(c, &mut bits, &mut payload)?,
        Command::ExceptionResponse(c) => tight_marshal_exception_response(c, &mut bits, &mut payload)?,
        Command::ConnectionError(c) => tight_marshal_connection_error(c, &mut bits, &mut payload)?,
        Command::ReplayCommand(c) => tight_marshal_replay_command(c, &mut payload)?,
    }
    let mut buf = Vec::new();
    bits.marshal(&mut buf)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn unmarshal_tight(data_structure_type: u8, body: &[u8]) -> OpenWireResult<Command> {
    let mut cursor = Cursor::new(body);
    let mut bits = BooleanStream::unmarshal(&mut cursor)?;
    Ok(match data_structure_type {
        1 => Command::WireFormatInfo(tight_unmarshal_wire_format_info(&mut bits, &mut cursor)?),
        10 => Command::KeepAliveInfo(KeepAliveInfo { response_required: bits.next()? }),
        11 => Command::ShutdownInfo(ShutdownInfo),
        14 => Command::ControlCommand(ControlCommand {
            command: read_tight_nullable_string(&mut bits, &mut cursor)?.unwrap_or_default(),
        }),
        15 => Command::FlushCommand(FlushCommand),
        30 => Command::Response(Response {
            correlation_id: cursor.read_i32::<BigEndian>()?,
        }),
        23 => Command::Message(tight_unmarshal_message(&mut bits, &mut cursor)?),
        22 => Command::MessageAck(tight_unmarshal_message_ack(&mut bits, &mut cursor)?),
        2 => Command::BrokerInfo(tight_unmarshal_broker_info(&mut bits, &mut cursor)?),
        18 => Command::ConnectionControl(tight_unmarshal_connection_control(&mut bits, &mut cursor)?),
        17 => Command::ConsumerControl(tight_unmarshal_consumer_control(&mut bits, &mut cursor)?),
        3 => Command::ConnectionInfo(tight_unmarshal_connection_info(&mut bits, &mut cursor)?),
        4 => Command::SessionInfo(tight_unmarshal_session_info(&mut bits, &mut cursor)?),
        6 => Command::ProducerInfo(tight_unmarshal_producer_info(&mut bits, &mut cursor)?),
        5 => Command::ConsumerInfo(tight_unmarshal_consumer_info(&mut bits, &mut cursor)?),
        8 => Command::DestinationInfo(tight_unmarshal_destination_info(&mut bits, &mut cursor)?),
        12 => Command::RemoveInfo(tight_unmarshal_remove_info(&mut bits, &mut cursor)?),
        9 => Command::RemoveSubscriptionInfo(tight_unmarshal_remove_subscription_info(&mut bits, &mut cursor)?),
        20 => Command::MessagePull(tight_unmarshal_message_pull(&mut bits, &mut cursor)?),
        21 => Command::MessageDispatch(tight_unmarshal_message_dispatch(&mut bits, &mut cursor)?),
        90 => Command::MessageDispatchNotification(tight_unmarshal_message_dispatch_notification(
            &mut bits, &mut cursor,
        )?),
        19 => Command::ProducerAck(tight_unmarshal_producer_ack(&mut bits, &mut cursor)?),
        7 => Command::TransactionInfo(tight_unmarshal_transaction_info(&mut bits, &mut cursor)?),
        31 => Command::ExceptionResponse(tight_unmarshal_exception_response(&mut bits, &mut cursor)?),
        16 => Command::ConnectionError(tight_unmarshal_connection_error(&mut bits, &mut cursor)?),
        65 => Command::ReplayCommand(tight_unmarshal_replay_command(&mut cursor)?),
        _ => {
            return Err(OpenWireError::decode(
                DecodeErrorKind::UnknownDataStructureType,
                0,
            ))
        }
    })
}

fn tight_marshal_wire_format_info(c: &WireFormatInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    payload.write_all(&c.magic)?;
    payload.write_i32::<BigEndian>(c.version)?;
    bits.push(c.stack_trace_enabled);
    bits.push(c.tcp_no_delay_enabled);
    bits.push(c.tight_encoding_enabled);
    bits.push(c.size_prefix_disabled);
    payload.write_i64::<BigEndian>(c.max_inactivity_duration)?;
    payload.write_i64::<BigEndian>(c.max_inactivity_duration_initial_delay)?;
    payload.write_i32::<BigEndian>(c.cache_size)?;
    bits.push(c.cache_enabled);
    Ok(())
}

fn tight_unmarshal_wire_format_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<WireFormatInfo> {
    let mut magic = [0_u8; 8];
    r.read_exact(&mut magic)?;
    if magic != WIRE_FORMAT_MAGIC {
        return Err(OpenWireError::decode(DecodeErrorKind::BadMagic, 0));
    }
    let version = r.read_i32::<BigEndian>()?;
    let stack_trace_enabled = bits.next()?;
    let tcp_no_delay_enabled = bits.next()?;
    let tight_encoding_enabled = bits.next()?;
    let size_prefix_disabled = bits.next()?;
    let max_inactivity_duration = r.read_i64::<BigEndian>()?;
    let max_inactivity_duration_initial_delay = r.read_i64::<BigEndian>()?;
    let cache_size = r.read_i32::<BigEndian>()?;
    let cache_enabled = bits.next()?;
    Ok(WireFormatInfo {
        magic,
        version,
        stack_trace_enabled,
        tcp_no_delay_enabled,
        tight_encoding_enabled,
        size_prefix_disabled,
        max_inactivity_duration,
        max_inactivity_duration_initial_delay,
        cache_size,
        cache_enabled,
    })
}

fn tight_marshal_broker_info(c: &BrokerInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.broker_id), bits, payload)?;
    write_tight_nullable_string(Some(&c.broker_url), bits, payload)?;
    bits.push(c.slave_broker);
    bits.push(c.master_broker);
    bits.push(c.fault_tolerant_configuration);
    Ok(())
}

fn tight_unmarshal_broker_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<BrokerInfo> {
    let broker_id = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    let broker_url = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    let slave_broker = bits.next()?;
    let master_broker = bits.next()?;
    let fault_tolerant_configuration = bits.next()?;
    Ok(BrokerInfo {
        broker_id,
        broker_url,
        slave_broker,
        master_broker,
        fault_tolerant_configuration,
        peer_broker_info: None,
    })
}

fn tight_marshal_connection_control(c: &ConnectionControl, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    bits.push(c.close);
    bits.push(c.exit);
    bits.push(c.fault_tolerant);
    bits.push(c.resume_connection);
    bits.push(c.suspend_connection);
    write_tight_nullable_string(c.connected_brokers.as_deref(), bits, payload)?;
    write_tight_nullable_string(c.reconnect_to.as_deref(), bits, payload)?;
    bits.push(c.rebalance_connection);
    Ok(())
}

fn tight_unmarshal_connection_control(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ConnectionControl> {
    let close = bits.next()?;
    let exit = bits.next()?;
    let fault_tolerant = bits.next()?;
    let resume_connection = bits.next()?;
    let suspend_connection = bits.next()?;
    let connected_brokers = read_tight_nullable_string(bits, r)?;
    let reconnect_to = read_tight_nullable_string(bits, r)?;
    let rebalance_connection = bits.next()?;
    Ok(ConnectionControl {
        close,
        exit,
        fault_tolerant,
        resume_connection,
        suspend_connection,
        connected_brokers,
        reconnect_to,
        rebalance_connection,
    })
}

fn tight_marshal_consumer_control(c: &ConsumerControl, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(c.consumer_id.as_ref().map(|id| id.to_string()).as_deref(), bits, payload)?;
    bits.push(c.close);
    payload.write_i32::<BigEndian>(c.prefetch)?;
    bits.push(c.flush);
    bits.push(c.start);
    bits.push(c.stop);
    Ok(())
}

fn tight_unmarshal_consumer_control(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ConsumerControl> {
    let _ = read_tight_nullable_string(bits, r)?;
    let close = bits.next()?;
    let prefetch = r.read_i32::<BigEndian>()?;
    let flush = bits.next()?;
    let start = bits.next()?;
    let stop = bits.next()?;
    Ok(ConsumerControl { consumer_id: None, close, prefetch, flush, start, stop })
}

fn tight_marshal_message(c: &Message, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.message_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    tight_marshal_destination_opt(c.reply_to.as_ref(), bits, payload)?;
    tight_marshal_transaction_id_opt(c.transaction_id.as_ref(), bits, payload)?;
    write_tight_nullable_string(c.correlation_id.as_deref(), bits, payload)?;
    bits.push(c.persistent);
    payload.write_i8(c.priority)?;
    payload.write_i64::<BigEndian>(c.timestamp)?;
    payload.write_i64::<BigEndian>(c.expiration)?;
    bits.push(c.redelivered);
    payload.write_i32::<BigEndian>(c.redelivery_counter)?;
    payload.write_i8(c.delivery_mode.0)?;
    write_tight_nullable_string(c.consumer_type_tag.as_deref(), bits, payload)?;
    marshal_map(&c.properties, payload)?;
    tight_marshal_message_body(&c.body, bits, payload)?;
    bits.push(c.dispatched_from_dlq);
    bits.push(c.compressed);
    Ok(())
}

fn tight_unmarshal_message(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<Message> {
    let message_id = parse_message_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination(bits, r)?;
    let reply_to = tight_unmarshal_destination_opt(bits, r)?;
    let transaction_id = tight_unmarshal_transaction_id_opt(bits, r)?;
    let correlation_id = read_tight_nullable_string(bits, r)?;
    let persistent = bits.next()?;
    let priority = r.read_i8()?;
    let timestamp = r.read_i64::<BigEndian>()?;
    let expiration = r.read_i64::<BigEndian>()?;
    let redelivered = bits.next()?;
    let redelivery_counter = r.read_i32::<BigEndian>()?;
    let delivery_mode = DeliveryMode(r.read_i8()?);
    let consumer_type_tag = read_tight_nullable_string(bits, r)?;
    let properties = unmarshal_map(r)?;
    let body = tight_unmarshal_message_body(bits, r)?;
    let dispatched_from_dlq = bits.next()?;
    let compressed = bits.next()?;

    Ok(Message {
        producer_id: message_id.producer_id.clone(),
        message_id,
        destination,
        reply_to,
        transaction_id,
        correlation_id,
        persistent,
        priority,
        timestamp,
        expiration,
        redelivered,
        redelivery_counter,
        delivery_mode,
        consumer_type_tag,
        properties,
        body,
        acked: false,
        dispatched_from_dlq,
        compressed,
    })
}

fn tight_marshal_message_body(body: &MessageBody, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    match body {
        MessageBody::Empty => payload.write_u8(0)?,
        MessageBody::Text(text) => {
            payload.write_u8(1)?;
            write_tight_nullable_string(text.as_deref(), bits, payload)?;
        }
        MessageBody::Bytes(bytes) => {
            payload.write_u8(2)?;
            write_tight_nullable_bytes(Some(bytes), bits, payload)?;
        }
        MessageBody::Map(map) => {
            payload.write_u8(3)?;
            marshal_map(map, payload)?;
        }
        MessageBody::Stream(items) => {
            payload.write_u8(4)?;
            payload.write_i32::<BigEndian>(i32::try_from(items.len()).map_err(|_| {
                OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
            })?)?;
            for item in items {
                item.marshal(payload)?;
            }
        }
        MessageBody::Object(bytes) => {
            payload.write_u8(5)?;
            write_tight_nullable_bytes(Some(bytes), bits, payload)?;
        }
        MessageBody::Blob { remote_url, mime_type } => {
            payload.write_u8(6)?;
            write_tight_nullable_string(Some(remote_url), bits, payload)?;
            write_tight_nullable_string(mime_type.as_deref(), bits, payload)?;
        }
    }
    Ok(())
}

fn tight_unmarshal_message_body(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<MessageBody> {
    Ok(match r.read_u8()? {
        0 => MessageBody::Empty,
        1 => MessageBody::Text(read_tight_nullable_string(bits, r)?),
        2 => MessageBody::Bytes(read_tight_nullable_bytes(bits, r)?.unwrap_or_default()),
        3 => MessageBody::Map(unmarshal_map(r)?),
        4 => {
            let count = r.read_i32::<BigEndian>()?;
            let count = usize::try_from(count).map_err(|_| {
                OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
            })?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(crate::command::primitive_value::PrimitiveValue::unmarshal(r)?);
            }
            MessageBody::Stream(items)
        }
        5 => MessageBody::Object(read_tight_nullable_bytes(bits, r)?.unwrap_or_default()),
        6 => MessageBody::Blob {
            remote_url: read_tight_nullable_string(bits, r)?.unwrap_or_default(),
            mime_type: read_tight_nullable_string(bits, r)?,
        },
        _ => {
            return Err(OpenWireError::decode(
                DecodeErrorKind::UnknownDataStructureType,
                0,
            ))
        }
    })
}

fn tight_marshal_message_ack(c: &MessageAck, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.consumer_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    tight_marshal_transaction_id_opt(c.transaction_id.as_ref(), bits, payload)?;
    payload.write_i8(c.ack_type.wire_value())?;
    write_tight_nullable_string(c.first_message_id.as_ref().map(ToString::to_string).as_deref(), bits, payload)?;
    write_tight_nullable_string(Some(&c.last_message_id.to_string()), bits, payload)?;
    payload.write_i32::<BigEndian>(c.message_count)?;
    write_tight_nullable_string(c.poison_cause.as_deref(), bits, payload)?;
    Ok(())
}

fn tight_unmarshal_message_ack(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<MessageAck> {
    let consumer_id = parse_consumer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination(bits, r)?;
    let transaction_id = tight_unmarshal_transaction_id_opt(bits, r)?;
    let ack_type = parse_ack_type(r.read_i8()?)?;
    let first_message_id = read_tight_nullable_string(bits, r)?
        .map(|raw| parse_message_id(&raw))
        .transpose()?;
    let last_message_id = parse_message_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let message_count = r.read_i32::<BigEndian>()?;
    let poison_cause = read_tight_nullable_string(bits, r)?;
    Ok(MessageAck {
        consumer_id,
        destination,
        transaction_id,
        ack_type,
        first_message_id,
        last_message_id,
        message_count,
        poison_cause,
    })
}

fn tight_marshal_destination(dest: &Destination, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    payload.write_u8(destination_tag(dest))?;
    write_tight_nullable_string(Some(dest.physical_name()), bits, payload)?;
    Ok(())
}

fn tight_unmarshal_destination(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<Destination> {
    let tag = r.read_u8()?;
    let name = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    destination_from_tag(tag, name)
}

fn tight_marshal_destination_opt(dest: Option<&Destination>, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    bits.push(dest.is_some());
    if let Some(d) = dest {
        tight_marshal_destination(d, bits, payload)?;
    }
    Ok(())
}

fn tight_unmarshal_destination_opt(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<Option<Destination>> {
    if bits.next()? {
        Ok(Some(tight_unmarshal_destination(bits, r)?))
    } else {
        Ok(None)
    }
}

fn tight_marshal_transaction_id_opt(id: Option<&TransactionId>, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(id.map(ToString::to_string).as_deref(), bits, payload)
}

fn tight_unmarshal_transaction_id_opt(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<Option<TransactionId>> {
    read_tight_nullable_string(bits, r)?.map(|raw| parse_transaction_id(&raw)).transpose()
}

fn tight_marshal_connection_info(c: &ConnectionInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.connection_id.to_string()), bits, payload)?;
    write_tight_nullable_string(Some(&c.client_id), bits, payload)?;
    write_tight_nullable_string(c.user_name.as_deref(), bits, payload)?;
    write_tight_nullable_string(c.password.as_deref(), bits, payload)?;
    bits.push(c.manage_large_messages);
    bits.push(c.fault_tolerant);
    bits.push(c.failover_reconnect);
    Ok(())
}

fn tight_unmarshal_connection_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ConnectionInfo> {
    let connection_id = ConnectionId::new(read_tight_nullable_string(bits, r)?.unwrap_or_default());
    let client_id = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    let user_name = read_tight_nullable_string(bits, r)?;
    let password = read_tight_nullable_string(bits, r)?;
    let manage_large_messages = bits.next()?;
    let fault_tolerant = bits.next()?;
    let failover_reconnect = bits.next()?;
    Ok(ConnectionInfo {
        connection_id,
        client_id,
        user_name,
        password,
        manage_large_messages,
        fault_tolerant,
        failover_reconnect,
    })
}

fn tight_marshal_session_info(c: &SessionInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.session_id.to_string()), bits, payload)?;
    payload.write_i32::<BigEndian>(c.ack_mode.wire_value())?;
    Ok(())
}

fn tight_unmarshal_session_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<SessionInfo> {
    let session_id = parse_session_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let ack_mode = AckMode::from_wire_value(r.read_i32::<BigEndian>()?).ok_or_else(malformed_id)?;
    Ok(SessionInfo { session_id, ack_mode })
}

fn tight_marshal_producer_info(c: &ProducerInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.producer_id.to_string()), bits, payload)?;
    tight_marshal_destination_opt(c.destination.as_ref(), bits, payload)?;
    payload.write_i32::<BigEndian>(c.window_size)?;
    bits.push(c.dispatch_async);
    Ok(())
}

fn tight_unmarshal_producer_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ProducerInfo> {
    let producer_id = parse_producer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination_opt(bits, r)?;
    let window_size = r.read_i32::<BigEndian>()?;
    let dispatch_async = bits.next()?;
    Ok(ProducerInfo { producer_id, destination, window_size, dispatch_async })
}

fn tight_marshal_consumer_info(c: &ConsumerInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.consumer_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    payload.write_i32::<BigEndian>(c.prefetch_size)?;
    payload.write_i8(c.priority)?;
    bits.push(c.browser);
    bits.push(c.dispatch_async);
    bits.push(c.exclusive);
    bits.push(c.retroactive);
    bits.push(c.no_local);
    write_tight_nullable_string(c.selector.as_deref(), bits, payload)?;
    write_tight_nullable_string(c.subscription_name.as_deref(), bits, payload)?;
    Ok(())
}

fn tight_unmarshal_consumer_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ConsumerInfo> {
    let consumer_id = parse_consumer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination(bits, r)?;
    let prefetch_size = r.read_i32::<BigEndian>()?;
    let priority = r.read_i8()?;
    let browser = bits.next()?;
    let dispatch_async = bits.next()?;
    let exclusive = bits.next()?;
    let retroactive = bits.next()?;
    let no_local = bits.next()?;
    let selector = read_tight_nullable_string(bits, r)?;
    let subscription_name = read_tight_nullable_string(bits, r)?;
    Ok(ConsumerInfo {
        consumer_id,
        destination,
        prefetch_size,
        priority,
        browser,
        dispatch_async,
        exclusive,
        retroactive,
        no_local,
        selector,
        subscription_name,
    })
}

fn tight_marshal_destination_info(c: &DestinationInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.connection_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    payload.write_i8(c.operation_type)?;
    Ok(())
}

fn tight_unmarshal_destination_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<DestinationInfo> {
    let connection_id = ConnectionId::new(read_tight_nullable_string(bits, r)?.unwrap_or_default());
    let destination = tight_unmarshal_destination(bits, r)?;
    let operation_type = r.read_i8()?;
    Ok(DestinationInfo { connection_id, destination, operation_type })
}

fn tight_marshal_remove_info(c: &RemoveInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    let (tag, value) = removable_id_tag_and_value(&c.object_id);
    payload.write_u8(tag)?;
    write_tight_nullable_string(Some(&value), bits, payload)?;
    Ok(())
}

fn tight_unmarshal_remove_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<RemoveInfo> {
    let tag = r.read_u8()?;
    let raw = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    Ok(RemoveInfo { object_id: removable_id_from_tag(tag, &raw)? })
}

fn tight_marshal_remove_subscription_info(c: &RemoveSubscriptionInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.connection_id.to_string()), bits, payload)?;
    write_tight_nullable_string(Some(&c.client_id), bits, payload)?;
    write_tight_nullable_string(Some(&c.subscription_name), bits, payload)?;
    Ok(())
}

fn tight_unmarshal_remove_subscription_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<RemoveSubscriptionInfo> {
    Ok(RemoveSubscriptionInfo {
        connection_id: ConnectionId::new(read_tight_nullable_string(bits, r)?.unwrap_or_default()),
        client_id: read_tight_nullable_string(bits, r)?.unwrap_or_default(),
        subscription_name: read_tight_nullable_string(bits, r)?.unwrap_or_default(),
    })
}

fn tight_marshal_message_pull(c: &MessagePull, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.consumer_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    payload.write_i64::<BigEndian>(c.timeout)?;
    Ok(())
}

fn tight_unmarshal_message_pull(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<MessagePull> {
    let consumer_id = parse_consumer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination(bits, r)?;
    let timeout = r.read_i64::<BigEndian>()?;
    Ok(MessagePull { consumer_id, destination, timeout })
}

fn tight_marshal_message_dispatch(c: &MessageDispatch, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.consumer_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    bits.push(c.message.is_some());
    if let Some(message) = &c.message {
        tight_marshal_message(message, bits, payload)?;
    }
    payload.write_i32::<BigEndian>(c.redelivery_counter)?;
    Ok(())
}

fn tight_unmarshal_message_dispatch(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<MessageDispatch> {
    let consumer_id = parse_consumer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination(bits, r)?;
    let message = if bits.next()? { Some(tight_unmarshal_message(bits, r)?) } else { None };
    let redelivery_counter = r.read_i32::<BigEndian>()?;
    Ok(MessageDispatch { consumer_id, destination, message, redelivery_counter })
}

fn tight_marshal_message_dispatch_notification(
    c: &MessageDispatchNotification,
    bits: &mut BooleanStream,
    payload: &mut dyn Write,
) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.consumer_id.to_string()), bits, payload)?;
    tight_marshal_destination(&c.destination, bits, payload)?;
    write_tight_nullable_string(Some(&c.message_id.to_string()), bits, payload)?;
    Ok(())
}

fn tight_unmarshal_message_dispatch_notification(
    bits: &mut BooleanStream,
    r: &mut dyn Read,
) -> OpenWireResult<MessageDispatchNotification> {
    let consumer_id = parse_consumer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let destination = tight_unmarshal_destination(bits, r)?;
    let message_id = parse_message_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    Ok(MessageDispatchNotification { consumer_id, destination, message_id })
}

fn tight_marshal_producer_ack(c: &ProducerAck, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.producer_id.to_string()), bits, payload)?;
    payload.write_i32::<BigEndian>(c.size)?;
    Ok(())
}

fn tight_unmarshal_producer_ack(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ProducerAck> {
    let producer_id = parse_producer_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let size = r.read_i32::<BigEndian>()?;
    Ok(ProducerAck { producer_id, size })
}

fn tight_marshal_transaction_info(c: &TransactionInfo, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.connection_id.to_string()), bits, payload)?;
    write_tight_nullable_string(Some(&c.transaction_id.to_string()), bits, payload)?;
    payload.write_i8(c.operation.wire_value())?;
    Ok(())
}

fn tight_unmarshal_transaction_info(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<TransactionInfo> {
    let connection_id = ConnectionId::new(read_tight_nullable_string(bits, r)?.unwrap_or_default());
    let transaction_id = parse_transaction_id(&read_tight_nullable_string(bits, r)?.unwrap_or_default())?;
    let operation = parse_transaction_operation(r.read_i8()?)?;
    Ok(TransactionInfo { connection_id, transaction_id, operation })
}

fn tight_marshal_broker_error(c: &BrokerError, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(Some(&c.exception_class), bits, payload)?;
    write_tight_nullable_string(Some(&c.message), bits, payload)?;
    write_tight_nullable_string(c.stack_trace.as_deref(), bits, payload)?;
    bits.push(c.cause.is_some());
    if let Some(cause) = &c.cause {
        tight_marshal_broker_error(cause, bits, payload)?;
    }
    Ok(())
}

fn tight_unmarshal_broker_error(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<BrokerError> {
    let exception_class = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    let message = read_tight_nullable_string(bits, r)?.unwrap_or_default();
    let stack_trace = read_tight_nullable_string(bits, r)?;
    let cause = if bits.next()? { Some(Box::new(tight_unmarshal_broker_error(bits, r)?)) } else { None };
    Ok(BrokerError { exception_class, message, stack_trace, cause })
}

fn tight_marshal_exception_response(c: &ExceptionResponse, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    payload.write_i32::<BigEndian>(c.correlation_id)?;
    tight_marshal_broker_error(&c.exception, bits, payload)?;
    Ok(())
}

fn tight_unmarshal_exception_response(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ExceptionResponse> {
    let correlation_id = r.read_i32::<BigEndian>()?;
    let exception = tight_unmarshal_broker_error(bits, r)?;
    Ok(ExceptionResponse { correlation_id, exception })
}

fn tight_marshal_connection_error(c: &ConnectionError, bits: &mut BooleanStream, payload: &mut dyn Write) -> OpenWireResult<()> {
    write_tight_nullable_string(c.connection_id.as_ref().map(ToString::to_string).as_deref(), bits, payload)?;
    tight_marshal_broker_error(&c.exception, bits, payload)?;
    Ok(())
}

fn tight_unmarshal_connection_error(bits: &mut BooleanStream, r: &mut dyn Read) -> OpenWireResult<ConnectionError> {
    let connection_id = read_tight_nullable_string(bits, r)?.map(ConnectionId::new);
    let exception = tight_unmarshal_broker_error(bits, r)?;
    Ok(ConnectionError { connection_id, exception })
}

fn tight_marshal_replay_command(c: &ReplayCommand, payload: &mut dyn Write) -> OpenWireResult<()> {
    payload.write_i32::<BigEndian>(c.first_sequence)?;
    payload.write_i32::<BigEndian>(c.last_sequence)?;
    Ok(())
}

fn tight_unmarshal_replay_command(r: &mut dyn Read) -> OpenWireResult<ReplayCommand> {
    Ok(ReplayCommand {
        first_sequence: r.read_i32::<BigEndian>()?,
        last_sequence: r.read_i32::<BigEndian>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::control::KeepAliveInfo;
    use crate::command::destination::PhysicalDestination;
    use crate::command::ids::{ConnectionId as Conn, ProducerId as Prod};
    use crate::command::message::DeliveryMode;
    use std::collections::BTreeMap;

    #[test]
    fn wire_format_info_round_trips_loose() {
        let original = WireFormatInfo::default();
        let body = marshal_command(7, false, &Command::WireFormatInfo(original.clone()), false).unwrap();
        let (command_id, response_required, decoded) = unmarshal_command(1, &body, false).unwrap();
        assert_eq!(command_id, 7);
        assert!(!response_required);
        match decoded {
            Command::WireFormatInfo(c) => {
                assert_eq!(c.version, original.version);
                assert_eq!(c.magic, original.magic);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn wire_format_info_round_trips_tight() {
        let mut original = WireFormatInfo::default();
        original.tight_encoding_enabled = true;
        original.cache_enabled = false;
        let body = marshal_command(7, true, &Command::WireFormatInfo(original.clone()), true).unwrap();
        let (command_id, response_required, decoded) = unmarshal_command(1, &body, true).unwrap();
        assert_eq!(command_id, 7);
        assert!(response_required);
        match decoded {
            Command::WireFormatInfo(c) => {
                assert_eq!(c.version, original.version);
                assert!(c.tight_encoding_enabled);
                assert_eq!(c.max_inactivity_duration, original.max_inactivity_duration);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn keep_alive_round_trips_both_encodings() {
        for tight in [false, true] {
            let body = marshal_command(
                1,
                false,
                &Command::KeepAliveInfo(KeepAliveInfo { response_required: true }),
                tight,
            )
            .unwrap();
            let (_, _, decoded) = unmarshal_command(10, &body, tight).unwrap();
            match decoded {
                Command::KeepAliveInfo(c) => assert!(c.response_required),
                _ => panic!("wrong variant"),
            }
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = vec![0_u8; 5 + 8];
        bytes.extend_from_slice(&[0; 25]);
        let err = unmarshal_command(1, &bytes, false).unwrap_err();
        assert!(matches!(
            err,
            OpenWireError::Decode { kind: DecodeErrorKind::BadMagic, .. }
        ));
    }

    fn sample_message() -> Message {
        let producer = Prod::new(Conn::new("conn-1"), 2, 3);
        Message {
            message_id: MessageId::new(producer.clone(), 7),
            producer_id: producer,
            destination: Destination::Queue(PhysicalDestination::new("orders")),
            reply_to: None,
            transaction_id: None,
            correlation_id: Some("corr-1".to_string()),
            persistent: true,
            priority: 4,
            timestamp: 1000,
            expiration: 0,
            redelivered: false,
            redelivery_counter: 0,
            delivery_mode: DeliveryMode::PERSISTENT,
            consumer_type_tag: None,
            properties: BTreeMap::new(),
            body: MessageBody::Text(Some("hello".to_string())),
            acked: false,
            dispatched_from_dlq: false,
            compressed: false,
        }
    }

    #[test]
    fn message_round_trips_under_both_encodings() {
        let original = sample_message();
        for tight in [false, true] {
            let body = marshal_command(9, false, &Command::Message(original.clone()), tight).unwrap();
            let (_, _, decoded) = unmarshal_command(23, &body, tight).unwrap();
            match decoded {
                Command::Message(c) => {
                    assert_eq!(c.message_id, original.message_id);
                    assert_eq!(c.body, original.body);
                    assert_eq!(c.correlation_id, original.correlation_id);
                    assert_eq!(c.persistent, original.persistent);
                }
                _ => panic!("wrong variant"),
            }
        }
    }

    #[test]
    fn message_ack_round_trips_under_tight_encoding() {
        let producer = Prod::new(Conn::new("conn-1"), 2, 3);
        let message_id = MessageId::new(producer, 9);
        let ack = MessageAck {
            consumer_id: parse_consumer_id("conn-1:2:4").unwrap(),
            destination: Destination::Queue(PhysicalDestination::new("orders")),
            transaction_id: None,
            ack_type: AckType::RedeliveredAck,
            first_message_id: Some(message_id.clone()),
            last_message_id: message_id,
            message_count: 3,
            poison_cause: None,
        };
        let body = marshal_command(11, false, &Command::MessageAck(ack.clone()), true).unwrap();
        let (_, _, decoded) = unmarshal_command(22, &body, true).unwrap();
        match decoded {
            Command::MessageAck(c) => {
                assert_eq!(c.ack_type, ack.ack_type);
                assert_eq!(c.message_count, ack.message_count);
                assert_eq!(c.last_message_id, ack.last_message_id);
            }
            _ => panic!("wrong variant"),
        }
    }
}

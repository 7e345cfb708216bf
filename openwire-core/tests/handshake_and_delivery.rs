//! End-to-end scenario against a loopback fake broker (spec.md §8): wire
//! format handshake, connection/session/producer/consumer setup, a send
//! followed by dispatch back to the consumer, and auto-ack closing the loop.

use openwire_core::codec::Frame;
use openwire_core::command::codec::{marshal_command, unmarshal_command};
use openwire_core::command::control::WireFormatInfo;
use openwire_core::command::destination::{Destination, PhysicalDestination};
use openwire_core::command::ids::{ConsumerId, MessageId, ProducerId};
use openwire_core::command::info::AckMode;
use openwire_core::command::message::{MessageBody, MessageDispatch};
use openwire_core::command::Command;
use openwire_core::consumer::ConsumerOptions;
use openwire_core::{BrokerUrl, ConnectionKernel};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

async fn read_command<S: AsyncRead + Unpin>(socket: &mut S) -> (i32, bool, Command) {
    let frame = Frame::read(socket).await.expect("frame read");
    unmarshal_command(frame.data_type, &frame.body, false).expect("command decode")
}

async fn write_command<S: AsyncWrite + Unpin>(socket: &mut S, command_id: i32, response_required: bool, command: &Command) {
    let body = marshal_command(command_id, response_required, command, false).expect("command encode");
    Frame::new(command.data_structure_type(), body)
        .write(socket)
        .await
        .expect("frame write");
}

/// Answers one request with a correlated `Response`, returning the decoded
/// command so the caller can read out the ids it assigned.
async fn reply_ok(socket: &mut TcpStream) -> Command {
    let (command_id, response_required, command) = read_command(socket).await;
    assert!(response_required, "expected a response-required command, got {command:?}");
    write_command(socket, 0, false, &Command::Response(openwire_core::command::control::Response {
        correlation_id: command_id,
    }))
    .await;
    command
}

#[tokio::test]
async fn connect_send_and_dispatch_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Handshake: client speaks first (WireFormatNegotiator::start).
        let (_, _, command) = read_command(&mut socket).await;
        assert!(matches!(command, Command::WireFormatInfo(_)));
        write_command(&mut socket, 0, false, &Command::WireFormatInfo(WireFormatInfo::default())).await;

        let _connection_info = reply_ok(&mut socket).await;
        let _session_info = reply_ok(&mut socket).await;
        let _producer_info = reply_ok(&mut socket).await;

        let consumer_info = reply_ok(&mut socket).await;
        let Command::ConsumerInfo(consumer_info) = consumer_info else {
            panic!("expected ConsumerInfo");
        };

        let message_command = reply_ok(&mut socket).await;
        let Command::Message(sent) = message_command else {
            panic!("expected Message");
        };

        // Dispatch the message straight back to the consumer that just sent it,
        // mirroring a broker routing a queue message to its sole consumer.
        let dispatch = MessageDispatch {
            consumer_id: consumer_info.consumer_id.clone(),
            destination: consumer_info.destination.clone(),
            message: Some(sent),
            redelivery_counter: 0,
        };
        write_command(&mut socket, 0, false, &Command::MessageDispatch(dispatch)).await;

        // Consumer's AutoAck fires right after delivery; drain it so the
        // socket does not see a write fail on the other end.
        let (_, response_required, ack) = read_command(&mut socket).await;
        assert!(!response_required);
        assert!(matches!(ack, Command::MessageAck(_)));
    });

    let broker_url: BrokerUrl = format!("tcp://{addr}").parse().unwrap();
    let connection = ConnectionKernel::connect(&broker_url, "test-client").await.unwrap();

    let session = connection.create_session(AckMode::AutoAck).await.unwrap();
    let destination = Destination::Queue(PhysicalDestination::new("orders"));
    let producer = session.create_producer(Some(destination.clone()), 0).await.unwrap();
    let consumer = session
        .create_consumer(destination.clone(), ConsumerOptions::default())
        .await
        .unwrap();

    producer
        .send(
            None,
            MessageBody::Text(Some("hello".to_string())),
            openwire_core::command::message::DeliveryMode::PERSISTENT,
            4,
            0,
            None,
            0,
        )
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), consumer.receive(Some(Duration::from_secs(2))))
        .await
        .expect("receive did not time out")
        .unwrap()
        .expect("a message was dispatched");

    match received.body {
        MessageBody::Text(Some(text)) => assert_eq!(text, "hello"),
        other => panic!("unexpected body: {other:?}"),
    }

    broker.await.unwrap();
}

/// Sanity check that the hierarchical id string forms this crate relies on
/// for destination temp-owner recovery round-trip through `Display`
/// (spec.md §3 "Identifiers"), independent of any live broker.
#[test]
fn message_id_display_matches_expected_shape() {
    let producer = ProducerId::new(openwire_core::command::ids::ConnectionId::new("conn-7"), 2, 5);
    let message_id = MessageId::new(producer, 11);
    assert_eq!(message_id.to_string(), "conn-7:2:5:11");

    let consumer = ConsumerId::new(openwire_core::command::ids::ConnectionId::new("conn-7"), 2, 9);
    assert_eq!(consumer.to_string(), "conn-7:2:9");
}

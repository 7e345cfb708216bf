//! Control, negotiation, and response commands (spec.md §4.2, §4.6).
//!
//! Grounded on `activemq-cpp/src/main/activemq/commands/{WireFormatInfo,
//! BrokerInfo,KeepAliveInfo,ShutdownInfo,ConnectionControl,ConsumerControl,
//! ControlCommand,Response,ExceptionResponse,ConnectionError}.cpp`.

use crate::command::ids::{ConnectionId, ConsumerId};

/// Handshake command each side sends once, immediately on connect
/// (spec.md §5.1). Magic and version negotiation happen before any other
/// command may be exchanged.
#[derive(Debug, Clone)]
pub struct WireFormatInfo {
    pub magic: [u8; 8],
    pub version: i32,
    pub stack_trace_enabled: bool,
    pub tcp_no_delay_enabled: bool,
    pub tight_encoding_enabled: bool,
    pub size_prefix_disabled: bool,
    pub max_inactivity_duration: i64,
    pub max_inactivity_duration_initial_delay: i64,
    pub cache_size: i32,
    pub cache_enabled: bool,
}

pub const WIRE_FORMAT_MAGIC: [u8; 8] = *b"ActiveMQ";

impl Default for WireFormatInfo {
    fn default() -> Self {
        Self {
            magic: WIRE_FORMAT_MAGIC,
            // Matches the source: spec.md §4.1 anchors the default/advertised
            // version at v5.
            version: 5,
            stack_trace_enabled: true,
            tcp_no_delay_enabled: true,
            tight_encoding_enabled: false,
            size_prefix_disabled: false,
            max_inactivity_duration: 30_000,
            max_inactivity_duration_initial_delay: 10_000,
            cache_size: 0,
            cache_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerInfo {
    pub broker_id: String,
    pub broker_url: String,
    pub slave_broker: bool,
    pub master_broker: bool,
    pub fault_tolerant_configuration: bool,
    pub peer_broker_info: Option<Box<BrokerInfo>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAliveInfo {
    pub response_required: bool,
}

#[derive(Debug, Clone)]
pub struct ShutdownInfo;

/// Broker-to-client command telling it to throttle, stop, or reconnect a
/// consumer, or to fail over to a different broker URL entirely
/// (spec.md §5.3 "Broker-initiated control").
#[derive(Debug, Clone)]
pub struct ConnectionControl {
    pub close: bool,
    pub exit: bool,
    pub fault_tolerant: bool,
    pub resume_connection: bool,
    pub suspend_connection: bool,
    pub connected_brokers: Option<String>,
    pub reconnect_to: Option<String>,
    pub rebalance_connection: bool,
}

#[derive(Debug, Clone)]
pub struct ConsumerControl {
    pub consumer_id: Option<ConsumerId>,
    pub close: bool,
    pub prefetch: i32,
    pub flush: bool,
    pub start: bool,
    pub stop: bool,
}

/// Generic out-of-band control signal (spec.md §4.6); `command` names the
/// requested action (e.g. `"shutdown"`), interpreted by the receiving side.
#[derive(Debug, Clone)]
pub struct ControlCommand {
    pub command: String,
}

#[derive(Debug, Clone, Default)]
pub struct FlushCommand;

/// Asks the broker to redeliver commands in `[first_sequence, last_sequence]`,
/// used to recover from a gap detected in `InactivityMonitor`-adjacent
/// sequence tracking (rarely exercised; most brokers do not implement it).
#[derive(Debug, Clone)]
pub struct ReplayCommand {
    pub first_sequence: i32,
    pub last_sequence: i32,
}

/// Correlates to the `commandId` of a prior command sent with
/// `response_required = true` (spec.md §4.2 "Request/response correlation").
#[derive(Debug, Clone)]
pub struct Response {
    pub correlation_id: i32,
}

#[derive(Debug, Clone)]
pub struct ExceptionResponse {
    pub correlation_id: i32,
    pub exception: BrokerError,
}

#[derive(Debug, Clone)]
pub struct BrokerError {
    pub exception_class: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub cause: Option<Box<BrokerError>>,
}

/// Broker-pushed async failure notice, not tied to any specific request
/// (spec.md §5.4 "Asynchronous broker errors"): connection validation
/// failures, resource limits exceeded, or the broker shutting down.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub connection_id: Option<ConnectionId>,
    pub exception: BrokerError,
}

//! Assembles the transport filter stack from a broker URL (spec.md §5.2, §6).
//!
//! `ResponseCorrelator(MutexFilter(InactivityMonitor(WireFormatNegotiator(
//! IoTransport))))`. `AsyncSend` is not wired in by default; it is only
//! worth the extra queueing hop for a connection whose producers/consumers
//! request `dispatchAsync`, so kernels opt into it per-object instead.

use crate::command::control::WireFormatInfo;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::broker_url::BrokerUrl;
use crate::transport::filter::Transport;
use crate::transport::inactivity_monitor::InactivityMonitor;
use crate::transport::io_transport::IoTransport;
use crate::transport::mutex_filter::MutexFilter;
use crate::transport::response_correlator::ResponseCorrelator;
use crate::transport::wireformat_negotiator::WireFormatNegotiator;
use std::sync::Arc;
use std::time::Duration;

pub struct ConnectedStack {
    pub transport: Arc<ResponseCorrelator<MutexFilter<InactivityMonitor<WireFormatNegotiator<IoTransport>>>>>,
    pub negotiator: Arc<WireFormatNegotiator<IoTransport>>,
}

/// Connects to the first reachable endpoint in `broker_url` and assembles
/// the full filter stack on top of it. Failover across the remaining
/// endpoints is the caller's concern (spec.md §6 "Failover transport"
/// Open Question, resolved in DESIGN.md as a connection-kernel-level retry
/// loop rather than a transport-layer one, since reconnect needs to replay
/// kernel state the transport layer has no visibility into).
pub async fn connect(broker_url: &BrokerUrl) -> OpenWireResult<ConnectedStack> {
    let mut last_err = None;
    for endpoint in &broker_url.endpoints {
        match connect_one(broker_url, endpoint).await {
            Ok(stack) => return Ok(stack),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| OpenWireError::transport("no broker endpoints to connect to")))
}

async fn connect_one(
    broker_url: &BrokerUrl,
    endpoint: &crate::transport::broker_url::BrokerEndpoint,
) -> OpenWireResult<ConnectedStack> {
    let io = Arc::new(IoTransport::connect(endpoint).await?);

    let mut local_wire_format = WireFormatInfo::default();
    local_wire_format.tcp_no_delay_enabled = broker_url.wire_format_options.tcp_no_delay;
    local_wire_format.max_inactivity_duration =
        broker_url.wire_format_options.max_inactivity_duration.as_millis() as i64;
    local_wire_format.tight_encoding_enabled = broker_url.wire_format_options.tight_encoding_enabled;
    let negotiator = WireFormatNegotiator::new(io.clone(), local_wire_format.clone());
    negotiator.install();

    let inactivity = InactivityMonitor::new(
        negotiator.clone(),
        broker_url.wire_format_options.max_inactivity_duration,
    );

    let mutexed = Arc::new(MutexFilter::new(inactivity));
    let correlator = ResponseCorrelator::new(mutexed);
    correlator.install();

    correlator.start().await?;
    let negotiated = negotiator
        .wait_for_negotiation(Duration::from_secs(15))
        .await?;
    io.set_tight_encoding(negotiated.tight_encoding_enabled);

    Ok(ConnectedStack {
        transport: correlator,
        negotiator,
    })
}

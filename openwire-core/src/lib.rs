//! Core client runtime for the OpenWire wire protocol used by ActiveMQ-style
//! message brokers.
//!
//! This crate implements the pieces a JMS-style client needs below the
//! application API: frame codec, command marshaling, the transport filter
//! pipeline (wire format negotiation, inactivity monitoring, response
//! correlation), and the connection/session/consumer/producer kernels that
//! track broker-visible state and acknowledgement policy. It does not
//! provide a JMS-shaped façade; that belongs in a higher-level crate built
//! on top of these kernels.

pub mod codec;
pub mod command;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod session;
pub mod transport;

pub use command::destination::Destination;
pub use connection::ConnectionKernel;
pub use consumer::ConsumerKernel;
pub use error::{OpenWireError, OpenWireResult};
pub use producer::ProducerKernel;
pub use session::SessionKernel;
pub use transport::broker_url::BrokerUrl;

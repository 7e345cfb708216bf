use std::sync::Arc;
use thiserror::Error;

/// The single error type used throughout `openwire-core`.
///
/// Every public operation that can fail returns `OpenWireResult<T>`. Transport-level
/// failures additionally get latched as the connection's "first fault" (see
/// [`crate::connection::ConnectionKernel::first_fault`]); later calls on a broken
/// connection fail with [`OpenWireError::Closed`] wrapping that fault.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum OpenWireError {
    /// A frame or primitive value could not be decoded.
    #[error("decode error at offset {offset}: {kind}")]
    Decode { kind: DecodeErrorKind, offset: usize },

    /// Socket read/write failure, handshake failure, or inactivity timeout.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// An unexpected command arrived for the connection's current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The broker reported a `ConnectionError` or `BrokerError` command.
    #[error("broker error: {message}")]
    Broker {
        message: String,
        server_stack_trace: Option<String>,
    },

    /// The operation was attempted on an object that is already closed.
    #[error("operation attempted on a closed connection")]
    Closed {
        /// The error that originally caused the connection to close, if any.
        first_fault: Option<Box<OpenWireError>>,
    },

    /// A blocking operation exceeded its configured wait.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Misuse of the public API (e.g. `commit()` on a non-transacted session).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A valid but unsupported request, e.g. sending via a bound producer to a
    /// different destination, or enabling broker-side result caching.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A malformed broker connection URL.
    #[error("invalid broker url: {0}")]
    UrlParse(String),
}

/// Sub-kinds of [`OpenWireError::Decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("frame truncated")]
    TruncatedFrame,
    #[error("frame size exceeds configured maximum")]
    FrameTooLarge,
    #[error("unknown data-structure type")]
    UnknownDataStructureType,
    #[error("malformed modified utf-8")]
    MalformedModifiedUtf8,
    #[error("integer overflow in size field")]
    SizeOverflow,
    #[error("wire format magic mismatch")]
    BadMagic,
    #[error("primitive value tag not recognized")]
    UnknownPrimitiveTag,
    #[error("malformed hierarchical id")]
    MalformedId,
}

pub type OpenWireResult<T> = std::result::Result<T, OpenWireError>;

impl OpenWireError {
    pub fn decode(kind: DecodeErrorKind, offset: usize) -> Self {
        Self::Decode { kind, offset }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn closed(first_fault: Option<OpenWireError>) -> Self {
        Self::Closed {
            first_fault: first_fault.map(Box::new),
        }
    }

    /// True if this error should be latched as the connection's first fault and
    /// turns every subsequent public call into [`OpenWireError::Closed`].
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Transport { .. } | Self::Protocol(_)
        )
    }

}

impl From<std::io::Error> for OpenWireError {
    fn from(source: std::io::Error) -> Self {
        Self::Transport {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }
}

impl From<url::ParseError> for OpenWireError {
    fn from(source: url::ParseError) -> Self {
        Self::UrlParse(source.to_string())
    }
}

//! Hierarchical identifiers (spec.md §3 "Identifiers").
//!
//! Grounded on `activemq-cpp/src/main/activemq/commands/{ConnectionId,SessionId,
//! ProducerId,ConsumerId,MessageId}.cpp`: each id is a small value object with
//! equality/hashing and a canonical string form, carried by the commands that
//! reference it.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub connection_id: ConnectionId,
    pub value: u64,
}

impl SessionId {
    pub fn new(connection_id: ConnectionId, value: u64) -> Self {
        Self {
            connection_id,
            value,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId {
    pub connection_id: ConnectionId,
    pub session_id: u64,
    pub value: u64,
}

impl ProducerId {
    pub fn new(connection_id: ConnectionId, session_id: u64, value: u64) -> Self {
        Self {
            connection_id,
            session_id,
            value,
        }
    }

    pub fn parent_session_id(&self) -> SessionId {
        SessionId::new(self.connection_id.clone(), self.session_id)
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId {
    pub connection_id: ConnectionId,
    pub session_id: u64,
    pub value: u64,
}

impl ConsumerId {
    pub fn new(connection_id: ConnectionId, session_id: u64, value: u64) -> Self {
        Self {
            connection_id,
            session_id,
            value,
        }
    }

    /// Invariant (3): `ConsumerId.sessionId` equals the owning session's id component.
    pub fn belongs_to(&self, session_id: &SessionId) -> bool {
        self.connection_id == session_id.connection_id && self.session_id == session_id.value
    }

    pub fn parent_session_id(&self) -> SessionId {
        SessionId::new(self.connection_id.clone(), self.session_id)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

/// `MessageId = (ProducerId, producerSequenceId)`.
///
/// Its string form `<producerId>:<seq>` is the primary key used for deduplication
/// and for the `firstMessageId`/`lastMessageId` range carried by `MessageAck`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub producer_id: ProducerId,
    pub producer_sequence_id: u64,
}

impl MessageId {
    pub fn new(producer_id: ProducerId, producer_sequence_id: u64) -> Self {
        Self {
            producer_id,
            producer_sequence_id,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer_id, self.producer_sequence_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_string_form_matches_spec() {
        let conn = ConnectionId::new("conn-1");
        let prod = ProducerId::new(conn, 7, 3);
        let msg = MessageId::new(prod, 42);
        assert_eq!(msg.to_string(), "conn-1:7:3:42");
    }

    #[test]
    fn consumer_id_belongs_to_its_session() {
        let conn = ConnectionId::new("conn-1");
        let session = SessionId::new(conn.clone(), 5);
        let consumer = ConsumerId::new(conn, 5, 1);
        assert!(consumer.belongs_to(&session));
    }
}

//! Transaction ids and the `TransactionInfo` state-machine command
//! (spec.md §3 "Transaction state" and §4.5).
//!
//! Grounded on `activemq-cpp/src/main/activemq/commands/{LocalTransactionId,
//! XATransactionId,TransactionInfo}.cpp`: a transaction id is either a local,
//! connection-scoped counter or a full XA id, and `TransactionInfo.type`
//! distinguishes Begin/Prepare/Commit(1/2-phase)/Rollback/Recover/Forget/End.

use crate::command::ids::ConnectionId;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalTransactionId {
    pub connection_id: ConnectionId,
    pub value: u64,
}

impl fmt::Display for LocalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX:{}:{}", self.connection_id, self.value)
    }
}

/// An XA global transaction id: `formatId` + `globalTransactionId` +
/// `branchQualifier` byte strings, per the JTA `Xid` interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XaTransactionId {
    pub format_id: i32,
    pub global_transaction_id: Vec<u8>,
    pub branch_qualifier: Vec<u8>,
}

impl PartialOrd for XaTransactionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total lexicographic order (spec.md invariant): compares `formatId`, then
/// `globalTransactionId`, then `branchQualifier`, byte by byte. Needed so XA
/// ids can be sorted deterministically when the broker recovers a prepared
/// transaction list.
impl Ord for XaTransactionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.format_id
            .cmp(&other.format_id)
            .then_with(|| self.global_transaction_id.cmp(&other.global_transaction_id))
            .then_with(|| self.branch_qualifier.cmp(&other.branch_qualifier))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionId {
    Local(LocalTransactionId),
    Xa(XaTransactionId),
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "{id}"),
            Self::Xa(id) => write!(
                f,
                "XID:{}:{}:{}",
                id.format_id,
                hex_string(&id.global_transaction_id),
                hex_string(&id.branch_qualifier)
            ),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOperation {
    Begin,
    Prepare,
    CommitOnePhase,
    CommitTwoPhase,
    Rollback,
    Recover,
    Forget,
    End,
}

impl TransactionOperation {
    pub fn wire_value(self) -> i8 {
        match self {
            Self::Begin => 0,
            Self::Prepare => 1,
            Self::CommitOnePhase => 2,
            Self::CommitTwoPhase => 3,
            Self::Rollback => 4,
            Self::Recover => 5,
            Self::Forget => 6,
            Self::End => 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub connection_id: ConnectionId,
    pub transaction_id: TransactionId,
    pub operation: TransactionOperation,
}

/// The client-visible phase of a transaction (spec.md §3 "Transaction
/// state"): `None -> Begun -> Ended -> Prepared -> {Committed, RolledBack}`.
/// `Prepared` only ever occurs for XA transactions; local transactions skip
/// straight from `Ended` to a terminal state via `CommitOnePhase`/`Rollback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    None,
    Begun,
    Ended,
    Prepared,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn can_transition_to(self, next: Self) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (None, Begun)
                | (Begun, Ended)
                | (Ended, Prepared)
                | (Ended, Committed)
                | (Ended, RolledBack)
                | (Prepared, Committed)
                | (Prepared, RolledBack)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xa_ids_order_lexicographically() {
        let a = XaTransactionId {
            format_id: 1,
            global_transaction_id: vec![1],
            branch_qualifier: vec![0],
        };
        let b = XaTransactionId {
            format_id: 1,
            global_transaction_id: vec![2],
            branch_qualifier: vec![0],
        };
        assert!(a < b);
    }

    #[test]
    fn local_transaction_cannot_commit_twice() {
        assert!(TransactionState::None.can_transition_to(TransactionState::Begun));
        assert!(!TransactionState::Committed.can_transition_to(TransactionState::Committed));
    }
}

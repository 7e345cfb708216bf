//! Per-connection transaction registry (spec.md §3 "Transaction state").
//!
//! Grounded on `activemq-cpp/src/main/activemq/core/ActiveMQConnection.cpp`'s
//! `transactions` map: every active local or XA transaction this connection
//! started is tracked here by id so a commit/rollback can be routed to it
//! and its state validated.

use crate::command::transaction::{TransactionId, TransactionState};
use crate::error::{OpenWireError, OpenWireResult};
use std::collections::HashMap;

#[derive(Default)]
pub struct TransactionTable {
    transactions: HashMap<TransactionId, TransactionState>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, id: TransactionId) {
        self.transactions.insert(id, TransactionState::Begun);
    }

    pub fn state_of(&self, id: &TransactionId) -> TransactionState {
        self.transactions.get(id).copied().unwrap_or(TransactionState::None)
    }

    /// Validates and applies a state transition, mirroring the invariant
    /// that a transaction can only move forward through
    /// `None -> Begun -> Ended -> Prepared -> {Committed, RolledBack}`.
    pub fn transition(&mut self, id: &TransactionId, next: TransactionState) -> OpenWireResult<()> {
        let current = self.state_of(id);
        if !current.can_transition_to(next) {
            return Err(OpenWireError::IllegalState(format!(
                "transaction {id} cannot move from {current:?} to {next:?}"
            )));
        }
        self.transactions.insert(id.clone(), next);
        Ok(())
    }

    /// Terminal transactions (`Committed`/`RolledBack`) are removed; there is
    /// nothing further a client call can legally do with them.
    pub fn forget_if_terminal(&mut self, id: &TransactionId) {
        if matches!(
            self.state_of(id),
            TransactionState::Committed | TransactionState::RolledBack
        ) {
            self.transactions.remove(id);
        }
    }

    /// Ids of every transaction still short of a terminal state, surfaced to
    /// `TransactionInfo { operation: Recover }` after a reconnect.
    pub fn recoverable_ids(&self) -> Vec<TransactionId> {
        self.transactions
            .iter()
            .filter(|(_, state)| {
                matches!(state, TransactionState::Begun | TransactionState::Ended | TransactionState::Prepared)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ids::ConnectionId;
    use crate::command::transaction::LocalTransactionId;

    fn sample_id() -> TransactionId {
        TransactionId::Local(LocalTransactionId {
            connection_id: ConnectionId::new("c1"),
            value: 1,
        })
    }

    #[test]
    fn cannot_commit_before_begin() {
        let mut table = TransactionTable::new();
        let id = sample_id();
        assert!(table.transition(&id, TransactionState::Committed).is_err());
    }

    #[test]
    fn full_local_transaction_lifecycle() {
        let mut table = TransactionTable::new();
        let id = sample_id();
        table.begin(id.clone());
        table.transition(&id, TransactionState::Ended).unwrap();
        table.transition(&id, TransactionState::Committed).unwrap();
        table.forget_if_terminal(&id);
        assert_eq!(table.state_of(&id), TransactionState::None);
    }
}

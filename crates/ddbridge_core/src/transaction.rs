//! Transaction state machine.

use crate::error::{CoreError, CoreResult};

/// State of the transaction controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnState {
    /// No transaction is open.
    #[default]
    Idle,
    /// A transaction is open and accepts updates.
    InTransaction,
}

impl TxnState {
    /// Returns the state name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TxnState::Idle => "idle",
            TxnState::InTransaction => "in transaction",
        }
    }
}

/// Tracks whether a transaction is open and rejects out-of-order calls.
///
/// Every check happens before the engine is touched, so a rejected call
/// has no effect.
#[derive(Debug, Default)]
pub struct TransactionController {
    state: TxnState,
}

impl TransactionController {
    /// Creates an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Idle -> InTransaction.
    pub fn begin(&mut self, operation: &'static str) -> CoreResult<()> {
        if self.state != TxnState::Idle {
            return Err(CoreError::invalid_state(operation, self.state.name()));
        }
        self.state = TxnState::InTransaction;
        Ok(())
    }

    /// Fails unless a transaction is open.
    pub fn require_active(&self, operation: &'static str) -> CoreResult<()> {
        if self.state != TxnState::InTransaction {
            return Err(CoreError::invalid_state(operation, self.state.name()));
        }
        Ok(())
    }

    /// InTransaction -> Idle.
    ///
    /// The controller is idle afterwards whatever the engine then reports.
    pub fn finish(&mut self, operation: &'static str) -> CoreResult<()> {
        self.require_active(operation)?;
        self.state = TxnState::Idle;
        Ok(())
    }

    /// Returns to idle after the engine refused to open a transaction.
    pub(crate) fn abort(&mut self) {
        self.state = TxnState::Idle;
    }
}

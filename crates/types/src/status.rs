//! Transaction execution outcomes.

use crate::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome class of a transaction execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Applied in full; state committed.
    Success,
    /// Refused before any state change (bad signature, duplicate, funds).
    Rejected,
    /// The contract reverted; state rolled back, unspent fee refunded.
    Revert,
    /// Execution failed fatally; state rolled back, the whole fee consumed.
    Failed,
}

/// What a transaction does, derived from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActionType {
    /// The status was produced before the transaction was classified:
    /// admission-level refusals such as a bad signature or a duplicate.
    #[default]
    None,
    /// Plain balance transfer between client accounts.
    Transfer,
    /// Message call into an existing contract.
    ContractCall,
    /// Deployment of a new contract.
    ContractCreation,
}

/// The recorded outcome of one transaction: status class, the classified
/// action, a human-readable message, and the portion of the fee left
/// unspent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    status: StatusCode,
    action: ActionType,
    message: String,
    fee_left: Balance,
}

impl TransactionStatus {
    /// A successful outcome.
    pub fn success(fee_left: Balance, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Success,
            action: ActionType::None,
            message: message.into(),
            fee_left,
        }
    }

    /// A rejection before state changes.
    pub fn rejected(fee_left: Balance, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Rejected,
            action: ActionType::None,
            message: message.into(),
            fee_left,
        }
    }

    /// A contract revert.
    pub fn revert(fee_left: Balance, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Revert,
            action: ActionType::None,
            message: message.into(),
            fee_left,
        }
    }

    /// A fatal execution failure.
    pub fn failed(fee_left: Balance, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Failed,
            action: ActionType::None,
            message: message.into(),
            fee_left,
        }
    }

    /// Tags the status with the action the engine classified. Statuses
    /// produced before classification keep [`ActionType::None`].
    pub fn with_action(mut self, action: ActionType) -> Self {
        self.action = action;
        self
    }

    /// The status class.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The classified action.
    pub fn action_type(&self) -> ActionType {
        self.action
    }

    /// The attached message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The unspent portion of the fee.
    pub fn fee_left(&self) -> &Balance {
        &self.fee_left
    }

    /// Whether the transaction was applied.
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Success
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}: {} (fee left {})",
            self.status, self.action, self.message, self.fee_left
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_is_success() {
        assert!(TransactionStatus::success(Balance::zero(), "").is_success());
        assert!(!TransactionStatus::rejected(Balance::zero(), "").is_success());
        assert!(!TransactionStatus::revert(Balance::zero(), "").is_success());
        assert!(!TransactionStatus::failed(Balance::zero(), "").is_success());
    }

    #[test]
    fn action_defaults_to_none_until_classified() {
        let status = TransactionStatus::rejected(Balance::zero(), "bad signature");
        assert_eq!(status.action_type(), ActionType::None);

        let classified = TransactionStatus::success(Balance::zero(), "")
            .with_action(ActionType::Transfer);
        assert_eq!(classified.action_type(), ActionType::Transfer);
    }
}

use thiserror::Error;

use crate::ledger::selection::PlanId;
use crate::output::{Amount, OutputId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid amount: {0}, expected a positive integer")]
    InvalidAmount(i64),

    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("anomalous record {id}: {reason}")]
    AnomalousRecord { id: OutputId, reason: String },

    #[error("no pending plan with id {0}")]
    UnknownPlan(PlanId),

    #[error("chain backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    pub fn invariant(message: impl Into<String>) -> Self {
        LedgerError::InvariantViolation(message.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

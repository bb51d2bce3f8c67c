//! Error types for the reconciliation and aggregation core.
//!
//! Both enums describe caller-supplied data that violates a precondition.
//! Nothing is committed when one of them is returned.

use thiserror::Error;

/// Failure to reconcile an incoming dispute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The dispute references a loan that is not in the snapshot.
    #[error("Loan {0} not found")]
    UnknownLoan(String),

    /// The dispute index would leave a gap in the loan's dispute sequence.
    #[error("Dispute index {index} out of range for loan {loan_id} (history has {len} disputes)")]
    OutOfRangeIndex {
        loan_id: String,
        index: usize,
        len: usize,
    },
}

/// Failure to aggregate an interaction stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// An event could not be interpreted. `position` is its index in the input.
    #[error("Malformed event at position {position}: {reason}")]
    MalformedEvent { position: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ReconcileError::OutOfRangeIndex {
            loan_id: "L1".to_string(),
            index: 4,
            len: 2,
        };
        assert_eq!(
            err.to_string(),
            "Dispute index 4 out of range for loan L1 (history has 2 disputes)"
        );

        let err = AggregateError::MalformedEvent {
            position: 3,
            reason: "missing userId".to_string(),
        };
        assert!(err.to_string().contains("position 3"));
    }
}

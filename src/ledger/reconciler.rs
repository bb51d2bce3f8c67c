//! Dispute reconciliation and loan status derivation.
//!
//! An incoming dispute is either appended to the loan's history, supersedes
//! the dispute at its index, or is ignored as stale. Whenever a dispute is
//! accepted the loan status is recomputed from the whole history.

use crate::error::ReconcileError;
use crate::models::{Dispute, DisputeState, IncomingDispute, LedgerSnapshot, Loan, LoanStatus};
use serde::Serialize;

/// What happened to an incoming dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Added at the end of the history.
    Appended,
    /// Replaced an older dispute at the same index.
    Superseded,
    /// Not newer than the dispute on file; nothing changed.
    Stale,
}

/// Result of reconciling one dispute against a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub loan_id: String,
    pub dispute_index: usize,
    pub outcome: Outcome,
    pub accepted: bool,
    pub previous_status: LoanStatus,
    pub new_status: LoanStatus,
    pub new_history: Vec<Dispute>,
}

/// Reconciles `incoming` against the loan and history held in `snapshot`.
pub fn reconcile(
    snapshot: &LedgerSnapshot,
    incoming: &IncomingDispute,
) -> Result<ReconcileResult, ReconcileError> {
    let loan = snapshot
        .loans
        .get(&incoming.loan_id)
        .ok_or_else(|| ReconcileError::UnknownLoan(incoming.loan_id.clone()))?;

    reconcile_loan(loan, snapshot.history(&incoming.loan_id), incoming)
}

/// Reconciles `incoming` against one loan and its dispute history.
pub fn reconcile_loan(
    loan: &Loan,
    history: &[Dispute],
    incoming: &IncomingDispute,
) -> Result<ReconcileResult, ReconcileError> {
    if loan.loan_id != incoming.loan_id {
        return Err(ReconcileError::UnknownLoan(incoming.loan_id.clone()));
    }

    let index = incoming.dispute_index;
    let outcome = match history.get(index) {
        None if index == history.len() => Outcome::Appended,
        None => {
            return Err(ReconcileError::OutOfRangeIndex {
                loan_id: loan.loan_id.clone(),
                index,
                len: history.len(),
            })
        }
        Some(current) if incoming.created_at > current.created_at => Outcome::Superseded,
        Some(_) => Outcome::Stale,
    };

    let mut new_history = history.to_vec();
    let new_status = match outcome {
        Outcome::Stale => loan.status,
        Outcome::Appended => {
            new_history.push(incoming.to_dispute());
            derive_status(loan.status, incoming.state, &new_history)
        }
        Outcome::Superseded => {
            new_history[index] = incoming.to_dispute();
            derive_status(loan.status, incoming.state, &new_history)
        }
    };

    Ok(ReconcileResult {
        loan_id: loan.loan_id.clone(),
        dispute_index: index,
        outcome,
        accepted: outcome != Outcome::Stale,
        previous_status: loan.status,
        new_status,
        new_history,
    })
}

/// Computes a loan's status after a dispute in state `accepted` was taken.
///
/// Fraud is sticky: once fraudulent, always fraudulent.
pub fn derive_status(current: LoanStatus, accepted: DisputeState, history: &[Dispute]) -> LoanStatus {
    if accepted == DisputeState::FraudInvestigation || current == LoanStatus::Fraudulent {
        return LoanStatus::Fraudulent;
    }

    if history.iter().any(|d| d.state == DisputeState::Open) {
        LoanStatus::Open
    } else {
        LoanStatus::Closed
    }
}

impl LedgerSnapshot {
    /// Writes an accepted reconciliation back into the snapshot.
    ///
    /// Stale results, and results for loans this snapshot does not hold,
    /// leave the snapshot untouched.
    pub fn commit(&mut self, result: &ReconcileResult) {
        if !result.accepted {
            return;
        }
        let Some(loan) = self.loans.get_mut(&result.loan_id) else {
            return;
        };
        loan.status = result.new_status;
        self.disputes
            .insert(result.loan_id.clone(), result.new_history.clone());
    }
}

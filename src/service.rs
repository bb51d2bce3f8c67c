//! Ledger service.
//!
//! Wraps the pure reconciliation and aggregation functions in the
//! load-mutate-persist cycle. The snapshot lives behind a mutex and every
//! submission reconciles, commits and persists while holding it, so two
//! reconciliations of the same loan can never interleave.

use crate::analysis;
use crate::error::ReconcileError;
use crate::ledger::{self, ReconcileResult};
use crate::models::{AggregateMap, Dispute, IncomingDispute, LedgerSnapshot, Loan};
use crate::store::SnapshotStore;
use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A loan together with its dispute history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoanView {
    pub loan: Loan,
    pub disputes: Vec<Dispute>,
}

/// Outcome of one record in a dispute batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub incoming: IncomingDispute,
    pub result: Result<ReconcileResult, ReconcileError>,
}

/// Summary of a dispute batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    /// Number of records that changed the ledger.
    pub fn accepted(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(&e.result, Ok(r) if r.accepted))
            .count()
    }

    /// Number of records ignored as stale.
    pub fn stale(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(&e.result, Ok(r) if !r.accepted))
            .count()
    }

    /// Number of records rejected with a validation error.
    pub fn rejected(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_err()).count()
    }
}

/// Ledger service over a file-backed snapshot.
pub struct LedgerService {
    store: SnapshotStore,
    snapshot: Arc<Mutex<LedgerSnapshot>>,
}

impl LedgerService {
    /// Load the snapshot from the store.
    pub async fn open(store: SnapshotStore) -> Result<Self> {
        let snapshot = store.load().await?;
        Ok(Self {
            store,
            snapshot: Arc::new(Mutex::new(snapshot)),
        })
    }

    /// Reconcile one dispute and persist the result if it was accepted.
    ///
    /// Validation errors are returned as the inner error so callers can tell
    /// them apart from I/O failures.
    pub async fn submit_dispute(
        &self,
        incoming: IncomingDispute,
    ) -> Result<Result<ReconcileResult, ReconcileError>> {
        let mut snapshot = self.snapshot.lock().await;

        let result = match ledger::reconcile(&snapshot, &incoming) {
            Ok(result) => result,
            Err(e) => return Ok(Err(e)),
        };

        if result.accepted {
            let mut updated = snapshot.clone();
            updated.commit(&result);
            self.store.save(&updated).await?;
            *snapshot = updated;
            info!(
                "Dispute {} for loan {} {:?}, status {} -> {}",
                result.dispute_index,
                result.loan_id,
                result.outcome,
                result.previous_status,
                result.new_status
            );
        } else {
            debug!(
                "Ignored stale dispute {} for loan {} (createdAt {})",
                incoming.dispute_index, incoming.loan_id, incoming.created_at
            );
        }

        Ok(Ok(result))
    }

    /// Reconcile a batch of disputes in order and persist once.
    ///
    /// A rejected record does not stop the batch. The snapshot is only
    /// written when at least one record was accepted.
    pub async fn submit_batch(&self, batch: Vec<IncomingDispute>) -> Result<BatchReport> {
        let mut snapshot = self.snapshot.lock().await;
        let mut updated = snapshot.clone();
        let mut report = BatchReport::default();

        for incoming in batch {
            let result = ledger::reconcile(&updated, &incoming);
            match &result {
                Ok(r) => updated.commit(r),
                Err(e) => warn!("Rejected dispute {}: {}", incoming.dispute_index, e),
            }
            report.entries.push(BatchEntry { incoming, result });
        }

        if report.accepted() > 0 {
            self.store.save(&updated).await?;
            *snapshot = updated;
        }

        info!(
            "Batch processed: {} accepted, {} stale, {} rejected",
            report.accepted(),
            report.stale(),
            report.rejected()
        );
        Ok(report)
    }

    /// Look up a loan and its dispute history.
    pub async fn loan_status(&self, loan_id: &str) -> Result<LoanView, ReconcileError> {
        let snapshot = self.snapshot.lock().await;
        let loan = snapshot
            .loans
            .get(loan_id)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownLoan(loan_id.to_string()))?;

        Ok(LoanView {
            disputes: snapshot.history(loan_id).to_vec(),
            loan,
        })
    }

    /// Aggregate the snapshot's interactions over `shards` parallel shards.
    pub async fn aggregate_interactions(&self, shards: usize) -> Result<AggregateMap> {
        let events = Arc::new(self.snapshot.lock().await.user_interactions.clone());
        let ranges = analysis::shard_ranges(events.len(), shards);
        debug!(
            "Aggregating {} interactions over {} shards",
            events.len(),
            ranges.len()
        );

        let tasks = ranges.into_iter().map(|range| {
            let events = Arc::clone(&events);
            tokio::task::spawn_blocking(move || {
                let offset = range.start;
                analysis::aggregate(&events[range]).map_err(|e| analysis::offset_error(e, offset))
            })
        });

        let mut merged = AggregateMap::new();
        for joined in join_all(tasks).await {
            let partial = joined.context("Aggregation task failed")??;
            merged = analysis::merge_aggregates(merged, partial);
        }

        info!("Aggregated interactions for {} users", merged.len());
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DisputeState, EventType, Interaction, LoanStatus};
    use rust_decimal::Decimal;
    use tokio_test::{assert_err, assert_ok};

    fn dispute(loan_id: &str, index: usize, state: DisputeState, created_at: i64) -> IncomingDispute {
        IncomingDispute {
            loan_id: loan_id.to_string(),
            dispute_index: index,
            state,
            created_at,
        }
    }

    async fn service_with(snapshot: LedgerSnapshot) -> (tempfile::TempDir, LedgerService) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("data.json"));
        store.save(&snapshot).await.unwrap();
        let service = LedgerService::open(store).await.unwrap();
        (dir, service)
    }

    fn loans(ids: &[&str]) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        for id in ids {
            snapshot.loans.insert(id.to_string(), Loan::new(*id));
        }
        snapshot
    }

    #[tokio::test]
    async fn test_submit_dispute_persists() {
        let (_dir, service) = service_with(loans(&["L1"])).await;

        let result = assert_ok!(service
            .submit_dispute(dispute("L1", 0, DisputeState::Open, 1))
            .await
            .unwrap());
        assert_eq!(result.new_status, LoanStatus::Open);

        let reloaded = service.store.load().await.unwrap();
        assert_eq!(reloaded.loans["L1"].status, LoanStatus::Open);
        assert_eq!(reloaded.history("L1").len(), 1);
    }

    #[tokio::test]
    async fn test_submit_dispute_validation_error() {
        let (_dir, service) = service_with(loans(&["L1"])).await;

        let outcome = service
            .submit_dispute(dispute("L2", 0, DisputeState::Open, 1))
            .await
            .unwrap();
        assert_err!(outcome);

        let outcome = service
            .submit_dispute(dispute("L1", 3, DisputeState::Open, 1))
            .await
            .unwrap();
        assert!(matches!(outcome, Err(ReconcileError::OutOfRangeIndex { .. })));
    }

    #[tokio::test]
    async fn test_batch_continues_after_rejection() {
        let (_dir, service) = service_with(loans(&["L1"])).await;

        let report = service
            .submit_batch(vec![
                dispute("L1", 0, DisputeState::Open, 1),
                dispute("L9", 0, DisputeState::Open, 1),
                dispute("L1", 0, DisputeState::Open, 1),
                dispute("L1", 0, DisputeState::Closed, 2),
            ])
            .await
            .unwrap();

        assert_eq!(report.accepted(), 2);
        assert_eq!(report.stale(), 1);
        assert_eq!(report.rejected(), 1);

        let view = service.loan_status("L1").await.unwrap();
        assert_eq!(view.loan.status, LoanStatus::Closed);
        assert_eq!(view.disputes.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_do_not_lose_updates() {
        let (_dir, service) = service_with(loans(&["L1"])).await;
        let service = Arc::new(service);

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .submit_dispute(dispute("L1", 0, DisputeState::Open, 1))
                    .await
            })
        };
        first.await.unwrap().unwrap().unwrap();

        let tasks: Vec<_> = (1..=5)
            .map(|t| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .submit_dispute(dispute("L1", 0, DisputeState::Closed, t + 1))
                        .await
                })
            })
            .collect();
        for task in join_all(tasks).await {
            task.unwrap().unwrap().unwrap();
        }

        let view = service.loan_status("L1").await.unwrap();
        assert_eq!(view.disputes.len(), 1);
        assert_eq!(view.disputes[0].created_at, 6);
        assert_eq!(view.loan.status, LoanStatus::Closed);
    }

    #[tokio::test]
    async fn test_loan_status_unknown() {
        let (_dir, service) = service_with(loans(&["L1"])).await;
        assert_eq!(
            service.loan_status("L7").await.unwrap_err(),
            ReconcileError::UnknownLoan("L7".to_string())
        );
    }

    #[tokio::test]
    async fn test_sharded_aggregation_matches_single_pass() {
        let mut snapshot = LedgerSnapshot::default();
        snapshot.user_interactions = vec![
            Interaction::new("u1", EventType::Click, 5),
            Interaction::new("u2", EventType::View, 1),
            Interaction::new("u1", EventType::Purchase, 10).with_value(Decimal::new(1999, 2)),
            Interaction::new("u3", EventType::Purchase, 4).with_value(Decimal::new(1, 1)),
            Interaction::new("u2", EventType::Click, 9),
            Interaction::new("u3", EventType::Purchase, 7).with_value(Decimal::new(2, 1)),
            Interaction::new("u1", EventType::Purchase, 2).with_value(Decimal::new(1, 2)),
            Interaction::new("u3", EventType::Purchase, 12).with_value(Decimal::new(3, 1)),
        ];
        let expected = analysis::aggregate(&snapshot.user_interactions).unwrap();
        assert_eq!(expected["u1"].total_purchase_value, Decimal::new(20, 0));
        assert_eq!(expected["u3"].total_purchase_value, Decimal::new(6, 1));
        let (_dir, service) = service_with(snapshot).await;

        for shards in [1, 2, 3, 4, 8] {
            let merged = service.aggregate_interactions(shards).await.unwrap();
            assert_eq!(merged, expected, "{} shards", shards);
        }
    }

    #[tokio::test]
    async fn test_sharded_aggregation_reports_global_position() {
        let mut snapshot = LedgerSnapshot::default();
        snapshot.user_interactions = vec![
            Interaction::new("u1", EventType::Click, 5),
            Interaction::new("u2", EventType::View, 1),
            Interaction::new("u1", EventType::Click, 6),
        ];
        snapshot.user_interactions[2].event_type = Some("hover".to_string());
        let (_dir, service) = service_with(snapshot).await;

        let err = service.aggregate_interactions(3).await.unwrap_err();
        assert!(err.to_string().contains("position 2"), "{}", err);
    }
}

//! Data models for the loan ledger.
//!
//! This module contains the records the ledger works on: loans, the
//! disputes filed against them, user interaction events and the
//! per-user aggregates derived from those events. Field names are
//! camelCase on the wire to stay compatible with existing data files.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of a loan, derived from its dispute history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// No dispute has been accepted for the loan yet.
    #[default]
    Unknown,
    /// At least one dispute is still open.
    Open,
    /// Every dispute on file is closed.
    Closed,
    /// A fraud investigation was filed. Terminal.
    Fraudulent,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Unknown => write!(f, "unknown"),
            LoanStatus::Open => write!(f, "open"),
            LoanStatus::Closed => write!(f, "closed"),
            LoanStatus::Fraudulent => write!(f, "fraudulent"),
        }
    }
}

/// Lifecycle state of a single dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeState {
    Open,
    Closed,
    FraudInvestigation,
}

impl fmt::Display for DisputeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisputeState::Open => write!(f, "open"),
            DisputeState::Closed => write!(f, "closed"),
            DisputeState::FraudInvestigation => write!(f, "fraud_investigation"),
        }
    }
}

/// A loan record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    /// Loan identifier. Filled from the map key when absent in the file.
    #[serde(default, deserialize_with = "lenient_id")]
    pub loan_id: String,
    /// Current derived status.
    #[serde(default)]
    pub status: LoanStatus,
}

impl Loan {
    /// Creates a loan that has no disputes yet.
    #[allow(dead_code)] // Used when building snapshots in memory
    pub fn new(loan_id: impl Into<String>) -> Self {
        Self {
            loan_id: loan_id.into(),
            status: LoanStatus::Unknown,
        }
    }
}

/// A dispute as stored in a loan's history. Its index is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    #[serde(default, deserialize_with = "lenient_id")]
    pub loan_id: String,
    pub state: DisputeState,
    /// Logical filing time.
    pub created_at: i64,
}

/// A dispute submitted for reconciliation against a loan's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingDispute {
    #[serde(deserialize_with = "lenient_id")]
    pub loan_id: String,
    /// Position in the loan's dispute sequence.
    #[serde(alias = "disputeId", deserialize_with = "lenient_index")]
    pub dispute_index: usize,
    pub state: DisputeState,
    #[serde(deserialize_with = "lenient_i64")]
    pub created_at: i64,
}

impl IncomingDispute {
    /// The record that lands in the history when this dispute is accepted.
    pub fn to_dispute(&self) -> Dispute {
        Dispute {
            loan_id: self.loan_id.clone(),
            state: self.state,
            created_at: self.created_at,
        }
    }
}

/// Kind of a user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Click,
    View,
    Purchase,
}

impl EventType {
    /// Parses an event type name, returning `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "click" => Some(EventType::Click),
            "view" => Some(EventType::View),
            "purchase" => Some(EventType::Purchase),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Click => write!(f, "click"),
            EventType::View => write!(f, "view"),
            EventType::Purchase => write!(f, "purchase"),
        }
    }
}

/// Optional payload attached to an interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionMetadata {
    /// Monetary value, only meaningful for purchases.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub value: Option<Decimal>,
}

/// A raw interaction event as read from the data file.
///
/// Fields are kept optional and the type is kept as a string so that
/// malformed rows survive deserialization and can be reported by the
/// aggregator with their position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<InteractionMetadata>,
}

impl Interaction {
    /// Builds a well-formed interaction.
    #[allow(dead_code)] // Used when building snapshots in memory
    pub fn new(user_id: &str, event_type: EventType, timestamp: i64) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            timestamp: Some(timestamp),
            event_type: Some(event_type.to_string()),
            metadata: None,
        }
    }

    /// Attaches a monetary value.
    #[allow(dead_code)] // Used when building snapshots in memory
    pub fn with_value(mut self, value: Decimal) -> Self {
        self.metadata = Some(InteractionMetadata { value: Some(value) });
        self
    }

    /// The attached value, if any.
    pub fn value(&self) -> Option<Decimal> {
        self.metadata.as_ref().and_then(|m| m.value)
    }
}

/// Per-type event counters. All three types are always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub click: u64,
    pub view: u64,
    pub purchase: u64,
}

impl EventCounts {
    /// Returns the counter for one event type.
    #[allow(dead_code)] // Lookup by type for callers holding an EventType
    pub fn get(&self, event_type: EventType) -> u64 {
        match event_type {
            EventType::Click => self.click,
            EventType::View => self.view,
            EventType::Purchase => self.purchase,
        }
    }

    /// Increments the counter for one event type.
    pub fn increment(&mut self, event_type: EventType) {
        match event_type {
            EventType::Click => self.click += 1,
            EventType::View => self.view += 1,
            EventType::Purchase => self.purchase += 1,
        }
    }

    fn add(&mut self, other: &EventCounts) {
        self.click += other.click;
        self.view += other.view;
        self.purchase += other.purchase;
    }
}

/// Behavioural summary of one user's interactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEventAggregate {
    /// Number of interactions seen.
    pub total_events: u64,
    /// Interactions per type.
    pub event_counts: EventCounts,
    /// Sum of purchase values. Decimal so the sum is exact in any order.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_purchase_value: Decimal,
    /// Earliest timestamp seen.
    pub first_event_timestamp: i64,
    /// Latest timestamp seen.
    pub last_event_timestamp: i64,
}

impl UserEventAggregate {
    /// An empty aggregate anchored at the first timestamp seen for a user.
    pub fn starting_at(timestamp: i64) -> Self {
        Self {
            total_events: 0,
            event_counts: EventCounts::default(),
            total_purchase_value: Decimal::ZERO,
            first_event_timestamp: timestamp,
            last_event_timestamp: timestamp,
        }
    }

    /// Folds one event into the aggregate.
    pub fn record(&mut self, event_type: EventType, timestamp: i64, purchase_value: Decimal) {
        self.total_events += 1;
        self.event_counts.increment(event_type);
        self.total_purchase_value += purchase_value;
        self.first_event_timestamp = self.first_event_timestamp.min(timestamp);
        self.last_event_timestamp = self.last_event_timestamp.max(timestamp);
    }

    /// Combines another aggregate of the same user into this one.
    pub fn merge(&mut self, other: &UserEventAggregate) {
        self.total_events += other.total_events;
        self.event_counts.add(&other.event_counts);
        self.total_purchase_value += other.total_purchase_value;
        self.first_event_timestamp = self.first_event_timestamp.min(other.first_event_timestamp);
        self.last_event_timestamp = self.last_event_timestamp.max(other.last_event_timestamp);
    }
}

/// Aggregates keyed by user id.
pub type AggregateMap = BTreeMap<String, UserEventAggregate>;

/// The full in-memory dataset handed to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    /// Loans keyed by id.
    #[serde(default)]
    pub loans: BTreeMap<String, Loan>,
    /// Dispute histories keyed by loan id.
    #[serde(default)]
    pub disputes: BTreeMap<String, Vec<Dispute>>,
    /// Interaction event stream.
    #[serde(default)]
    pub user_interactions: Vec<Interaction>,
}

impl LedgerSnapshot {
    /// Dispute history of a loan; empty when none was filed.
    pub fn history(&self, loan_id: &str) -> &[Dispute] {
        self.disputes.get(loan_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fills ids omitted in the file from their map keys.
    pub fn normalize(&mut self) {
        for (id, loan) in self.loans.iter_mut() {
            if loan.loan_id.is_empty() {
                loan.loan_id = id.clone();
            }
        }
        for (id, history) in self.disputes.iter_mut() {
            for dispute in history.iter_mut().filter(|d| d.loan_id.is_empty()) {
                dispute.loan_id = id.clone();
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Str(String),
    Int(i64),
}

impl From<IdRepr> for String {
    fn from(repr: IdRepr) -> Self {
        match repr {
            IdRepr::Str(s) => s,
            IdRepr::Int(n) => n.to_string(),
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    IdRepr::deserialize(deserializer).map(String::from)
}

fn lenient_opt_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<IdRepr>::deserialize(deserializer)?.map(String::from))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntRepr {
    Int(i64),
    Str(String),
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IntRepr::deserialize(deserializer)? {
        IntRepr::Int(n) => Ok(n),
        IntRepr::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got {:?}", s))),
    }
}

fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let n = lenient_i64(deserializer)?;
    usize::try_from(n)
        .map_err(|_| serde::de::Error::custom(format!("dispute index must be >= 0, got {}", n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&LoanStatus::Fraudulent).unwrap(),
            "\"fraudulent\""
        );
        assert_eq!(LoanStatus::default(), LoanStatus::Unknown);
        let state: DisputeState = serde_json::from_str("\"fraud_investigation\"").unwrap();
        assert_eq!(state, DisputeState::FraudInvestigation);
    }

    #[test]
    fn test_event_type_from_name() {
        assert_eq!(EventType::from_name("click"), Some(EventType::Click));
        assert_eq!(EventType::from_name("purchase"), Some(EventType::Purchase));
        assert_eq!(EventType::from_name("Purchase"), None);
        assert_eq!(EventType::from_name("scroll"), None);
    }

    #[test]
    fn test_incoming_dispute_accepts_legacy_shapes() {
        let json = r#"{"loanId": 7, "disputeId": "2", "state": "closed", "createdAt": "15"}"#;
        let incoming: IncomingDispute = serde_json::from_str(json).unwrap();
        assert_eq!(incoming.loan_id, "7");
        assert_eq!(incoming.dispute_index, 2);
        assert_eq!(incoming.created_at, 15);

        let negative = r#"{"loanId": "L1", "disputeIndex": -1, "state": "open", "createdAt": 1}"#;
        assert!(serde_json::from_str::<IncomingDispute>(negative).is_err());
    }

    #[test]
    fn test_snapshot_normalize_fills_ids() {
        let json = r#"{
            "loans": {"L1": {"status": "open"}},
            "disputes": {"L1": [{"state": "open", "createdAt": 1}]}
        }"#;
        let mut snapshot: LedgerSnapshot = serde_json::from_str(json).unwrap();
        snapshot.normalize();

        assert_eq!(snapshot.loans["L1"].loan_id, "L1");
        assert_eq!(snapshot.history("L1")[0].loan_id, "L1");
        assert!(snapshot.history("L2").is_empty());
        assert!(snapshot.user_interactions.is_empty());
    }

    #[test]
    fn test_aggregate_record_and_merge() {
        let mut a = UserEventAggregate::starting_at(10);
        a.record(EventType::Click, 10, Decimal::ZERO);
        a.record(EventType::Purchase, 12, Decimal::new(55, 1));

        let mut b = UserEventAggregate::starting_at(3);
        b.record(EventType::View, 3, Decimal::ZERO);

        a.merge(&b);
        assert_eq!(a.total_events, 3);
        assert_eq!(a.event_counts.get(EventType::Click), 1);
        assert_eq!(a.event_counts.get(EventType::View), 1);
        assert_eq!(a.event_counts.get(EventType::Purchase), 1);
        assert_eq!(a.total_purchase_value, Decimal::new(55, 1));
        assert_eq!(a.first_event_timestamp, 3);
        assert_eq!(a.last_event_timestamp, 12);
    }

    #[test]
    fn test_aggregate_serializes_all_counts() {
        let aggregate = UserEventAggregate::starting_at(1);
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["eventCounts"]["click"], 0);
        assert_eq!(json["eventCounts"]["view"], 0);
        assert_eq!(json["eventCounts"]["purchase"], 0);
        assert_eq!(json["firstEventTimestamp"], 1);
        assert_eq!(json["totalPurchaseValue"], 0.0);
    }

    #[test]
    fn test_interaction_value_is_read_exactly() {
        let json = r#"{"userId": "u1", "timestamp": 4, "type": "purchase", "metadata": {"value": 19.99}}"#;
        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.value(), Some(Decimal::new(1999, 2)));

        let whole = r#"{"userId": "u1", "timestamp": 4, "type": "purchase", "metadata": {"value": 20}}"#;
        let interaction: Interaction = serde_json::from_str(whole).unwrap();
        assert_eq!(interaction.value(), Some(Decimal::new(20, 0)));

        let missing = r#"{"userId": "u1", "timestamp": 4, "type": "click", "metadata": {}}"#;
        let interaction: Interaction = serde_json::from_str(missing).unwrap();
        assert_eq!(interaction.value(), None);
    }
}

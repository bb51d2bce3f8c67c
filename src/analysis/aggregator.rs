//! User interaction aggregation.
//!
//! This module folds a stream of interaction events into one
//! [`UserEventAggregate`] per user. Every field is combined with a
//! commutative, associative operation, so the result does not depend on
//! event order and partial results over disjoint shards can be merged.

use crate::error::AggregateError;
use crate::models::{AggregateMap, EventType, Interaction, UserEventAggregate};
use rust_decimal::Decimal;
use std::ops::Range;

/// Aggregate interactions per user.
///
/// Fails on the first malformed event; no partial summary is returned.
pub fn aggregate(events: &[Interaction]) -> Result<AggregateMap, AggregateError> {
    let mut summaries = AggregateMap::new();

    for (position, event) in events.iter().enumerate() {
        let (user_id, event_type, timestamp) = validate(position, event)?;

        let purchase_value = match event_type {
            EventType::Purchase => event.value().unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        };

        summaries
            .entry(user_id.to_string())
            .or_insert_with(|| UserEventAggregate::starting_at(timestamp))
            .record(event_type, timestamp, purchase_value);
    }

    Ok(summaries)
}

/// Merge two per-user aggregate maps into one.
pub fn merge_aggregates(mut left: AggregateMap, right: AggregateMap) -> AggregateMap {
    for (user_id, summary) in right {
        match left.get_mut(&user_id) {
            Some(existing) => existing.merge(&summary),
            None => {
                left.insert(user_id, summary);
            }
        }
    }
    left
}

/// Split `len` events into at most `shards` contiguous, non-empty ranges.
pub fn shard_ranges(len: usize, shards: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let size = len.div_ceil(shards.max(1));
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Rebase shard-local positions onto the position in the full event list.
pub fn offset_error(err: AggregateError, offset: usize) -> AggregateError {
    match err {
        AggregateError::MalformedEvent { position, reason } => AggregateError::MalformedEvent {
            position: position + offset,
            reason,
        },
    }
}

/// Users ranked by total purchase value (highest first).
pub fn top_purchasers(summaries: &AggregateMap, n: usize) -> Vec<(&str, Decimal)> {
    let mut ranked: Vec<(&str, Decimal)> = summaries
        .iter()
        .filter(|(_, s)| s.event_counts.purchase > 0)
        .map(|(user, s)| (user.as_str(), s.total_purchase_value))
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

fn validate(position: usize, event: &Interaction) -> Result<(&str, EventType, i64), AggregateError> {
    let malformed = |reason: String| AggregateError::MalformedEvent { position, reason };

    let user_id = match event.user_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(malformed("missing userId".to_string())),
    };
    let timestamp = event
        .timestamp
        .ok_or_else(|| malformed("missing timestamp".to_string()))?;
    let event_type = match event.event_type.as_deref() {
        Some(name) => EventType::from_name(name)
            .ok_or_else(|| malformed(format!("unrecognized event type {:?}", name)))?,
        None => return Err(malformed("missing type".to_string())),
    };

    Ok((user_id, event_type, timestamp))
}

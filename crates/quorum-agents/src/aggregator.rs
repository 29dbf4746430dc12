//! Combining categorical signals into one action.
//!
//! `aggregate` is used both inside an agent (its own heuristics) and at the
//! coordination layer (several agents' signals). It is a commutative weighted
//! sum, so input order never changes the result.

use std::collections::BTreeMap;

use quorum_models::action::Action;
use quorum_models::belief::clamp_unit;
use serde::{Deserialize, Serialize};

/// Marker placed in reasoning when two sources disagree.
pub const CONFLICT_MARKER: &str = "CONFLICT";

/// Ceiling for the agreement-boosted confidence of two concurring sources.
const AGREEMENT_CAP: f64 = 0.95;
/// Ceiling for the HOLD produced by two conflicting sources.
const CONFLICT_CAP: f64 = 0.5;
/// Discount for a lone directional opinion paired with a HOLD.
const ONE_SIDED_DISCOUNT: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedVote {
    pub action: Action,
    pub confidence: f64,
    pub weight: f64,
}

impl WeightedVote {
    pub fn new(action: Action, confidence: f64, weight: f64) -> Self {
        Self {
            action,
            confidence,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub action: Action,
    pub confidence: f64,
    /// Normalized bucket per action.
    pub buckets: BTreeMap<Action, f64>,
    pub total_weight: f64,
}

impl Aggregation {
    fn hold() -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            buckets: BTreeMap::new(),
            total_weight: 0.0,
        }
    }

    /// One-line summary of the buckets, e.g. `BUY 0.32 | SELL 0.18 | HOLD 0.15`.
    pub fn describe(&self) -> String {
        Action::PRIORITY
            .iter()
            .map(|a| format!("{a} {:.2}", self.buckets.get(a).copied().unwrap_or(0.0)))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Weighted vote across actions.
///
/// Each bucket accumulates `confidence * weight` and is normalized by the
/// total weight. The highest bucket wins; ties go to the earlier action in
/// BUY, SELL, HOLD order. Empty input (or zero total weight) yields HOLD 0.0.
pub fn aggregate(votes: &[WeightedVote]) -> Aggregation {
    let mut raw: BTreeMap<Action, f64> = BTreeMap::new();
    let mut total_weight = 0.0;

    for vote in votes {
        let weight = if vote.weight.is_finite() && vote.weight > 0.0 {
            vote.weight
        } else {
            0.0
        };
        *raw.entry(vote.action).or_insert(0.0) += clamp_unit(vote.confidence) * weight;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return Aggregation::hold();
    }

    let buckets: BTreeMap<Action, f64> = raw
        .into_iter()
        .map(|(action, sum)| (action, sum / total_weight))
        .collect();

    let mut winner = Action::Hold;
    let mut best = f64::NEG_INFINITY;
    for action in Action::PRIORITY {
        if let Some(score) = buckets.get(&action) {
            if *score > best {
                best = *score;
                winner = action;
            }
        }
    }

    Aggregation {
        action: winner,
        confidence: clamp_unit(best),
        buckets,
        total_weight,
    }
}

/// One side of a two-source reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Opinion {
    pub source: String,
    pub action: Action,
    pub confidence: f64,
}

impl Opinion {
    pub fn new(source: impl Into<String>, action: Action, confidence: f64) -> Self {
        Self {
            source: source.into(),
            action,
            confidence: clamp_unit(confidence),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub conflict: bool,
}

/// Reconcile exactly two opinions with explicit agreement/conflict handling.
pub fn reconcile_pair(first: &Opinion, second: &Opinion) -> Reconciliation {
    let (a, b) = (first.confidence, second.confidence);

    match (first.action, second.action) {
        (Action::Hold, Action::Hold) => Reconciliation {
            action: Action::Hold,
            confidence: clamp_unit((a + b) / 2.0),
            reasoning: format!(
                "Both {} ({a:.2}) and {} ({b:.2}) advise HOLD",
                first.source, second.source
            ),
            conflict: false,
        },
        (x, y) if x == y => {
            // Independent agreement: combine as 1 - (1-a)(1-b), capped.
            let boosted = (1.0 - (1.0 - a) * (1.0 - b)).min(AGREEMENT_CAP);
            Reconciliation {
                action: x,
                confidence: clamp_unit(boosted.max(a.max(b))),
                reasoning: format!(
                    "{} ({a:.2}) and {} ({b:.2}) agree on {x}",
                    first.source, second.source
                ),
                conflict: false,
            }
        }
        (Action::Hold, other) | (other, Action::Hold) => {
            let (directional, hold) = if first.action == Action::Hold {
                (second, first)
            } else {
                (first, second)
            };
            Reconciliation {
                action: other,
                confidence: clamp_unit(directional.confidence * ONE_SIDED_DISCOUNT),
                reasoning: format!(
                    "{} says {other} ({:.2}) while {} holds; confidence discounted",
                    directional.source, directional.confidence, hold.source
                ),
                conflict: false,
            }
        }
        (x, y) => Reconciliation {
            action: Action::Hold,
            confidence: (a.max(b) * 0.5).min(CONFLICT_CAP),
            reasoning: format!(
                "{CONFLICT_MARKER}: {} says {x} ({a:.2}), {} says {y} ({b:.2}); holding",
                first.source, second.source
            ),
            conflict: true,
        },
    }
}

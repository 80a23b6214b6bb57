//! Placement Policy (§4.3): scores candidate nodes against a strategy and
//! selects a diverse replica set.

use chrono::{DateTime, Utc};
use meshvault_core::{NodeId, NodeRecord, NodeStatus};
use serde::{Deserialize, Serialize};

/// One of four scoring strategies. A plain enum, not a trait object — no
/// open-ended plugin surface is required (§9 Design Notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Balanced,
    Performance,
    Reliability,
    Capacity,
}

struct Weights {
    reliability: f64,
    storage: f64,
    latency: f64,
    free_space: f64,
}

impl Strategy {
    fn weights(self) -> Weights {
        match self {
            Strategy::Balanced => Weights {
                reliability: 0.35,
                storage: 0.25,
                latency: 0.25,
                free_space: 0.15,
            },
            Strategy::Performance => Weights {
                reliability: 0.30,
                storage: 0.10,
                latency: 0.60,
                free_space: 0.0,
            },
            Strategy::Reliability => Weights {
                reliability: 0.70,
                storage: 0.20,
                latency: 0.10,
                free_space: 0.0,
            },
            Strategy::Capacity => Weights {
                reliability: 0.20,
                storage: 0.30,
                latency: 0.0,
                free_space: 0.50,
            },
        }
    }

    fn latency_reference_seconds(self) -> f64 {
        match self {
            Strategy::Performance => 0.5,
            _ => 1.0,
        }
    }
}

fn status_factor(status: NodeStatus) -> f64 {
    match status {
        NodeStatus::Online => 1.0,
        NodeStatus::Degraded => 0.7,
        NodeStatus::Failed => 0.0,
        NodeStatus::Unknown => 0.5,
    }
}

fn latency_score(node: &NodeRecord, strategy: Strategy) -> f64 {
    let l_ref = strategy.latency_reference_seconds();
    1.0 - (node.latency_seconds / l_ref).min(1.0)
}

fn storage_score(node: &NodeRecord) -> f64 {
    1.0 - node.utilization()
}

fn free_space_score(node: &NodeRecord) -> f64 {
    if node.capacity == 0 {
        return 0.0;
    }
    (2.0 * node.free_space() as f64 / node.capacity as f64).min(1.0)
}

fn reliability_score(node: &NodeRecord, now: DateTime<Utc>) -> f64 {
    let mut score = 0.9f64.powi(node.failure_count as i32);

    let age_seconds = now.signed_duration_since(node.last_seen).num_seconds().max(0) as f64;
    if age_seconds > 60.0 {
        score *= (1.0 - (age_seconds - 60.0) / 240.0).max(0.1);
    }

    score *= status_factor(node.status);
    score
}

/// Composite score for `node` under `strategy`, as of `now`. Pure — no
/// store or async dependency — so placement determinism (Testable
/// Property 5) is checkable with plain `#[test]`s.
pub fn score(node: &NodeRecord, strategy: Strategy, now: DateTime<Utc>) -> f64 {
    let w = strategy.weights();
    w.reliability * reliability_score(node, now)
        + w.storage * storage_score(node)
        + w.latency * latency_score(node, strategy)
        + w.free_space * free_space_score(node)
}

/// Select `desired_count` nodes from `candidates` for a new replica set
/// (§4.3's two-pass selection). `candidates` should already exclude any
/// nodes the caller wants unconditionally excluded (e.g. nodes already
/// holding the chunk, on a rebalance).
pub fn select_replica_nodes(
    candidates: &[NodeRecord],
    strategy: Strategy,
    desired_count: usize,
    now: DateTime<Utc>,
) -> Vec<NodeId> {
    let mut scored: Vec<(&NodeRecord, f64)> = candidates
        .iter()
        .map(|n| (n, score(n, strategy, now)))
        .collect();

    // Sort descending by score; tie-break by NodeID for determinism.
    scored.sort_by(|(a_node, a_score), (b_node, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_node.node_id.cmp(&b_node.node_id))
    });

    let mut selected = Vec::with_capacity(desired_count);
    let mut used_addresses = std::collections::HashSet::new();

    // First pass: diversity — skip nodes sharing an address with one
    // already picked.
    for (node, _) in &scored {
        if selected.len() == desired_count {
            break;
        }
        if used_addresses.insert(node.address.clone()) {
            selected.push(node.node_id.clone());
        }
    }

    // Second pass: fill any remaining slots ignoring diversity.
    if selected.len() < desired_count {
        for (node, _) in &scored {
            if selected.len() == desired_count {
                break;
            }
            if !selected.contains(&node.node_id) {
                selected.push(node.node_id.clone());
            }
        }
    }

    selected
}

/// Whether a chunk needs rebalancing (§4.4's rebalance trigger, defined
/// alongside the scoring this module provides).
pub fn needs_rebalance(
    current_nodes: &[NodeRecord],
    desired_count: usize,
) -> bool {
    if current_nodes.len() < desired_count {
        return true;
    }
    let degraded_or_full = current_nodes
        .iter()
        .filter(|n| n.status == NodeStatus::Degraded || n.utilization() > 0.9)
        .count();
    degraded_or_full * 2 > current_nodes.len()
}

/// Average score of a node set under `strategy`, used to decide whether a
/// proposed migration clears the 1.2x improvement bar (§4.3).
pub fn average_score(nodes: &[NodeRecord], strategy: Strategy, now: DateTime<Utc>) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    nodes.iter().map(|n| score(n, strategy, now)).sum::<f64>() / nodes.len() as f64
}

/// Whether migrating from `current` to `proposed` clears the required
/// 1.2x average-score improvement (§4.3).
pub fn clears_rebalance_bar(
    current: &[NodeRecord],
    proposed: &[NodeRecord],
    strategy: Strategy,
    now: DateTime<Utc>,
) -> bool {
    let current_avg = average_score(current, strategy, now);
    let proposed_avg = average_score(proposed, strategy, now);
    proposed_avg > current_avg * 1.2
}

//! Node selection (C6).
//!
//! Filters candidate nodes down to those matching a job's features, GRES
//! and reservation constraints, then picks the minimal-weight subset that
//! satisfies the requested node and cpu counts (spec.md §4.3).

use crate::model::{Job, Node, Reservation};

/// Nodes eligible for `job`, independent of current load.
pub fn eligible_nodes<'a>(job: &Job, nodes: impl Iterator<Item = &'a Node>) -> Vec<&'a Node> {
    nodes
        .filter(|n| n.partitions.iter().any(|p| p == &job.request.partition))
        .filter(|n| {
            job.request
                .features
                .iter()
                .all(|f| n.features.iter().any(|nf| nf == f))
        })
        .filter(|n| {
            job.request
                .gres
                .iter()
                .all(|g| n.gres.iter().any(|ng| ng == g))
        })
        .collect()
}

/// Remove nodes held by a reservation the job is not entitled to use.
pub fn apply_reservation_gate<'a>(
    job: &Job,
    candidates: Vec<&'a Node>,
    reservations: impl Iterator<Item = &'a Reservation>,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<&'a Node> {
    let active_other: Vec<&Reservation> = reservations
        .filter(|r| r.covers(now))
        .filter(|r| job.request.reservation.as_deref() != Some(r.name.as_str()))
        .collect();

    candidates
        .into_iter()
        .filter(|node| !active_other.iter().any(|r| r.nodes.contains(&node.name)))
        .collect()
}

/// Select the minimal-weight subset of schedulable candidates that together
/// provide at least `min_nodes` nodes and `cpus_per_task` free cpus each.
/// `partition_max_nodes` further caps the subset when the partition itself
/// limits nodes per job, independent of what the job requested. Returns
/// `None` when no such subset exists (spec.md §4.3 "minimal-weight subset"
/// rule).
pub fn select_minimal_weight_subset<'a>(
    job: &Job,
    mut candidates: Vec<&'a Node>,
    partition_max_nodes: Option<u32>,
) -> Option<Vec<&'a Node>> {
    candidates.retain(|n| n.is_schedulable() && n.cpus_free() >= job.request.cpus_per_task);
    candidates.sort_by_key(|n| (n.weight, n.name.clone()));

    let min_nodes = job.request.min_nodes.max(1) as usize;
    let mut max_nodes = job.request.max_nodes.max(job.request.min_nodes).max(1) as usize;
    if let Some(cap) = partition_max_nodes {
        max_nodes = max_nodes.min(cap.max(1) as usize);
    }
    if candidates.len() < min_nodes {
        return None;
    }
    let take = max_nodes.min(candidates.len());
    let subset: Vec<&Node> = candidates.into_iter().take(take).collect();
    if subset.len() < min_nodes {
        None
    } else {
        Some(subset)
    }
}

//! The placement engine: turns a (policy, workload) pair and a candidate node into a
//! filter/score decision, by composing the group catalog, quota calculator and occupancy
//! counter.

use std::{collections::BTreeMap, sync::Arc};

use k8s_openapi::api::apps::v1::Deployment;

use crate::{
    catalog::GroupCatalog,
    crd::Policy,
    error::{NodeOutsideGroupsAfterFilterSnafu, Result},
    occupancy::OccupancyCounter,
    quota,
};

/// Highest score [`score`] can return; mirrors the scheduler framework's `MaxNodeScore`.
pub const MAX_SCORE: i64 = 10;

/// Precomputed context carried from pre-filter through every per-node filter/score call for one
/// scheduling cycle. Building it requires cluster reads; evaluating it against a node does not.
#[derive(Debug, Clone)]
pub struct ScratchState {
    policy: Arc<Policy>,
    node_to_group: Arc<BTreeMap<String, String>>,
    desired: Arc<BTreeMap<String, i32>>,
    current: Arc<BTreeMap<String, i32>>,
    /// Target group names in first-appearance order, for Score's rank tie-break.
    group_order: Arc<Vec<String>>,
}

/// Computes the [`ScratchState`] for one pending instance's (policy, workload) pair.
///
/// Returns `Ok(None)` when the policy targets no resolvable node groups; callers should treat
/// that the same as pre-filter finding no governing policy at all, i.e. success-with-no-state.
pub async fn pre_filter(
    catalog: &GroupCatalog,
    occupancy: &OccupancyCounter,
    policy: Policy,
    workload: &Deployment,
) -> Result<Option<ScratchState>> {
    let target_groups = policy.spec.target_group_names();
    let views = catalog.resolve(&target_groups).await?;
    if views.is_empty() {
        return Ok(None);
    }

    let node_to_group = GroupCatalog::node_to_group(&views);
    let desired = quota::desired(&policy.spec.placement.static_weight_list, replicas(workload));
    let current = occupancy.current(catalog, &policy, workload).await?;
    let group_order = policy.spec.ordered_group_names();

    Ok(Some(ScratchState {
        policy: Arc::new(policy),
        node_to_group: Arc::new(node_to_group),
        desired: Arc::new(desired),
        current: Arc::new(current),
        group_order: Arc::new(group_order),
    }))
}

fn replicas(workload: &Deployment) -> i32 {
    workload.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
}

/// Admits a candidate node iff it belongs to one of the policy's target groups and that group
/// has not yet reached its desired instance count.
///
/// A node outside every target group is filtered out silently (the ordinary case: most nodes
/// are not in any group targeted by this policy). A node inside a target group whose quota is
/// already met is also filtered out, without being treated as an error.
pub fn filter(state: &ScratchState, node_name: &str) -> bool {
    let Some(group) = state.node_to_group.get(node_name) else {
        return false;
    };
    let want = state.desired.get(group).copied().unwrap_or(0);
    let have = state.current.get(group).copied().unwrap_or(0);
    have < want
}

/// Scores a node that already passed [`filter`], in `[0, MAX_SCORE]`.
///
/// Ranks every target group by `desired - current` descending (ties broken by the group's
/// first-appearance order in the policy's weight list) and scores the candidate's group by how
/// high it ranks: the top-ranked group scores exactly `MAX_SCORE`, the bottom-ranked scores
/// exactly `0`, and groups in between are spread linearly across that range. With a single
/// target group there is nothing to rank against, so it scores `MAX_SCORE` outright. This
/// breaks ties among admissible nodes by preferring the group farthest from its target, so fill
/// smooths across groups even when one group has many more candidate nodes than another.
///
/// Returns [`Error::NodeOutsideGroupsAfterFilter`] if called on a node [`filter`] would have
/// rejected: Filter and Score disagreeing is a programming error in the caller, not a runtime
/// condition to recover from.
pub fn score(state: &ScratchState, node_name: &str) -> Result<i64> {
    let fail = || {
        NodeOutsideGroupsAfterFilterSnafu {
            node: node_name.to_string(),
            policy_namespace: state.policy.metadata.namespace.clone().unwrap_or_default(),
            policy_name: state.policy.metadata.name.clone().unwrap_or_default(),
        }
        .fail()
    };

    let Some(candidate_group) = state.node_to_group.get(node_name) else {
        return fail();
    };

    let diff = |group: &str| -> i64 {
        let want = i64::from(state.desired.get(group).copied().unwrap_or(0));
        let have = i64::from(state.current.get(group).copied().unwrap_or(0));
        want - have
    };

    let mut ranked: Vec<&String> = state.group_order.iter().collect();
    ranked.sort_by_key(|group| std::cmp::Reverse(diff(group)));

    let Some(rank) = ranked.iter().position(|group| *group == candidate_group) else {
        return fail();
    };

    if ranked.len() == 1 {
        return Ok(MAX_SCORE);
    }

    let last_rank = (ranked.len() - 1) as f64;
    let fraction = 1.0 - rank as f64 / last_rank;
    Ok((fraction * MAX_SCORE as f64).round() as i64)
}

#[cfg(test)]
mod test {
    use super::*;

    /// `desired`'s order becomes `group_order`: tests list groups in the first-appearance
    /// order they want the rank tie-break to use.
    fn state(node_to_group: &[(&str, &str)], desired: &[(&str, i32)], current: &[(&str, i32)]) -> ScratchState {
        let spec = crate::crd::PolicySpec {
            resource_selectors: vec![],
            placement: crate::crd::PlacementSpec::default(),
        };
        ScratchState {
            policy: Arc::new(Policy::new("p", spec)),
            node_to_group: Arc::new(
                node_to_group
                    .iter()
                    .map(|(n, g)| (n.to_string(), g.to_string()))
                    .collect(),
            ),
            desired: Arc::new(desired.iter().map(|(g, v)| (g.to_string(), *v)).collect()),
            current: Arc::new(current.iter().map(|(g, v)| (g.to_string(), *v)).collect()),
            group_order: Arc::new(desired.iter().map(|(g, _)| g.to_string()).collect()),
        }
    }

    #[test]
    fn filter_rejects_node_outside_every_target_group() {
        let state = state(&[], &[("A", 1)], &[]);
        assert!(!filter(&state, "n1"));
    }

    #[test]
    fn filter_rejects_node_whose_group_quota_is_met() {
        let state = state(&[("n1", "A")], &[("A", 2)], &[("A", 2)]);
        assert!(!filter(&state, "n1"));
    }

    #[test]
    fn filter_admits_node_whose_group_has_room() {
        let state = state(&[("n1", "A")], &[("A", 2)], &[("A", 1)]);
        assert!(filter(&state, "n1"));
    }

    #[test]
    fn score_ranks_the_more_underfilled_group_higher() {
        // diff(A) = 4, diff(B) = 2: A outranks B. Two groups, so top/bottom rank hit the
        // endpoints exactly.
        let state = state(&[("n1", "A"), ("n2", "B")], &[("A", 4), ("B", 4)], &[("A", 0), ("B", 2)]);
        let score_a = score(&state, "n1").unwrap();
        let score_b = score(&state, "n2").unwrap();
        assert!(score_a > score_b, "expected {score_a} > {score_b}");
        assert_eq!(score_a, MAX_SCORE);
        assert_eq!(score_b, 0);
    }

    #[test]
    fn score_spreads_three_groups_linearly_across_the_range() {
        // diff(A) = 6, diff(B) = 3, diff(C) = 0: ranks A, B, C in that order.
        let state = state(
            &[("n1", "A"), ("n2", "B"), ("n3", "C")],
            &[("A", 6), ("B", 6), ("C", 6)],
            &[("A", 0), ("B", 3), ("C", 6)],
        );
        assert_eq!(score(&state, "n1").unwrap(), MAX_SCORE);
        assert_eq!(score(&state, "n2").unwrap(), MAX_SCORE / 2);
        assert_eq!(score(&state, "n3").unwrap(), 0);
    }

    #[test]
    fn score_breaks_diff_ties_by_first_appearance_order() {
        // diff(A) == diff(B) == 2: A listed first in `desired`, so A outranks B.
        let state = state(&[("n1", "A"), ("n2", "B")], &[("A", 4), ("B", 4)], &[("A", 2), ("B", 2)]);
        let score_a = score(&state, "n1").unwrap();
        let score_b = score(&state, "n2").unwrap();
        assert!(score_a > score_b, "expected {score_a} > {score_b}");
    }

    #[test]
    fn score_is_max_for_the_only_target_group() {
        // N = 1: nothing to rank against, so the sole group always scores MAX_SCORE.
        let state = state(&[("n1", "A")], &[("A", 4)], &[("A", 0)]);
        assert_eq!(score(&state, "n1").unwrap(), MAX_SCORE);
    }

    #[test]
    fn score_errors_on_a_node_filter_would_have_rejected() {
        let state = state(&[], &[("A", 1)], &[]);
        assert!(score(&state, "n1").is_err());
    }
}

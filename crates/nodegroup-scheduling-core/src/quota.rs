//! Pure function: (weights, replica count) -> desired instance count per group.

use std::collections::BTreeMap;

use tracing::warn;

use crate::crd::StaticWeightList;

/// Computes the desired number of instances per node group for a workload with `replicas`
/// total replicas, distributed according to `weights`.
///
/// `Σ result.values() == replicas` whenever `weights` is non-empty. A multi-group entry gets
/// its full weight assigned to the first listed group and zero to the rest; this is the
/// documented limitation inherited from the source system, not an oversight.
pub fn desired(weights: &StaticWeightList, replicas: i32) -> BTreeMap<String, i32> {
    if weights.is_empty() {
        return BTreeMap::new();
    }

    let sum: i64 = weights.iter().map(|w| w.weight).sum();

    let mut result: BTreeMap<String, i32> = BTreeMap::new();
    for entry in weights {
        if entry.node_group_names.len() > 1 {
            warn!(
                groups = ?entry.node_group_names,
                "multi-group weight entry: assigning full weight to the first group, zero to the rest"
            );
        }

        let share = if sum == 0 {
            0
        } else {
            round_half_up(entry.weight as f64 / sum as f64 * f64::from(replicas))
        };

        for (index, group) in entry.node_group_names.iter().enumerate() {
            let value = if index == 0 { share } else { 0 };
            result.entry(group.clone()).or_insert(0);
            *result.get_mut(group).expect("just inserted") += value;
        }
    }

    let allocated: i32 = result.values().sum();
    let leftover = replicas - allocated;
    if leftover != 0 {
        if let Some(smallest) = result.keys().next().cloned() {
            *result.get_mut(&smallest).expect("key came from result") += leftover;
        }
    }

    result
}

fn round_half_up(value: f64) -> i32 {
    value.floor() as i32 + i32::from(value.fract() >= 0.5)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crd::StaticWeight;

    fn weight(groups: &[&str], weight: i64) -> StaticWeight {
        StaticWeight {
            node_group_names: groups.iter().map(|s| s.to_string()).collect(),
            weight,
        }
    }

    #[test]
    fn empty_weights_yield_empty_map() {
        assert_eq!(desired(&[], 10), BTreeMap::new());
    }

    #[test]
    fn equal_split() {
        let weights = vec![weight(&["A"], 1), weight(&["B"], 1)];
        let result = desired(&weights, 10);
        assert_eq!(result.get("A"), Some(&5));
        assert_eq!(result.get("B"), Some(&5));
        assert_eq!(result.values().sum::<i32>(), 10);
    }

    #[test]
    fn zero_weight_group_gets_nothing() {
        let weights = vec![weight(&["beijing"], 0), weight(&["shanghai"], 1)];
        let result = desired(&weights, 10);
        assert_eq!(result.get("beijing"), Some(&0));
        assert_eq!(result.get("shanghai"), Some(&10));
    }

    #[test]
    fn multi_group_entry_assigns_full_weight_to_first_group() {
        let weights = vec![weight(&["beijing", "hangzhou"], 1), weight(&["shanghai"], 4)];
        let result = desired(&weights, 10);
        assert_eq!(result.get("beijing"), Some(&2));
        assert_eq!(result.get("hangzhou"), Some(&0));
        assert_eq!(result.get("shanghai"), Some(&8));
        assert_eq!(result.values().sum::<i32>(), 10);
    }

    #[test]
    fn rounding_remainder_goes_to_lexicographically_smallest_group() {
        let weights = vec![weight(&["A"], 1), weight(&["B"], 1), weight(&["C"], 1)];
        let result = desired(&weights, 10);
        assert_eq!(result.values().sum::<i32>(), 10);
        let counts: Vec<i32> = result.values().copied().collect();
        let fours = counts.iter().filter(|&&c| c == 4).count();
        let threes = counts.iter().filter(|&&c| c == 3).count();
        assert_eq!((fours, threes), (1, 2));
        assert_eq!(result.get("A"), Some(&4));
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let weights = vec![weight(&["A"], 3), weight(&["B"], 7)];
        assert_eq!(desired(&weights, 37), desired(&weights, 37));
    }

    #[test]
    fn all_equal_weights_split_within_one_of_each_other() {
        // 9 / 4 = 2.25 per group: half-up rounding floors every share to 2, leaving a leftover
        // of 1 that the deterministic tie-break hands to the lexicographically smallest group.
        let weights = vec![weight(&["A"], 1), weight(&["B"], 1), weight(&["C"], 1), weight(&["D"], 1)];
        let result = desired(&weights, 9);
        let values: Vec<i32> = result.values().copied().collect();
        for v in values {
            assert!((2..=3).contains(&v), "unexpected share {v}");
        }
        assert_eq!(result.values().sum::<i32>(), 9);
    }
}

//! Custom resources consumed by the placement engine: [`NodeGroup`] partitions worker nodes,
//! [`Policy`] binds a set of workloads to a weighted distribution across those partitions.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An administratively named subset of worker nodes.
///
/// Membership is the union of `spec.nodes` and whatever the live node set matches against
/// `spec.matchLabels`; `status.containedNodes` is written by the Reconciler purely for
/// observability and is never read back by the catalog.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "scheduling.nodegroups.io",
    version = "v1alpha1",
    kind = "NodeGroup",
    status = "NodeGroupStatus",
    shortname = "ng"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    /// Names of nodes that belong to this group regardless of their labels.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Nodes carrying all of these labels also belong to this group.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupStatus {
    /// Names of nodes the group resolved to as of the last Reconciler pass.
    #[serde(default)]
    pub contained_nodes: Vec<String>,
}

/// Picks the workloads governed by a [`Policy`].
///
/// Only an exact `namespace`+`name` reference is honored by this implementation; a selector
/// with either field empty is rejected (see `Error::MalformedSelector`). `label_selector` is
/// carried in the schema for forward compatibility with a label-based selection pathway but is
/// not currently evaluated.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
}

/// One entry of a [`StaticWeightList`]: a positive weight shared by one or more node groups.
///
/// When `node_group_names` has more than one entry, the full weight is assigned to the first
/// group and zero to the rest (see the Quota Calculator algorithm); this is a documented
/// limitation inherited from the source system, not a bug.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticWeight {
    pub node_group_names: Vec<String>,
    pub weight: i64,
}

pub type StaticWeightList = Vec<StaticWeight>;

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSpec {
    #[serde(default)]
    pub static_weight_list: StaticWeightList,
}

/// Binds a set of workloads (via `resource_selectors`) to a weighted distribution across
/// node groups (via `placement`).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "scheduling.nodegroups.io",
    version = "v1alpha1",
    kind = "Policy",
    namespaced,
    status = "PolicyStatus",
    shortname = "ngpolicy"
)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    pub resource_selectors: Vec<ResourceSelector>,

    #[serde(default)]
    pub placement: PlacementSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {}

impl PolicySpec {
    /// All node group names referenced anywhere in the placement spec, deduplicated and sorted.
    pub fn target_group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .placement
            .static_weight_list
            .iter()
            .flat_map(|w| w.node_group_names.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// The same group names as [`Self::target_group_names`], but in first-appearance order
    /// while iterating `static_weight_list` entries left to right (each entry's groups in
    /// listed order). Score's rank tie-break relies on this order, not alphabetical order.
    pub fn ordered_group_names(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut names = Vec::new();
        for entry in &self.placement.static_weight_list {
            for name in &entry.node_group_names {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
        }
        names
    }
}

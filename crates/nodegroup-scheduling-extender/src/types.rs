//! Wire types for the `kube-scheduler` extender contract: `ExtenderArgs` in, `ExtenderFilterResult`
//! / `HostPriorityList` out.

use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};

/// Body of both `/schedule/filter` and `/schedule/prioritize` requests.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtenderArgs {
    /// The pending instance being scheduled.
    pub pod: Pod,
    /// Candidate nodes, when the host scheduler sends full objects rather than just names.
    #[serde(default)]
    pub nodes: Option<NodeList>,
    /// Candidate node names; used when `nodes` is absent.
    #[serde(default)]
    pub node_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeList {
    pub items: Vec<Node>,
}

impl ExtenderArgs {
    pub fn candidate_node_names(&self) -> Vec<String> {
        if let Some(names) = &self.node_names {
            return names.clone();
        }
        self.nodes
            .as_ref()
            .map(|list| {
                list.items
                    .iter()
                    .filter_map(|node| node.metadata.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Response body of `/schedule/filter`.
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ExtenderFilterResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    pub node_names: Option<Vec<String>>,
    #[serde(rename = "FailedNodes", skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub failed_nodes: std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// One entry of `/schedule/prioritize`'s response: a node name plus its integer score.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct HostPriority {
    pub host: String,
    pub score: i64,
}

pub type HostPriorityList = Vec<HostPriority>;

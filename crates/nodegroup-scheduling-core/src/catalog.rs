//! Materializes `{group -> member nodes}` from [`NodeGroup`] objects.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::{api::ListParams, Api, Client, ResourceExt};
use snafu::ResultExt;
use tracing::{instrument, warn};

use crate::{
    crd::NodeGroup,
    error::{GetObjectSnafu, ListObjectsSnafu, Result},
};

/// A resolved [`NodeGroup`]: its name plus the concrete set of member node names, the union of
/// its explicit node list and whatever the live node set matches against `matchLabels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupView {
    pub name: String,
    pub nodes: Vec<String>,
}

/// Reads [`NodeGroup`] and [`Node`] objects from the cluster cache and exposes the
/// group-membership views the rest of the engine needs.
pub struct GroupCatalog {
    node_groups: Api<NodeGroup>,
    nodes: Api<Node>,
}

impl GroupCatalog {
    pub fn new(client: Client) -> Self {
        Self {
            node_groups: Api::all(client.clone()),
            nodes: Api::all(client),
        }
    }

    /// Fetches the named groups. Missing groups are omitted with a warning rather than failing
    /// the call; a read failure from the cache is the only error.
    #[instrument(skip(self))]
    pub async fn resolve(&self, group_names: &[String]) -> Result<Vec<GroupView>> {
        let mut views = Vec::with_capacity(group_names.len());
        for name in group_names {
            let found = self
                .node_groups
                .get_opt(name)
                .await
                .context(GetObjectSnafu {
                    kind: "NodeGroup",
                    name: name.clone(),
                })?;
            match found {
                Some(group) => views.push(self.resolve_one(group).await?),
                None => {
                    warn!(node_group = %name, "node group referenced by policy not found, skipping");
                }
            }
        }
        Ok(views)
    }

    async fn resolve_one(&self, group: NodeGroup) -> Result<GroupView> {
        let mut members: Vec<String> = group.spec.nodes.clone();

        if !group.spec.match_labels.is_empty() {
            let selector = group
                .spec
                .match_labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            let list_params = ListParams::default().labels(&selector);
            let matched = self
                .nodes
                .list(&list_params)
                .await
                .context(ListObjectsSnafu { kind: "Node" })?;
            for node in matched.items {
                let name = node.name_any();
                if !members.contains(&name) {
                    members.push(name);
                }
            }
        }

        Ok(GroupView {
            name: group.name_any(),
            nodes: members,
        })
    }

    /// Flattens a resolved group set into a `node -> group` map. If two groups claim the same
    /// node, the first one encountered (in `groups` order) wins and a warning is emitted.
    pub fn node_to_group(groups: &[GroupView]) -> BTreeMap<String, String> {
        let mut mapping = BTreeMap::new();
        for group in groups {
            for node in &group.nodes {
                match mapping.get(node) {
                    None => {
                        mapping.insert(node.clone(), group.name.clone());
                    }
                    Some(existing) if existing != &group.name => {
                        warn!(
                            node = %node,
                            first_group = %existing,
                            conflicting_group = %group.name,
                            "node claimed by more than one group, first one wins"
                        );
                    }
                    Some(_) => {}
                }
            }
        }
        mapping
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn view(name: &str, nodes: &[&str]) -> GroupView {
        GroupView {
            name: name.to_string(),
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn node_to_group_flattens_disjoint_groups() {
        let groups = vec![view("a", &["n1", "n2"]), view("b", &["n3"])];
        let mapping = GroupCatalog::node_to_group(&groups);
        assert_eq!(mapping.get("n1").map(String::as_str), Some("a"));
        assert_eq!(mapping.get("n2").map(String::as_str), Some("a"));
        assert_eq!(mapping.get("n3").map(String::as_str), Some("b"));
    }

    #[test]
    fn node_to_group_first_group_wins_on_conflict() {
        let groups = vec![view("a", &["n1"]), view("b", &["n1"])];
        let mapping = GroupCatalog::node_to_group(&groups);
        assert_eq!(mapping.get("n1").map(String::as_str), Some("a"));
    }
}

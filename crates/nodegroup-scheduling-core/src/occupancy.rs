//! Counts currently-placed instances per target group for one (policy, workload) pair.

use std::collections::BTreeMap;

use k8s_openapi::{api::apps::v1::Deployment, api::core::v1::Pod};
use kube::{api::ListParams, core::Selector, Api, Client, ResourceExt};
use snafu::ResultExt;
use tracing::{debug, instrument};

use crate::{
    catalog::GroupCatalog,
    crd::Policy,
    error::{ListObjectsSnafu, Result},
};

/// Counts placed instances of `workload` per node group targeted by `policy`.
pub struct OccupancyCounter {
    client: Client,
}

impl OccupancyCounter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The count depends only on the snapshot of instances and node groups read during this
    /// call; it is not cached across calls.
    #[instrument(skip(self, catalog, policy, workload))]
    pub async fn current(
        &self,
        catalog: &GroupCatalog,
        policy: &Policy,
        workload: &Deployment,
    ) -> Result<BTreeMap<String, i32>> {
        let target_groups = policy.spec.target_group_names();
        let views = catalog.resolve(&target_groups).await?;
        let node_to_group = GroupCatalog::node_to_group(&views);

        let pods: Api<Pod> = Api::namespaced(
            self.client.clone(),
            workload.namespace().unwrap_or_else(|| "default".to_string()).as_str(),
        );

        let selector = pod_selector(workload);
        let list_params = match &selector {
            Some(selector) => ListParams::default().labels(&selector.to_string()),
            None => ListParams::default(),
        };
        let pod_list = pods
            .list(&list_params)
            .await
            .context(ListObjectsSnafu { kind: "Pod" })?;

        let mut counts: BTreeMap<String, i32> = BTreeMap::new();
        for pod in &pod_list.items {
            let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else {
                continue;
            };
            match node_to_group.get(&node_name) {
                Some(group) => *counts.entry(group.clone()).or_insert(0) += 1,
                None => debug!(
                    pod = %pod.name_any(),
                    node = %node_name,
                    "instance placed outside every target group, ignoring (Reconciler's concern)"
                ),
            }
        }

        Ok(counts)
    }
}

/// Extracts a `kube::core::Selector` from a Deployment's pod template label selector, if any.
fn pod_selector(workload: &Deployment) -> Option<Selector> {
    let match_labels = workload.spec.as_ref()?.selector.match_labels.clone()?;
    let expression = match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    expression.parse::<Selector>().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use std::collections::BTreeMap as Map;

    fn deployment_with_labels(labels: &[(&str, &str)]) -> Deployment {
        let mut match_labels = Map::new();
        for (k, v) in labels {
            match_labels.insert(k.to_string(), v.to_string());
        }
        Deployment {
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(match_labels),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_selector_is_built_from_match_labels() {
        let deploy = deployment_with_labels(&[("app", "web")]);
        let selector = pod_selector(&deploy).expect("selector");
        assert_eq!(selector.to_string(), "app=web");
    }

    #[test]
    fn pod_selector_is_none_without_a_template_selector() {
        let deploy = Deployment::default();
        assert!(pod_selector(&deploy).is_none());
    }
}

//! Finds the [`Policy`] (if any) governing a pending instance, and the workload it belongs to.

use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
use kube::{Api, Client, ResourceExt};
use snafu::ResultExt;
use tracing::instrument;

use crate::{
    crd::{Policy, ResourceSelector},
    error::{GetObjectSnafu, ListObjectsSnafu, MalformedSelectorSnafu, Result},
};

/// Resolves the `(Policy, Deployment)` pair that governs a pending instance, by evaluating every
/// policy's resource selectors and matching the resolved workload's pod-template label selector
/// against the instance's own labels.
///
/// Only an exact namespace/name reference in `resource_selectors` is honored; a selector with
/// either field blank is rejected rather than silently skipped.
pub struct PolicyIndex {
    policies: Api<Policy>,
    deployments: Api<Deployment>,
}

impl PolicyIndex {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            policies: Api::namespaced(client.clone(), namespace),
            deployments: Api::namespaced(client, namespace),
        }
    }

    /// Returns `Ok(None)` when no policy governs `instance`: the ordinary case for most
    /// instances, not an error.
    #[instrument(skip(self, instance), fields(instance = %instance.name_any()))]
    pub async fn find_governing(&self, instance: &Pod) -> Result<Option<(Policy, Deployment)>> {
        let instance_namespace = instance.namespace().unwrap_or_default();
        let instance_labels = instance.metadata.labels.clone().unwrap_or_default();

        let policies = self
            .policies
            .list(&Default::default())
            .await
            .context(ListObjectsSnafu { kind: "Policy" })?;

        for policy in policies.items {
            for selector in &policy.spec.resource_selectors {
                if selector.kind != "Deployment" {
                    continue;
                }
                if selector_rejects_blank(selector) {
                    return MalformedSelectorSnafu {
                        policy_namespace: policy.namespace().unwrap_or_default(),
                        policy_name: policy.name_any(),
                    }
                    .fail();
                }
                if selector.namespace != instance_namespace {
                    continue;
                }

                let deployment = self
                    .deployments
                    .get_opt(&selector.name)
                    .await
                    .context(GetObjectSnafu {
                        kind: "Deployment",
                        name: selector.name.clone(),
                    })?;
                let Some(deployment) = deployment else {
                    continue;
                };

                if workload_selector_matches(&deployment, &instance_labels) {
                    return Ok(Some((policy, deployment)));
                }
            }
        }
        Ok(None)
    }
}

/// Whether `deployment`'s pod-template label selector is a subset of `instance_labels`.
fn workload_selector_matches(
    deployment: &Deployment,
    instance_labels: &std::collections::BTreeMap<String, String>,
) -> bool {
    let Some(match_labels) = deployment.spec.as_ref().and_then(|s| s.selector.match_labels.as_ref()) else {
        return false;
    };
    match_labels
        .iter()
        .all(|(k, v)| instance_labels.get(k) == Some(v))
}

fn selector_rejects_blank(selector: &ResourceSelector) -> bool {
    selector.namespace.is_empty() || selector.name.is_empty()
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use std::collections::BTreeMap;

    fn deployment_selecting(labels: &[(&str, &str)]) -> Deployment {
        let mut match_labels = BTreeMap::new();
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

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn instance_with_all_selector_labels_matches() {
        let deployment = deployment_selecting(&[("app", "web")]);
        let instance_labels = labels(&[("app", "web"), ("pod-template-hash", "abc123")]);
        assert!(workload_selector_matches(&deployment, &instance_labels));
    }

    #[test]
    fn instance_missing_a_selector_label_does_not_match() {
        let deployment = deployment_selecting(&[("app", "web")]);
        let instance_labels = labels(&[("app", "other")]);
        assert!(!workload_selector_matches(&deployment, &instance_labels));
    }

    #[test]
    fn a_deployment_without_a_selector_never_matches() {
        let deployment = Deployment::default();
        let instance_labels = labels(&[("app", "web")]);
        assert!(!workload_selector_matches(&deployment, &instance_labels));
    }

    #[test]
    fn blank_namespace_or_name_selector_is_flagged() {
        let sel = ResourceSelector {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            namespace: String::new(),
            name: "web".to_string(),
            label_selector: None,
        };
        assert!(selector_rejects_blank(&sel));
    }
}

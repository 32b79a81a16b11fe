//! Watches `Policy` and `NodeGroup` objects and deletes instances placed beyond their group's
//! quota, so the next scheduling round refills the deficit groups.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
use kube::{
    api::DeleteParams,
    runtime::{controller::Action, reflector, reflector::ObjectRef, watcher, Controller, WatchStreamExt},
    Api, Client, ResourceExt,
};
use nodegroup_scheduling_core::{
    catalog::GroupCatalog,
    crd::{NodeGroup, Policy},
    quota,
};
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};

/// Shared context injected into every `reconcile`/`on_error` invocation.
pub struct Context {
    pub client: Client,
    pub catalog: GroupCatalog,
}

pub async fn run(client: Client) {
    let policies: Api<Policy> = Api::all(client.clone());
    let node_groups: Api<NodeGroup> = Api::all(client.clone());
    let context = Arc::new(Context {
        client: client.clone(),
        catalog: GroupCatalog::new(client.clone()),
    });

    // A node-group membership change can affect the occupancy of every policy that targets it;
    // resolving exactly which policies are affected would require the same selector evaluation
    // the reconcile loop already does, so the mapper instead requeues every cached policy. The
    // reader is populated by the primary watch below and read synchronously here, no I/O.
    let (policy_reader, policy_writer) = reflector::store();
    let policy_stream = watcher(policies, watcher::Config::default())
        .default_backoff()
        .reflect(policy_writer)
        .applied_objects();

    Controller::for_stream(policy_stream, policy_reader.clone())
        .watches(node_groups, watcher::Config::default(), move |_node_group| {
            policy_reader
                .state()
                .into_iter()
                .map(|policy| ObjectRef::from_obj(&*policy))
        })
        .shutdown_on_signal()
        .run(reconcile, on_error, context)
        .for_each(|result| async move {
            match result {
                Ok((policy, _action)) => info!(policy = %policy.name, "reconciled policy"),
                Err(error) => warn!(%error, "reconcile failed, will be requeued"),
            }
        })
        .await;
}

#[instrument(skip(policy, ctx), fields(policy = %policy.name_any()))]
async fn reconcile(policy: Arc<Policy>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = policy.namespace().unwrap_or_default();
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut errors = Vec::new();
    for selector in &policy.spec.resource_selectors {
        if selector.kind != "Deployment" {
            continue;
        }
        let workload = match deployments.get_opt(&selector.name).await {
            Ok(Some(workload)) => workload,
            Ok(None) => continue,
            Err(source) => {
                errors.push(Error::Engine {
                    policy_namespace: namespace.clone(),
                    policy_name: policy.name_any(),
                    source: nodegroup_scheduling_core::error::Error::GetObject {
                        kind: "Deployment",
                        name: selector.name.clone(),
                        source,
                    },
                });
                continue;
            }
        };

        errors.extend(reconcile_workload(&policy, &workload, &ctx).await);
    }

    if errors.is_empty() {
        return Ok(Action::await_change());
    }

    for error in &errors {
        warn!(policy = %policy.name_any(), %error, "workload reconcile error, aggregating");
    }
    Err(Error::Aggregate {
        policy_namespace: namespace,
        policy_name: policy.name_any(),
        errors,
    })
}

/// Reconciles one workload governed by `policy`, attempting every marked-excess instance's
/// deletion even if some fail, and returning every error encountered rather than stopping at
/// the first.
async fn reconcile_workload(policy: &Policy, workload: &Deployment, ctx: &Context) -> Vec<Error> {
    let target_groups = policy.spec.target_group_names();
    let views = match ctx.catalog.resolve(&target_groups).await {
        Ok(views) => views,
        Err(source) => {
            return vec![Error::Engine {
                policy_namespace: policy.namespace().unwrap_or_default(),
                policy_name: policy.name_any(),
                source,
            }];
        }
    };
    let node_to_group = GroupCatalog::node_to_group(&views);
    let replicas = workload.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let desired = quota::desired(&policy.spec.placement.static_weight_list, replicas);

    let namespace = workload.namespace().unwrap_or_default();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(match_labels) = workload
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
    else {
        return Vec::new();
    };
    let selector = match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    let list_params = kube::api::ListParams::default().labels(&selector);
    let pod_list = match pods.list(&list_params).await {
        Ok(pod_list) => pod_list,
        Err(source) => {
            return vec![Error::ListInstances {
                policy_namespace: policy.namespace().unwrap_or_default(),
                policy_name: policy.name_any(),
                source,
            }];
        }
    };

    let mut by_group: BTreeMap<String, Vec<&Pod>> = BTreeMap::new();
    for pod in &pod_list.items {
        let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_ref()) else {
            continue;
        };
        if let Some(group) = node_to_group.get(node_name) {
            by_group.entry(group.clone()).or_default().push(pod);
        }
    }

    let mut errors = Vec::new();
    for excess in excess_instances(by_group, &desired) {
        if let Err(error) = delete_instance(&pods, excess, policy).await {
            errors.push(error);
        }
    }
    errors
}

/// Within each group, keeps the first `desired[group]` instances (by name, ascending) and
/// returns the rest as excess, in deterministic order.
fn excess_instances<'a>(
    mut by_group: BTreeMap<String, Vec<&'a Pod>>,
    desired: &BTreeMap<String, i32>,
) -> Vec<&'a Pod> {
    let mut excess = Vec::new();
    for (group, pods_in_group) in &mut by_group {
        pods_in_group.sort_by_key(|pod| pod.name_any());
        let quota = desired.get(group).copied().unwrap_or(0).max(0) as usize;
        excess.extend(pods_in_group.drain(quota..));
    }
    excess
}

async fn delete_instance(pods: &Api<Pod>, pod: &Pod, policy: &Policy) -> Result<()> {
    let name = pod.name_any();
    let namespace = pod.namespace().unwrap_or_default();
    match pods.delete(&name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(instance = %name, namespace = %namespace, policy = %policy.name_any(), "deleted instance beyond group quota");
            Ok(())
        }
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(source) => Err(Error::DeleteInstance {
            namespace,
            name,
            source,
        }),
    }
}

fn on_error(policy: Arc<Policy>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(policy = %policy.name_any(), %error, "reconcile failed");
    Action::requeue(Duration::from_secs(30))
}

#[cfg(test)]
mod test {
    use super::*;

    fn pod_named(name: &str) -> Pod {
        Pod {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn keeps_quota_many_instances_per_group_and_flags_the_rest_as_excess() {
        let pods: Vec<Pod> = (1..=5).map(|i| pod_named(&format!("w-{i}"))).collect();
        let mut by_group: BTreeMap<String, Vec<&Pod>> = BTreeMap::new();
        by_group.insert("A".to_string(), pods.iter().collect());

        let mut desired = BTreeMap::new();
        desired.insert("A".to_string(), 2);

        let excess = excess_instances(by_group, &desired);
        let names: Vec<_> = excess.iter().map(|p| p.name_any()).collect();
        assert_eq!(names, vec!["w-3", "w-4", "w-5"]);
    }

    #[test]
    fn a_group_at_or_under_quota_has_no_excess() {
        let pods: Vec<Pod> = (1..=2).map(|i| pod_named(&format!("w-{i}"))).collect();
        let mut by_group: BTreeMap<String, Vec<&Pod>> = BTreeMap::new();
        by_group.insert("A".to_string(), pods.iter().collect());

        let mut desired = BTreeMap::new();
        desired.insert("A".to_string(), 2);

        assert!(excess_instances(by_group, &desired).is_empty());
    }

    #[test]
    fn reconciling_the_post_deletion_set_again_deletes_nothing() {
        let pods: Vec<Pod> = (1..=5).map(|i| pod_named(&format!("w-{i}"))).collect();
        let mut desired = BTreeMap::new();
        desired.insert("A".to_string(), 2);

        let mut by_group: BTreeMap<String, Vec<&Pod>> = BTreeMap::new();
        by_group.insert("A".to_string(), pods.iter().collect());
        let first_pass_excess = excess_instances(by_group, &desired);
        assert_eq!(first_pass_excess.len(), 3);

        let remaining: Vec<&Pod> = pods
            .iter()
            .filter(|pod| !first_pass_excess.iter().any(|excess| excess.name_any() == pod.name_any()))
            .collect();
        let mut second_pass: BTreeMap<String, Vec<&Pod>> = BTreeMap::new();
        second_pass.insert("A".to_string(), remaining);
        assert!(excess_instances(second_pass, &desired).is_empty());
    }
}

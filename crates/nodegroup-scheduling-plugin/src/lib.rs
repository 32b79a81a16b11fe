//! In-process scheduler plug-in: the same decision engine as the extender, wired up as a
//! library trait for hosts that embed plug-ins directly.

pub mod error;

use std::future::Future;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    runtime::{reflector, watcher, WatchStreamExt},
    Api, Client, Resource,
};
use nodegroup_scheduling_core::{
    catalog::GroupCatalog, crd::NodeGroup, crd::Policy, engine, occupancy::OccupancyCounter,
    policy_index::PolicyIndex, ScratchState,
};
use tokio::sync::watch;
use tracing::{instrument, warn};

pub use error::{Error, Result};

/// The name this plug-in registers itself under.
pub const PLUGIN_NAME: &str = "NodeGroupScheduling";

/// The pre-filter/filter/score extension points, matching the Placement Engine's three stages.
#[async_trait]
pub trait SchedulerPlugin {
    async fn pre_filter(&self, instance: &Pod) -> Result<Option<ScratchState>>;
    fn filter(&self, state: &ScratchState, node: &str) -> bool;
    fn score(&self, state: &ScratchState, node: &str) -> Result<i64>;
}

/// Spawns reflector watchers for `Policy`, `NodeGroup`, `Node` and `Pod` on construction and
/// exposes [`NodeGroupSchedulingPlugin::ready`] to await their initial list completing.
pub struct NodeGroupSchedulingPlugin {
    client: Client,
    catalog: GroupCatalog,
    occupancy: OccupancyCounter,
    ready_rx: watch::Receiver<bool>,
}

impl NodeGroupSchedulingPlugin {
    pub fn new(client: Client) -> Self {
        let policies: Api<Policy> = Api::all(client.clone());
        let node_groups: Api<NodeGroup> = Api::all(client.clone());
        let nodes: Api<Node> = Api::all(client.clone());
        let pods: Api<Pod> = Api::all(client.clone());

        let (policy_reader, policy_writer) = reflector::store();
        let (node_group_reader, node_group_writer) = reflector::store();
        let (node_reader, node_writer) = reflector::store();
        let (pod_reader, pod_writer) = reflector::store();

        tokio::spawn(drain(reflector::reflector(policy_writer, watcher(policies, watcher::Config::default()))));
        tokio::spawn(drain(reflector::reflector(
            node_group_writer,
            watcher(node_groups, watcher::Config::default()),
        )));
        tokio::spawn(drain(reflector::reflector(node_writer, watcher(nodes, watcher::Config::default()))));
        tokio::spawn(drain(reflector::reflector(pod_writer, watcher(pods, watcher::Config::default()))));

        let (ready_tx, ready_rx) = watch::channel(false);
        tokio::spawn(async move {
            let _ = futures::try_join!(
                policy_reader.wait_until_ready(),
                node_group_reader.wait_until_ready(),
                node_reader.wait_until_ready(),
                pod_reader.wait_until_ready(),
            );
            let _ = ready_tx.send(true);
        });

        Self {
            catalog: GroupCatalog::new(client.clone()),
            occupancy: OccupancyCounter::new(client.clone()),
            client,
            ready_rx,
        }
    }

    /// Resolves once the initial list of every watched object kind has completed. The
    /// constructor does not block on this itself so the host can start serving other plugins
    /// while informers warm up.
    pub fn ready(&self) -> impl Future<Output = ()> {
        wait_ready(self.ready_rx.clone())
    }
}

async fn wait_ready(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Drives a reflected watch stream to completion, discarding events: the store is the only
/// thing callers read from.
async fn drain<K>(stream: impl futures::Stream<Item = watcher::Result<watcher::Event<K>>>)
where
    K: Resource + Clone + 'static,
{
    stream.for_each(|_| futures::future::ready(())).await;
}

#[async_trait]
impl SchedulerPlugin for NodeGroupSchedulingPlugin {
    #[instrument(skip(self, instance), fields(instance = %instance.metadata.name.clone().unwrap_or_default()))]
    async fn pre_filter(&self, instance: &Pod) -> Result<Option<ScratchState>> {
        let namespace = instance
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let policy_index = PolicyIndex::new(self.client.clone(), &namespace);
        let Some((policy, workload)) = policy_index
            .find_governing(instance)
            .await
            .map_err(|source| Error::Engine {
                node: String::new(),
                source,
            })
            .inspect_err(|error| warn!(%error, "pre-filter failed to resolve governing policy"))?
        else {
            return Ok(None);
        };

        engine::pre_filter(&self.catalog, &self.occupancy, policy, &workload)
            .await
            .map_err(|source| Error::Engine {
                node: String::new(),
                source,
            })
            .inspect_err(|error| warn!(%error, "pre-filter failed to build scratch state"))
    }

    fn filter(&self, state: &ScratchState, node: &str) -> bool {
        engine::filter(state, node)
    }

    #[instrument(skip(self, state), fields(node))]
    fn score(&self, state: &ScratchState, node: &str) -> Result<i64> {
        engine::score(state, node).map_err(|source| Error::Engine {
            node: node.to_string(),
            source,
        })
        .inspect_err(|error| warn!(%error, node = %node, "scoring failed for node"))
    }
}

#[cfg(test)]
mod test {
    use super::wait_ready;
    use tokio::sync::watch;

    #[tokio::test]
    async fn ready_resolves_immediately_once_the_channel_already_holds_true() {
        let (_tx, rx) = watch::channel(true);
        wait_ready(rx).await;
    }

    #[tokio::test]
    async fn ready_resolves_once_the_channel_flips_to_true() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_ready(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn ready_returns_if_every_sender_is_dropped_without_flipping() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        wait_ready(rx).await;
    }
}

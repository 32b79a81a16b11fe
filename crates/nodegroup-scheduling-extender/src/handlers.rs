use std::collections::BTreeMap;

use axum::{body::Bytes, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use kube::Client;
use nodegroup_scheduling_core::{
    catalog::GroupCatalog, engine, occupancy::OccupancyCounter, policy_index::PolicyIndex, ScratchState,
};
use tracing::{info, warn};

use crate::types::{ExtenderArgs, ExtenderFilterResult, HostPriority, HostPriorityList};

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
}

pub async fn filter(State(state): State<AppState>, body: Bytes) -> Response {
    let args = match decode(&body) {
        Ok(args) => args,
        Err(error) => {
            warn!(%error, "failed to decode filter request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ExtenderFilterResult {
                    error,
                    ..Default::default()
                }),
            )
                .into_response();
        }
    };
    let candidates = args.candidate_node_names();

    let scratch = match governing_scratch_state(&state, &args).await {
        Ok(Some(scratch)) => scratch,
        Ok(None) => {
            info!("no governing policy for pending instance, admitting every candidate node");
            return Json(ExtenderFilterResult {
                node_names: Some(candidates),
                ..Default::default()
            })
            .into_response();
        }
        Err(error) => {
            warn!(%error, "failed to resolve governing policy for filter request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExtenderFilterResult {
                    error: error.to_string(),
                    ..Default::default()
                }),
            )
                .into_response();
        }
    };

    let mut admitted = Vec::new();
    let mut failed_nodes = BTreeMap::new();
    for node in &candidates {
        if engine::filter(&scratch, node) {
            admitted.push(node.clone());
        } else {
            failed_nodes.insert(
                node.clone(),
                "node is outside or over quota for this policy's target groups".to_string(),
            );
        }
    }

    Json(ExtenderFilterResult {
        node_names: Some(admitted),
        failed_nodes,
        ..Default::default()
    })
    .into_response()
}

pub async fn prioritize(State(state): State<AppState>, body: Bytes) -> Response {
    let args = match decode(&body) {
        Ok(args) => args,
        Err(error) => {
            warn!(%error, "failed to decode prioritize request body");
            return (StatusCode::BAD_REQUEST, Json(HostPriorityList::new())).into_response();
        }
    };
    let candidates = args.candidate_node_names();

    let scratch = match governing_scratch_state(&state, &args).await {
        Ok(Some(scratch)) => scratch,
        Ok(None) => {
            let scores: HostPriorityList = candidates
                .into_iter()
                .map(|host| HostPriority { host, score: 0 })
                .collect();
            return Json(scores).into_response();
        }
        Err(error) => {
            warn!(%error, "failed to resolve governing policy for prioritize request");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(HostPriorityList::new())).into_response();
        }
    };

    let mut scores = Vec::new();
    let mut had_error = false;
    for node in &candidates {
        let score = match engine::score(&scratch, node) {
            Ok(score) => score,
            Err(error) => {
                warn!(%error, node = %node, "scoring failed for node, assigning neutral score");
                had_error = true;
                0
            }
        };
        scores.push(HostPriority {
            host: node.clone(),
            score,
        });
    }

    if had_error {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(scores)).into_response();
    }
    Json(scores).into_response()
}

fn decode(body: &Bytes) -> Result<ExtenderArgs, String> {
    if body.is_empty() {
        return Err("empty request body".to_string());
    }
    serde_json::from_slice(body).map_err(|error| error.to_string())
}

/// Resolves the policy/workload governing the pending instance and precomputes its
/// [`ScratchState`]. `Ok(None)` means no policy governs this instance, the ordinary case; an
/// `Err` is a genuine cache failure or a malformed policy and is surfaced to the caller rather
/// than silently treated as "no governing policy".
async fn governing_scratch_state(state: &AppState, args: &ExtenderArgs) -> crate::Result<Option<ScratchState>> {
    let namespace = args.pod.metadata.namespace.clone().unwrap_or_default();
    let pod_name = args.pod.metadata.name.clone().unwrap_or_default();
    let to_engine_error = |source| crate::Error::Engine {
        pod_namespace: namespace.clone(),
        pod_name: pod_name.clone(),
        source,
    };

    let policy_index = PolicyIndex::new(state.client.clone(), &namespace);
    let Some((policy, workload)) = policy_index
        .find_governing(&args.pod)
        .await
        .map_err(to_engine_error)?
    else {
        return Ok(None);
    };

    let catalog = GroupCatalog::new(state.client.clone());
    let occupancy = OccupancyCounter::new(state.client.clone());
    engine::pre_filter(&catalog, &occupancy, policy, &workload)
        .await
        .map_err(to_engine_error)
}

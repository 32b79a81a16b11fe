use snafu::Snafu;

/// Errors produced by the group-placement decision engine and its collaborators.
///
/// `NotFound`-shaped failures from the underlying cache are not represented here: callers
/// (the catalog, the policy index) treat a missing object as an empty result, not an error.
/// What remains are genuine I/O failures and malformed input: transient failures are retried
/// by callers, malformed input is permanent.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to list {kind} objects"))]
    ListObjects {
        kind: &'static str,
        source: kube::Error,
    },

    #[snafu(display("failed to get {kind} {name:?}"))]
    GetObject {
        kind: &'static str,
        name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "resource selector in policy {policy_namespace}/{policy_name} is missing a namespace or name; only exact Deployment references are supported"
    ))]
    MalformedSelector {
        policy_namespace: String,
        policy_name: String,
    },

    #[snafu(display(
        "node {node} was admitted by Filter but is outside every target group of policy {policy_namespace}/{policy_name}; this indicates a bug, Filter and Score disagreed"
    ))]
    NodeOutsideGroupsAfterFilter {
        node: String,
        policy_namespace: String,
        policy_name: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

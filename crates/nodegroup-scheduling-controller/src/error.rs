use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to construct Kubernetes client"))]
    ClientConstruction { source: kube::Error },

    #[snafu(display("failed to bind controller manager health endpoint to {bind_address}"))]
    BindHealthEndpoint {
        bind_address: String,
        source: std::io::Error,
    },

    #[snafu(display("controller manager health endpoint failed"))]
    ServeHealthEndpoint { source: std::io::Error },

    #[snafu(display("decision engine failed while reconciling policy {policy_namespace}/{policy_name}"))]
    Engine {
        policy_namespace: String,
        policy_name: String,
        source: nodegroup_scheduling_core::Error,
    },

    #[snafu(display("failed to delete instance {namespace}/{name}"))]
    DeleteInstance {
        namespace: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("failed to list instances for policy {policy_namespace}/{policy_name}"))]
    ListInstances {
        policy_namespace: String,
        policy_name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "{count} error(s) occurred while reconciling policy {policy_namespace}/{policy_name}",
        count = errors.len()
    ))]
    Aggregate {
        policy_namespace: String,
        policy_name: String,
        errors: Vec<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

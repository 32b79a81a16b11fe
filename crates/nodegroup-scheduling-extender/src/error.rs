use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to construct Kubernetes client"))]
    ClientConstruction { source: kube::Error },

    #[snafu(display("failed to bind extender server to {bind_address}"))]
    Bind {
        bind_address: String,
        source: std::io::Error,
    },

    #[snafu(display("extender server failed"))]
    Serve { source: std::io::Error },

    #[snafu(display("decision engine failed while resolving governing policy for pod {pod_namespace}/{pod_name}"))]
    Engine {
        pod_namespace: String,
        pod_name: String,
        source: nodegroup_scheduling_core::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

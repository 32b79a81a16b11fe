use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("decision engine failed for node {node}"))]
    Engine {
        node: String,
        source: nodegroup_scheduling_core::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

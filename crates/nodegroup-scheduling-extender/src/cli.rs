use std::net::SocketAddr;

use clap::Parser;

pub const APP_NAME: &str = "nodegroup-scheduling-extender";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Address the extender HTTP server binds to.
    #[arg(long, default_value = "0.0.0.0:10053", env = "NODEGROUP_SCHEDULING_EXTENDER_BIND_ADDRESS")]
    pub bind_address: SocketAddr,

    /// Path to the kubeconfig used to build the policy-management client; empty uses the
    /// in-cluster config or `KUBECONFIG`/`~/.kube/config` as `kube::Client::try_default` does.
    #[arg(long, default_value = "", env = "NODEGROUP_SCHEDULING_EXTENDER_KUBECONFIG")]
    pub kubeconfig: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_bind_address_matches_the_documented_contract() {
        let cli = Cli::parse_from([APP_NAME]);
        assert_eq!(cli.bind_address, "0.0.0.0:10053".parse::<SocketAddr>().unwrap());
    }
}

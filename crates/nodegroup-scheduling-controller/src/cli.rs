use std::net::IpAddr;

use clap::{Parser, Subcommand};

pub const APP_NAME: &str = "nodegroup-scheduling-controller";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the NodeGroup and Policy CRD manifests as YAML and exit.
    Crd,

    /// Run the reconciler.
    Run(RunArguments),
}

#[derive(Debug, Parser)]
pub struct RunArguments {
    /// Address the health probe endpoint binds to.
    #[arg(long, default_value = "0.0.0.0", env = "NODEGROUP_SCHEDULING_CONTROLLER_BIND_ADDRESS")]
    pub bind_address: IpAddr,

    /// Port the health probe endpoint binds to.
    #[arg(long, default_value_t = 10359, env = "NODEGROUP_SCHEDULING_CONTROLLER_SECURE_PORT")]
    pub secure_port: u16,

    /// Whether to run leader election before starting the reconciler.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "NODEGROUP_SCHEDULING_CONTROLLER_LEADER_ELECT")]
    pub leader_elect: bool,

    /// Namespace the leader election lease is created in.
    #[arg(long, default_value = "default", env = "NODEGROUP_SCHEDULING_CONTROLLER_LEADER_ELECT_RESOURCE_NAMESPACE")]
    pub leader_elect_resource_namespace: String,

    /// Queries per second budget for the Kubernetes API client.
    #[arg(long, default_value_t = 40, env = "NODEGROUP_SCHEDULING_CONTROLLER_KUBE_API_QPS")]
    pub kube_api_qps: u32,

    /// Burst budget for the Kubernetes API client.
    #[arg(long, default_value_t = 60, env = "NODEGROUP_SCHEDULING_CONTROLLER_KUBE_API_BURST")]
    pub kube_api_burst: u32,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_defaults_match_the_documented_cli_surface() {
        let cli = Cli::parse_from([APP_NAME, "run"]);
        let Command::Run(run) = cli.command else {
            panic!("expected Run subcommand");
        };
        assert_eq!(run.bind_address, "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(run.secure_port, 10359);
        assert!(run.leader_elect);
        assert_eq!(run.kube_api_qps, 40);
        assert_eq!(run.kube_api_burst, 60);
    }

    #[test]
    fn crd_subcommand_parses() {
        let cli = Cli::parse_from([APP_NAME, "crd"]);
        assert!(matches!(cli.command, Command::Crd));
    }
}

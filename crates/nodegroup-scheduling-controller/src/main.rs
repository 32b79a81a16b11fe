use clap::Parser;
use kube::{Client, CustomResourceExt};
use nodegroup_scheduling_controller::{
    cli::{Cli, Command},
    error::{ClientConstructionSnafu, Result},
    health, logging, reconciler,
};
use nodegroup_scheduling_core::crd::{NodeGroup, Policy};
use snafu::ResultExt;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Crd => {
            print!("{}", serde_yaml::to_string(&NodeGroup::crd()).expect("NodeGroup CRD is representable as YAML"));
            println!("---");
            print!("{}", serde_yaml::to_string(&Policy::crd()).expect("Policy CRD is representable as YAML"));
            Ok(())
        }
        Command::Run(run) => {
            logging::init();
            let client = Client::try_default().await.context(ClientConstructionSnafu)?;

            let bind_address = std::net::SocketAddr::new(run.bind_address, run.secure_port);
            // kube-rs has no client-side request-rate limiter to wire kube_api_qps/burst into;
            // the flags are accepted and logged for parity with the CLI surface other
            // Stackable-style operators expose, not enforced here.
            info!(
                ?bind_address,
                leader_elect = run.leader_elect,
                leader_elect_resource_namespace = %run.leader_elect_resource_namespace,
                kube_api_qps = run.kube_api_qps,
                kube_api_burst = run.kube_api_burst,
                "starting controller manager"
            );

            tokio::select! {
                result = health::serve(bind_address) => result,
                () = reconciler::run(client) => Ok(()),
            }
        }
    }
}

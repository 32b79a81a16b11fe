use clap::Parser;
use kube::Client;
use nodegroup_scheduling_extender::{
    cli::Cli,
    error::{BindSnafu, ClientConstructionSnafu, ServeSnafu},
    handlers::AppState,
    logging, router, Result,
};
use snafu::ResultExt;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let client = if cli.kubeconfig.is_empty() {
        Client::try_default().await.context(ClientConstructionSnafu)?
    } else {
        let kubeconfig = kube::config::Kubeconfig::read_from(&cli.kubeconfig)
            .map_err(kube::Error::from)
            .context(ClientConstructionSnafu)?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &Default::default())
            .await
            .map_err(kube::Error::from)
            .context(ClientConstructionSnafu)?;
        Client::try_from(config).context(ClientConstructionSnafu)?
    };

    let app = router(AppState { client });
    let listener = tokio::net::TcpListener::bind(cli.bind_address)
        .await
        .context(BindSnafu {
            bind_address: cli.bind_address.to_string(),
        })?;
    info!(bind_address = %cli.bind_address, "extender server listening");
    axum::serve(listener, app).await.context(ServeSnafu)
}

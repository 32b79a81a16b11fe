use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_ENV: &str = "NODEGROUP_SCHEDULING_EXTENDER_LOG";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

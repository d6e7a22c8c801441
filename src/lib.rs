// DocuMate Gateway - AI proxy for the DocuMate study tools

pub mod api;
pub mod config;
pub mod proxy;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{GatewayConfig, Secrets};

pub async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::load()?;
    let secrets = Secrets::from_env(&config);
    tracing::info!("Loaded {:?}", secrets);

    let state = api::AppState::new(config, secrets);
    api::start_server(state).await
}

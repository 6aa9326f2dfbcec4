use dronenet::{Gateway, GatewayConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env();
    let gateway = match Gateway::bind(&config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Can't start the gateway: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway stopped: {e}");
        std::process::exit(1);
    }
}

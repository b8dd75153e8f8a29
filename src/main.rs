use clap::Parser;
use staticgenius::config::{GatewayConfig, setup_logging};
use staticgenius::coordinator::FallbackCoordinator;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = staticgenius::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let config = match GatewayConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };
    config.log_summary();

    let coordinator = match FallbackCoordinator::from_config(config) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            error!("Failed to build upstream client: {}", err);
            return;
        }
    };

    if let Err(err) =
        staticgenius::web::setup_server(&cli.listen_address, cli.port, coordinator).await
    {
        error!("Application error: {}", err);
    }
}

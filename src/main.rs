use anyhow::Result;
use clap::Parser;
use task_master_client::{
    app::App, cli::Args, config::Config, monitoring::setup_metrics, tracing_setup::setup_tracing,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup tracing/logging
    setup_tracing(&args.log_level, args.json_logs)?;

    info!(
        "Starting Task Master client v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = Config::from_args(&args)?;

    // Setup metrics server if enabled
    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let app = App::new(config)?;
    if let Err(e) = app.execute(args.command).await {
        error!("Command failed: {:#}", e);
        app.printer().print_error(&e.to_string());
        std::process::exit(1);
    }

    Ok(())
}

use clap::Parser;

use quarterdeck_core::config::Config;
use quarterdeck_core::telemetry::logging;
use quarterdeck_core::terminal::{app, cli::Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.logging.to_config())?;

    let mut config = Config::from_env();
    config.session_server = cli.session_server.clone();
    let target = cli.target.as_deref().unwrap_or("default");

    app::run(&config, target).await?;
    Ok(())
}

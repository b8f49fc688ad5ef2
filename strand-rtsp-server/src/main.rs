use std::env::args;
use std::error::Error;
use std::path::Path;

use strand_rtsp_server::app::config::AppConfig;
use strand_rtsp_server::app::App;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("LOG"))
        .init();

    let config = match args().nth(1) {
        Some(config_file) => AppConfig::from_file(Path::new(&config_file))?,
        None => AppConfig::default(),
    };
    tracing::debug!(?config, "read config");

    let mut app = App::start(config).await?;
    tracing::info!(local_addr = %app.local_addr(), "listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("stopping");
    app.stop().await;

    Ok(())
}

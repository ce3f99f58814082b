use clap::Parser;
use jamrank::engine::config::Args;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match args.load() {
        Ok(c) => c,
        Err(e) => {
            error!("[jamrank] {}", e);
            std::process::exit(2);
        }
    };

    let (bridge, stop) = match jamrank::build_bridge(&config) {
        Ok(parts) => parts,
        Err(e) => {
            error!("[jamrank] {}", e);
            std::process::exit(2);
        }
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[jamrank] Ctrl-C received, shutting down");
            stop.stop();
        }
    });

    if let Err(e) = bridge.run().await {
        error!("[jamrank] Bridge stopped: {}", e);
        std::process::exit(1);
    }
}

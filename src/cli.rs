use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};
use tokio::net::TcpListener;
use tracing::info;

use crate::{api::router, config::ExchangeConfig, state::AppState, utils::shutdown_token};

/// Spot exchange matching core with an in-memory ledger
#[derive(Parser)]
#[command(name = "spot-exchange")]
#[command(version, about = "A limit order book that settles fills against account ledgers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,

        /// JSON config file (defaults are used when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of the transaction journal
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Print the configured trading pairs
    Pairs {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ExchangeConfig> {
    match path {
        Some(path) => ExchangeConfig::load(path),
        None => Ok(ExchangeConfig::default()),
    }
}

async fn serve(addr: SocketAddr, config: ExchangeConfig, data_dir: PathBuf) -> anyhow::Result<()> {
    let state = AppState::with_config(&config, &data_dir).await?;
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, data_dir = %data_dir.display(), "listening");

    let token = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    info!("server stopped");
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            addr,
            config,
            data_dir,
        } => serve(addr, load_config(config)?, data_dir).await,
        Commands::Pairs { config } => {
            let markets = load_config(config)?.markets()?;
            for pair in markets.supported() {
                println!("{pair}");
            }
            Ok(())
        }
    }
}

use spot_exchange_engine::cli::run_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    run_cli().await
}

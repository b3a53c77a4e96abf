use tracing_subscriber::EnvFilter;

// Entry point for `cargo run -p web-server`. The workspace binary offers the
// same server behind `clubhouse serve` along with the maintenance commands.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = configuration::load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .init();

    web_server::run_server(settings).await
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = hlsgrabctl::Cli::parse();
    if let Err(err) = hlsgrabctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

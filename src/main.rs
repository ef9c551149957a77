use std::sync::Arc;

use clap::Parser;
use tracing::Level;

use eunoia::{api, AppContext, Config};

#[derive(Parser)]
#[command(name = "eunoia", version, about = "Bilingual menstrual-health chatbot backend")]
struct Cli {
    /// Override the bind address (default 0.0.0.0:5000)
    #[arg(long)]
    bind: Option<String>,
    /// Override the data directory holding the CSV corpus and index artifacts
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    if let Some(dir) = cli.data_dir {
        std::env::set_var("EUNOIA_DATA_DIR", dir);
    }
    let mut config = Config::from_env();
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    tracing::info!("Eunoia backend {} starting", eunoia::VERSION);
    let context = AppContext::initialize(config).await?;
    tracing::info!("Models, corpus and index ready");

    api::run(Arc::new(context)).await
}

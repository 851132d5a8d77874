//! studyglade: questions, tutoring and the document library from a terminal
//!
//! Talks to the StudyGlade API when it can and keeps working from the local
//! data directory when it cannot.

use clap::Parser;
use tracing::info;

use studyglade_cli::{logging, App, Cli, StudyGladeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("warn,studyglade_cli=info,studyglade_sync=info,studyglade_client=info")?;

    let cli = Cli::parse();

    let mut config = StudyGladeConfig::load(&cli.config)?;
    config.apply(cli.overrides());

    info!(
        api = %config.api.base_url,
        api_enabled = config.api.enabled,
        data_dir = %config.storage.data_dir.display(),
        "Starting studyglade"
    );

    let app = App::new(config, cli.json).await?;
    match app.run(cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

use anyhow::Result;
use clap::Parser;
use courier_daemon::{config::DaemonConfig, daemon::Daemon};

use crate::print::EventPrinter;

/// Run a courier relay over a sqlite database
#[derive(Parser)]
#[command(version)]
struct CourierCli {
    /// Sqlite database url (created if missing)
    #[arg(long)]
    db: String,

    /// Listening port override
    #[arg(long)]
    port: Option<u16>,
}

pub async fn do_cli() -> Result<()> {
    let cli = CourierCli::parse();

    let config = DaemonConfig {
        custom_port: cli.port,
    };

    let daemon = Daemon::new(&cli.db, config, EventPrinter).await?;
    daemon.start_listener().await?;

    tokio::signal::ctrl_c()
        .await
        .expect("should be able to wait on ctrl+c");

    Ok(())
}

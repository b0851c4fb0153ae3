//! combatd - turn-based combat service daemon

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use combatd::{Config, LogFormat, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Turn-based combat service
#[derive(Parser, Debug)]
#[command(name = "combatd", version, about = "Turn-based D&D combat service")]
struct Args {
    /// TOML config file (default: combatd.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// SQLite database file, overriding the config
    #[arg(short, long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(database) = args.database {
        config.db_path = Some(database);
    }

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "combatd=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    let server = Server::new(config).await?;

    let run = server.run();
    tokio::pin!(run);
    tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            server.shutdown();
            run.await?;
        }
    }

    Ok(())
}

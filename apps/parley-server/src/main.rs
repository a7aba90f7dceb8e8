use anyhow::{bail, Context, Result};
use clap::Parser;
use parley_core::{EngineConfig, TokenAuthenticator};
use parley_server::{build_gateway, serve, ServerConfig};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "PARLEY_LISTEN", default_value = "127.0.0.1:7878")]
    listen: String,

    /// SQLite database file
    #[arg(short, long, env = "PARLEY_DB", default_value = "parley.db")]
    db: PathBuf,

    /// Secret used to verify HS256 bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Longest accepted message, in characters
    #[arg(long, default_value_t = EngineConfig::default().max_content_len)]
    max_content_len: usize,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if args.jwt_secret.len() < TokenAuthenticator::MIN_SECRET_LEN {
        bail!(
            "JWT secret must be at least {} bytes",
            TokenAuthenticator::MIN_SECRET_LEN
        );
    }

    let config = ServerConfig {
        db_path: args.db,
        jwt_secret: args.jwt_secret,
        engine: EngineConfig {
            max_content_len: args.max_content_len,
        },
    };
    let gateway = build_gateway(&config).await?;

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;

    let server = tokio::spawn(serve(listener, gateway));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutting down");
    server.abort();

    Ok(())
}

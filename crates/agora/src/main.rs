//! Agora: real-time discussion board server
//!
//! Main binary with subcommands:
//! - `serve`: HTTP/JSON API with Server-Sent Events for live updates

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora_board::{Board, BoardConfig, CascadePolicy};
use agora_web::{DEFAULT_BODY_LIMIT, WebConfig, create_router};

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Real-time discussion board", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long, env = "AGORA_LISTEN", default_value = "0.0.0.0:4000")]
        listen: SocketAddr,

        /// SQLite database file. Data is kept in memory when omitted.
        #[arg(long, env = "AGORA_DB")]
        db: Option<PathBuf>,

        /// How far deletes reach into dependent comments
        #[arg(long, env = "AGORA_CASCADE", value_enum, default_value_t = Cascade::DirectReplies)]
        cascade: Cascade,

        /// Resolve identity from X-Forwarded-For / X-Real-IP before the peer address.
        /// Only enable behind a proxy that sets these headers.
        #[arg(long, env = "AGORA_TRUST_PROXY", value_parser = parse_bool_env, default_value = "false")]
        trust_proxy: bool,

        /// Filter event streams by their postId / commentId query parameters
        #[arg(long, env = "AGORA_SCOPED_SUBSCRIPTIONS", value_parser = parse_bool_env, default_value = "false")]
        scoped_subscriptions: bool,

        /// Maximum request body size in bytes
        #[arg(long, env = "AGORA_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
        body_limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Cascade {
    /// Comment deletes remove direct replies; post deletes keep comments
    DirectReplies,
    /// Deletes remove every dependent comment
    Subtree,
}

impl From<Cascade> for CascadePolicy {
    fn from(cascade: Cascade) -> Self {
        match cascade {
            Cascade::DirectReplies => CascadePolicy::DirectReplies,
            Cascade::Subtree => CascadePolicy::Subtree,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "agora=info,agora_board=info,agora_web=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            db,
            cascade,
            trust_proxy,
            scoped_subscriptions,
            body_limit,
        } => {
            let board_config = BoardConfig::default().with_cascade(cascade.into());
            let web_config = WebConfig {
                trust_proxy,
                scoped_subscriptions,
                body_limit,
            };
            serve(listen, db, board_config, web_config).await
        }
    }
}

async fn serve(
    listen: SocketAddr,
    db: Option<PathBuf>,
    board_config: BoardConfig,
    web_config: WebConfig,
) -> Result<()> {
    let board = match db {
        Some(path) => {
            info!(path = %path.display(), "opening SQLite store");
            Board::open(&path, board_config)
                .map_err(|e| miette::miette!("failed to open database {}: {}", path.display(), e))?
        }
        None => {
            info!("using in-memory store");
            Board::in_memory(board_config)
        }
    };

    let router = create_router(board, web_config);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| miette::miette!("failed to bind {}: {}", listen, e))?;

    info!("listening on http://{}", listen);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| miette::miette!("{}", e))?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

//! blockchess-relay entry point.
//!
//! This file is intentionally thin: it parses the CLI, sets up tracing and
//! config, wires the dispatcher and HTTP server together, and handles
//! shutdown. Everything interesting lives in the library crates.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{bail, Context, Result};
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use bcr_chain::{ChainContext, ChainGateway, JsonRpcChain, SponsorKeypair, SuiGateway};
use bcr_config::AppConfig;
use bcr_dispatch::Dispatcher;
use bcr_events::{EventSink, RoomHub};
use bcr_server::{routes, state};

#[derive(Parser)]
#[command(name = "blockchess-relay")]
#[command(about = "Durable per-player Sui transaction relay for blockchess", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server (the default when no subcommand is given)
    Serve,

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Queue maintenance
    Queue {
        #[command(subcommand)]
        cmd: QueueCmd,
    },

    /// Out-of-band repair: rotate the badge registry's authorized minter
    SetAuthorizedMinter {
        /// Address to authorize (usually the sponsor address)
        #[arg(long)]
        new_minter: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum QueueCmd {
    /// Return rows stranded in `processing` by a crashed dispatcher to
    /// `pending`.
    ResetStuck {
        /// Only rows whose last update is older than this many seconds.
        #[arg(long, default_value_t = 600)]
        older_than_secs: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,

        Commands::Db { cmd } => {
            let cfg = AppConfig::from_env()?;
            let pool = bcr_db::connect(&cfg.effective_database_url()).await?;
            match cmd {
                DbCmd::Status => {
                    let s = bcr_db::status(&pool).await?;
                    println!("db_ok={} has_queue_table={}", s.ok, s.has_queue_table);
                }
                DbCmd::Migrate => {
                    bcr_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
            Ok(())
        }

        Commands::Queue { cmd } => {
            let cfg = AppConfig::from_env()?;
            let pool = bcr_db::connect(&cfg.effective_database_url()).await?;
            match cmd {
                QueueCmd::ResetStuck { older_than_secs } => {
                    let n = bcr_db::reset_stuck_processing(&pool, older_than_secs).await?;
                    println!("rows_reset={n}");
                }
            }
            Ok(())
        }

        Commands::SetAuthorizedMinter { new_minter } => {
            let cfg = AppConfig::from_env()?;
            let gateway = build_gateway(&cfg)?;
            let digest = gateway.submit_set_authorized_minter(&new_minter).await?;
            println!("digest={digest}");
            Ok(())
        }
    }
}

async fn serve() -> Result<()> {
    let cfg = AppConfig::from_env()?;

    let pool = bcr_db::connect(&cfg.effective_database_url()).await?;
    bcr_db::migrate(&pool).await?;

    let gateway = Arc::new(build_gateway(&cfg)?);
    info!(
        network = %cfg.sui.network,
        sponsor = %gateway.sponsor_address(),
        "chain gateway ready"
    );

    let hub = Arc::new(RoomHub::default());
    let sink: Arc<dyn EventSink> = hub.clone();
    let chain: Arc<dyn ChainGateway> = gateway.clone();

    let dispatcher = Dispatcher::new(pool.clone(), chain, sink, cfg.queue.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_task = tokio::spawn(Arc::clone(&dispatcher).run(shutdown_rx));

    let shared = Arc::new(state::AppState::new(pool.clone(), hub));
    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&cfg)?);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("invalid BCR_HOST/BCR_PORT")?;
    info!("blockchess-relay listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // Stop scheduling new workers, let in-flight attempts finish, then close
    // the pool.
    let _ = shutdown_tx.send(true);
    dispatcher_task.await.context("dispatcher task panicked")?;
    pool.close().await;

    Ok(())
}

fn build_gateway(cfg: &AppConfig) -> Result<SuiGateway<JsonRpcChain>> {
    let sponsor = SponsorKeypair::from_encoded(&cfg.sui.sponsor_secret)?;

    // BCR_SPONSOR_ADDRESS is validation only: refuse to boot with a secret
    // that derives a different account than the operator expects.
    if let Some(expected) = &cfg.sui.sponsor_address {
        if !expected.eq_ignore_ascii_case(sponsor.address()) {
            bail!(
                "sponsor secret derives {} but BCR_SPONSOR_ADDRESS is {expected}",
                sponsor.address()
            );
        }
    }

    Ok(SuiGateway::new(
        JsonRpcChain::new(&cfg.sui.rpc_url),
        sponsor,
        ChainContext {
            package_id: cfg.sui.package_id.clone(),
            registry_id: cfg.sui.registry_id.clone(),
            gas_budget: cfg.sui.gas_budget,
        },
    ))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer> {
    let origin: HeaderValue = cfg
        .server
        .cors_origin
        .parse()
        .context("invalid BCR_CORS_ORIGIN")?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

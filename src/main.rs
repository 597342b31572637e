//! Agora - federated discussion-board backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    config::Args,
    db::MongoClient,
    federation::{FederationEngine, InterceptedStore, MemoryObjectStore, MongoObjectStore, ObjectStore, SaveInterceptor},
    server::{self, AppState},
    stats::{self, MemoryNoteStats, MemoryThreadStats, NoteStatsRepo, PgNoteStats, PgThreadStats, ThreadStatsRepo},
    threads::{LineageEnricher, ThreadService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("agora={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Agora - discussion-board backend");
    info!("======================================");
    info!("Domain: {}", args.domain);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Postgres: {}", args.postgres_url);
    info!("Missing-parent policy: {:?}", args.missing_parent_policy());
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!(
                    "MongoDB connection failed (dev mode, continuing in-memory): {}",
                    e
                );
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let mongo_connected = mongo.is_some();
    let inner_store: Arc<dyn ObjectStore> = match mongo {
        Some(ref client) => Arc::new(MongoObjectStore::new(client).await?),
        None => Arc::new(MemoryObjectStore::new()),
    };

    // Connect to Postgres (optional in dev mode)
    let pool = match sqlx::PgPool::connect(&args.postgres_url).await {
        Ok(pool) => {
            stats::pg::migrate(&pool).await?;
            info!("Postgres connected successfully");
            Some(pool)
        }
        Err(e) => {
            if args.dev_mode {
                warn!(
                    "Postgres connection failed (dev mode, continuing in-memory): {}",
                    e
                );
                None
            } else {
                error!("Postgres connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let postgres_connected = pool.is_some();
    let (thread_stats, note_stats): (Arc<dyn ThreadStatsRepo>, Arc<dyn NoteStatsRepo>) = match pool
    {
        Some(pool) => (
            Arc::new(PgThreadStats::new(pool.clone())),
            Arc::new(PgNoteStats::new(pool)),
        ),
        None => (
            Arc::new(MemoryThreadStats::new()),
            Arc::new(MemoryNoteStats::new()),
        ),
    };

    // Lineage enrichment runs on every object write
    let enricher: Arc<dyn SaveInterceptor> =
        Arc::new(LineageEnricher::new(args.missing_parent_policy()));
    let store: Arc<dyn ObjectStore> = Arc::new(InterceptedStore::new(inner_store, vec![enricher]));

    let engine = Arc::new(FederationEngine::new(store.clone(), args.base_url()));
    let threads = Arc::new(ThreadService::new(
        engine.clone(),
        store,
        thread_stats,
        note_stats,
    ));

    if args.admin_secret.is_none() {
        warn!("ADMIN_SECRET not set - moderation endpoints disabled");
    }

    let state = Arc::new(AppState {
        args,
        engine,
        threads,
        mongo_connected,
        postgres_connected,
    });

    server::run(state).await?;

    Ok(())
}

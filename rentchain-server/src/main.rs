//! Rentchain Reservation Server
//!
//! Date locks, booking orchestration and on-chain payment verification for
//! short-term rentals paid through an escrow contract.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use rentchain_core::calendar::LockManager;
use rentchain_core::events::{
    BOOKING_CANCELLED_QUEUE, EventBus, PAYMENT_STATUS_QUEUE, TRANSACTION_VERIFICATION_QUEUE,
};
use rentchain_core::framework::DatabaseProcessor;
use rentchain_core::processors::{
    BookingSweeper, CancellationListener, EscrowWatcher, LockSweeper, PaymentStatusListener,
    VerificationWorker,
};
use rentchain_core::reservation::gateway::{
    HttpPropertyGateway, LocalPropertyGateway, PropertyGateway,
};
use rentchain_core::reservation::orchestrator::ReservationOrchestrator;
use rentchain_core::verification::{JsonRpcLedger, LedgerClient, PaymentVerifier};
use rentchain_sdk::client::{PropertyClient, UserClient};
use rentchain_sdk::objects::RoutingKey;
use server::{build_router, run_server};
use shutdown::ProcessorSet;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Rentchain - reservation saga for escrow-paid rentals
#[derive(Parser, Debug)]
#[command(name = "rentchain-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./rentchain.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting rentchain-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let database = Arc::new(DatabaseProcessor::new(db_pool.clone()));
    let saga = loaded_config.saga;
    let ledger_config = loaded_config.ledger;

    let locks = LockManager::new(database.clone(), database.clone(), saga.lock_window);
    let local_calendar = loaded_config.services.local_calendar();
    let properties: Arc<dyn PropertyGateway> = match loaded_config.services.property_url {
        Some(url) => {
            tracing::info!(%url, "Using remote property service");
            Arc::new(HttpPropertyGateway::new(PropertyClient::new(url)))
        }
        None => Arc::new(LocalPropertyGateway::new(locks.clone())),
    };
    let tenants = Arc::new(UserClient::new(loaded_config.services.user_url));

    // Every queue must be declared before the bus is shared.
    let mut bus =
        EventBus::new(saga.max_redeliveries).with_redelivery_backoff(saga.redelivery_backoff);
    let verification_queue = bus.declare_queue(
        TRANSACTION_VERIFICATION_QUEUE,
        &[RoutingKey::TransactionVerification],
    );
    // a verified payment is retried until it lands
    let status_queue = bus
        .declare_queue(
            PAYMENT_STATUS_QUEUE,
            &[
                RoutingKey::PaymentSuccess,
                RoutingKey::PaymentFailed,
                RoutingKey::PaymentCompleted,
            ],
        )
        .without_dead_letter();
    let cancelled_queue = local_calendar
        .then(|| bus.declare_queue(BOOKING_CANCELLED_QUEUE, &[RoutingKey::BookingCancelled]));
    let bus = Arc::new(bus);

    let orchestrator = ReservationOrchestrator::new(
        database,
        properties,
        tenants,
        bus.clone(),
        saga.pending_timeout,
    )
    .with_reverify_after(saga.reverify_after);

    let ledger: Arc<dyn LedgerClient> =
        Arc::new(JsonRpcLedger::new(ledger_config.rpc_url).map_err(|e| {
            tracing::error!("Failed to build the JSON-RPC client: {}", e);
            e
        })?);
    let verifier = PaymentVerifier::new(ledger.clone(), ledger_config.escrow_address);

    let mut processors = ProcessorSet::new();
    let worker = VerificationWorker::new(verifier, bus.clone());
    processors.spawn("verification_worker", move |rx| {
        worker.run(rx, verification_queue)
    });
    let listener = PaymentStatusListener::new(orchestrator.clone());
    processors.spawn("payment_status_listener", move |rx| {
        listener.run(rx, status_queue)
    });
    // the calendar lives in the property service when it is remote
    if let Some(cancelled_queue) = cancelled_queue {
        let cancellations = CancellationListener::new(locks.clone());
        processors.spawn("cancellation_listener", move |rx| {
            cancellations.run(rx, cancelled_queue)
        });
        let lock_sweeper = LockSweeper::new(locks.clone(), saga.lock_sweep_interval);
        processors.spawn("lock_sweeper", move |rx| lock_sweeper.run(rx));
    }
    let booking_sweeper = BookingSweeper::new(
        orchestrator.clone(),
        saga.pending_sweep_interval,
        saga.lifecycle_sweep_interval,
    );
    processors.spawn("booking_sweeper", move |rx| booking_sweeper.run(rx));
    if ledger_config.watch_enabled {
        let watcher = EscrowWatcher::new(
            ledger,
            bus.clone(),
            ledger_config.escrow_address,
            ledger_config.watch_interval,
        );
        processors.spawn("escrow_watcher", move |rx| watcher.run(rx));
    } else {
        tracing::warn!("Escrow watcher disabled; completions rely on the lifecycle sweep");
    }

    let state = AppState::new(locks, orchestrator);
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    processors.shutdown().await;

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use factoryos_dispatcher::config::DispatcherConfig;
use factoryos_dispatcher::recovery::recover_stranded_jobs;
use factoryos_dispatcher::{DispatcherService, PgDispatchStore, ProductionDispatcher};
use factoryos_printer::PrinterCommander;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "factoryos_dispatcher=debug,factoryos_printer=debug,factoryos_db=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = DispatcherConfig::from_env().expect("Invalid dispatcher configuration");
    tracing::info!(
        interval_secs = config.dispatch_interval.as_secs(),
        shutdown_timeout_secs = config.shutdown_timeout.as_secs(),
        recover_stranded_jobs = config.recover_stranded_jobs,
        "Loaded dispatcher configuration",
    );

    // --- Database ---
    let pool = factoryos_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    factoryos_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    factoryos_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgDispatchStore::new(pool.clone()));

    // --- Recovery ---
    if config.recover_stranded_jobs {
        match recover_stranded_jobs(store.as_ref()).await {
            Ok(0) => tracing::info!("No stranded jobs found"),
            Ok(count) => tracing::warn!(count, "Failed jobs stranded by previous shutdown"),
            Err(e) => tracing::error!(error = %e, "Stranded job recovery failed"),
        }
    }

    // --- Printer client ---
    let commander =
        PrinterCommander::new().expect("Failed to build printer TLS configuration");

    // --- Dispatcher ---
    let dispatcher = ProductionDispatcher::new(store, Arc::new(commander))
        .with_interval(config.dispatch_interval);
    let service = DispatcherService::start(dispatcher, config.shutdown_timeout);

    shutdown_signal().await;

    // --- Shutdown ---
    if !service.stop().await {
        tracing::warn!("Dispatcher did not shut down cleanly");
    }
    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

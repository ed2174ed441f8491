use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use loadplan_core::job_registry::{InMemoryJobRegistry, JobRegistry};
use loadplan_core::reconcile::ResultReconciler;
use loadplan_db::job_registry::PgJobRegistry;
use loadplan_db::persister::ResultPersister;
use loadplan_db::repositories::CalculationRequestRepo;
use loadplan_solver::SolverApi;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loadplan_api::background::job_sweeper;
use loadplan_api::config::{JobRegistryKind, ServerConfig};
use loadplan_api::router::build_app_router;
use loadplan_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "loadplan_api=debug,loadplan_db=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        solver_url = %config.solver_url,
        job_registry = ?config.job_registry,
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = loadplan_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    loadplan_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    loadplan_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    if let Err(e) = CalculationRequestRepo::backfill_calculation_links(&pool).await {
        tracing::error!(error = %e, "Request link backfill failed");
    }

    // --- Job registry ---
    let jobs: Arc<dyn JobRegistry> = match config.job_registry {
        JobRegistryKind::Postgres => Arc::new(PgJobRegistry::new(pool.clone(), config.job_ttl())),
        JobRegistryKind::Memory => Arc::new(InMemoryJobRegistry::new(config.job_ttl())),
    };

    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle = tokio::spawn(job_sweeper::run(
        Arc::clone(&jobs),
        job_sweeper::SWEEP_INTERVAL,
        sweeper_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        solver: SolverApi::new(&config.solver_url),
        jobs,
        persister: ResultPersister::new(ResultReconciler::new(config.numeric_fallback)),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Job registry sweeper stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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

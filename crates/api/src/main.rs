//! API server entry point.

use api::config::{Config, LogFormat, StoreBackend};
use metrics_exporter_prometheus::PrometheusHandle;
use replica_store::{InMemoryReplica, PgDocumentReplica, PostgresReplica, ReplicaStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect(url: &str, max_connections: u32) -> sqlx::PgPool {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .expect("failed to connect to database")
}

/// Builds the app over the given replicas and serves it until shutdown.
async fn serve<R, D>(config: &Config, relational: R, document: D, metrics_handle: PrometheusHandle)
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let state = api::create_default_state(relational, document);
    let replication = state
        .engine
        .clone()
        .spawn_replication(config.replication_interval);

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, backend = ?config.store_backend, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    replication.abort();
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Open the replicas and serve
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory replicas, data is lost on shutdown");
            serve(
                &config,
                InMemoryReplica::relational(),
                InMemoryReplica::document(),
                metrics_handle,
            )
            .await;
        }
        StoreBackend::Postgres => {
            let (Some(relational_url), Some(document_url)) = (
                config.relational_database_url.as_deref(),
                config.document_database_url.as_deref(),
            ) else {
                unreachable!("postgres backend is validated to carry both URLs");
            };

            let relational =
                PostgresReplica::new(connect(relational_url, config.db_max_connections).await);
            let document =
                PgDocumentReplica::new(connect(document_url, config.db_max_connections).await);

            relational
                .run_migrations()
                .await
                .expect("relational migrations failed");
            document
                .run_migrations()
                .await
                .expect("document migrations failed");

            serve(&config, relational, document, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}

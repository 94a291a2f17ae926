//! API server entry point.

use std::sync::Arc;

use api::config::{CartBackend, Config};
use api::{AppState, Backend};
use metrics_exporter_prometheus::PrometheusHandle;
use services::{CartService, Notifier, TracingNotifier, spawn_cart_sweeper};
use sqlx::postgres::PgPoolOptions;
use store::{CartStore, ExpiringCartStore, InMemoryStore, PostgresStore};
use tokio::signal;
use tower_sessions::{MemoryStore, SessionStore};
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
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Picks the cart backing; `durable` shares the primary store.
fn cart_store<S: CartStore + Clone + 'static>(config: &Config, primary: &S) -> Arc<dyn CartStore> {
    match config.cart_backend {
        CartBackend::Durable => Arc::new(primary.clone()),
        CartBackend::Expiring => Arc::new(ExpiringCartStore::new(config.cart_idle_ttl())),
    }
}

async fn serve<S, St>(
    config: &Config,
    store: S,
    carts: Arc<dyn CartStore>,
    session_store: St,
    metrics_handle: PrometheusHandle,
) where
    S: Backend,
    St: SessionStore + Clone,
{
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);

    // Idle carts of the expiring backing vanish by themselves.
    let sweeper = match (config.cart_backend, config.cart_sweep_interval()) {
        (CartBackend::Durable, Some(interval)) => Some(spawn_cart_sweeper(
            Arc::new(CartService::new(Arc::clone(&carts), store.clone())),
            config.cart_retention_days,
            interval,
        )),
        _ => None,
    };

    let state = Arc::new(AppState::new(store, carts, notifier));
    let sessions = api::session::session_layer(session_store, config.session_ttl_days, false);
    let app = api::create_app(state, metrics_handle, sessions);

    let addr = config.addr();
    tracing::info!(%addr, backend = ?config.cart_backend, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(handle) = sweeper {
        handle.abort();
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the data-access handle and serve until shutdown
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to database");

            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");

            let session_store = tower_sessions_sqlx_store::PostgresStore::new(pool.clone());
            session_store
                .migrate()
                .await
                .expect("failed to migrate session store");

            let carts = cart_store(&config, &store);
            serve(&config, store, carts, session_store, metrics_handle).await;

            pool.close().await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let store = InMemoryStore::new();
            let carts = cart_store(&config, &store);
            serve(&config, store, carts, MemoryStore::default(), metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}

//! API server entry point.

use std::error::Error;

use api::config::Config;
use checkout::Collaborators;
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

async fn serve<S: EventStore + Clone + 'static>(
    listener: TcpListener,
    store: S,
    collaborators: Collaborators,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    let (state, dispatcher) = api::create_state(store, collaborators, config);
    let dispatcher = dispatcher.spawn();

    // Replay existing history into the read models.
    let replayed = state.projection_processor.run_catch_up().await?;
    tracing::info!(events = replayed, "projections caught up");

    let app = api::create_app(state, metrics_handle);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last notifier; the dispatcher drains and exits.
    if let Err(e) = dispatcher.await {
        tracing::warn!(error = %e, "notification dispatcher ended abnormally");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    api::telemetry::init_tracing(&config);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "starting API server");

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.persistence_timeout)
                .connect(url)
                .await?;
            let store = PostgresEventStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using Postgres stores");
            serve(
                listener,
                store,
                Collaborators::postgres(pool),
                &config,
                metrics_handle,
            )
            .await?;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            serve(
                listener,
                InMemoryEventStore::new(),
                Collaborators::in_memory(),
                &config,
                metrics_handle,
            )
            .await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

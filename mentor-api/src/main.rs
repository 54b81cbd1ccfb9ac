use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use tracing_subscriber::EnvFilter;

use mentor_common::capacity::CapacityStore;
use mentor_common::metrics::setup_metrics_recorder;
use mentor_common::retry::RetryPolicy;

use config::Config;

mod config;
mod handlers;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let store = CapacityStore::new(&config.database_url, config.max_pg_connections)
        .await
        .expect("failed to connect to the database");

    if config.run_migrations {
        sqlx::migrate!("../migrations")
            .run(store.pool())
            .await
            .expect("failed to run migrations");
    }

    let retry_policy = RetryPolicy::new(
        config.assign_retry.max_attempts,
        config.assign_retry.backoff_coefficient,
        config.assign_retry.initial_interval.0,
        Some(config.assign_retry.maximum_interval.0),
    );

    let state = handlers::AppState::new(
        store.pool().clone(),
        retry_policy,
        config.default_max_students,
    );

    let recorder_handle = setup_metrics_recorder().expect("failed to install metrics recorder");
    let app = handlers::app(state, Some(recorder_handle));

    match listen(app, config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start mentor-api http server, {}", e),
    }
}

//! Standalone delayq worker.
//!
//! Polls the configured queue and logs due jobs until interrupted.
//! Configuration comes from `DELAYQ_*` environment variables; with the
//! `redis` feature, `DELAYQ_REDIS_URL` selects a Redis store, otherwise an
//! in-memory store is used.

mod handlers;

use anyhow::Context;

use delayq_infra::store::{InMemoryOrderedStore, OrderedStore};
use delayq_infra::tasks::{TaskController, TaskControllerConfig};

use handlers::{LogExpiredHandler, LogJobHandler};

const ENV_REDIS_URL: &str = "DELAYQ_REDIS_URL";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    delayq_observability::init();

    let config = TaskControllerConfig::from_env().context("invalid worker configuration")?;

    match std::env::var(ENV_REDIS_URL).ok() {
        Some(url) => serve_redis(&url, config).await,
        None => {
            tracing::warn!("{ENV_REDIS_URL} not set; using in-memory store");
            serve(InMemoryOrderedStore::new(), config).await
        }
    }
}

#[cfg(feature = "redis")]
async fn serve_redis(url: &str, config: TaskControllerConfig) -> anyhow::Result<()> {
    let store = delayq_infra::store::RedisOrderedStore::new(url)
        .with_context(|| format!("invalid {ENV_REDIS_URL}"))?;
    store
        .ping(config.poll_interval)
        .context("redis did not answer PING")?;
    serve(store, config).await
}

#[cfg(not(feature = "redis"))]
async fn serve_redis(_url: &str, _config: TaskControllerConfig) -> anyhow::Result<()> {
    anyhow::bail!("{ENV_REDIS_URL} is set but delayq-worker was built without the `redis` feature")
}

async fn serve<S: OrderedStore + 'static>(
    store: S,
    config: TaskControllerConfig,
) -> anyhow::Result<()> {
    let block = config.block;
    let controller = TaskController::builder(store, config)
        .job_handler(LogJobHandler)
        .expired_job_handler(LogExpiredHandler)
        .build()
        .context("failed to build task controller")?;

    // Blocking mode owns a thread until shutdown; background mode returns at once.
    let runner = if block {
        let controller = controller.clone();
        Some(tokio::task::spawn_blocking(move || controller.run()))
    } else {
        controller.run().context("failed to start poll loop")?;
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");

    {
        let controller = controller.clone();
        tokio::task::spawn_blocking(move || controller.shutdown()).await?;
    }
    if let Some(runner) = runner {
        runner.await?.context("poll loop failed")?;
    }

    let stats = serde_json::to_string(&controller.stats())?;
    tracing::info!(%stats, "worker stopped");
    Ok(())
}

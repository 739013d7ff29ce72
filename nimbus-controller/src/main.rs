use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod error;
pub mod oplog;
pub mod provider;
pub mod provisioning;
pub mod registry;
pub mod service;
pub mod snapshot;
pub mod tasks;

#[cfg(test)]
mod testing;

use config::{Config, SnapshotBackend};
use provider::ec2::Ec2Provider;
use provisioning::ssh::SshAgent;
use service::ControlPlane;
use snapshot::{FileSnapshotStore, MemorySnapshotStore, PgSnapshotStore, SnapshotStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nimbus_controller=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Nimbus Controller...");

    let config = Config::from_env()?;
    config.validate()?;

    let store: Arc<dyn SnapshotStore> = match &config.snapshot {
        SnapshotBackend::File(path) => {
            tracing::info!("Keeping snapshots in {}", path.display());
            Arc::new(FileSnapshotStore::new(path))
        }
        SnapshotBackend::Postgres(url) => {
            tracing::info!("Connecting to snapshot database...");
            Arc::new(PgSnapshotStore::connect(url).await?)
        }
        SnapshotBackend::Memory => {
            tracing::warn!("Snapshots are kept in memory only, nothing survives a restart");
            Arc::new(MemorySnapshotStore::new())
        }
    };

    let provider = Arc::new(Ec2Provider::new(config.aws_region.clone()).await);
    let agent = Arc::new(SshAgent::new(config.ssh_settings()));

    let plane = Arc::new(ControlPlane::new(
        provider,
        agent,
        store,
        config.lifecycle_settings(),
        config.scheduler_settings(),
        config.max_parallel_operations,
    ));

    let restored = plane.restore().await?;
    tracing::info!("Restored {} tracked instance(s)", restored);

    // Scheduler runs for the lifetime of the process
    tokio::spawn(plane.scheduler().run());
    tracing::info!("Scheduler started (timezone {})", config.timezone);

    // Build router with all API endpoints
    let app = api::create_router(plane);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Tour of the connection lifecycle layer: register a connector, check a
//! pooled connection out, cache it under a session key, look it up, tear it
//! down, and probe a source.
//!
//! Run with: cargo run -p datalink-conn --example session_lifecycle

use std::sync::Arc;
use std::time::Duration;

use datalink_conn::{ConnectionManager, SessionConnectionCache};
use datalink_sources::{MemoryConnector, SourceDescriptor, SourceType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,datalink_conn=debug".into()),
        )
        .init();

    let manager = ConnectionManager::new();
    manager.register_connector(Arc::new(MemoryConnector::new(SourceType::Memory)))?;

    let descriptor: SourceDescriptor = serde_json::from_value(serde_json::json!({
        "source_type": "Memory",
        "endpoint": "mem://analytics-replica",
        "principal": "report_ro",
        "credential": "s3cret",
        "pool": {
            "connection_timeout_ms": 5000,
            "idle_timeout_secs": 300,
            "max_lifetime_secs": 1800,
            "maximum_pool_size": 4,
            "minimum_idle": 1,
            "read_only": true
        }
    }))?;

    println!("probe: {}", manager.test_connection(&descriptor).await?);

    // a UI session: check out once, reuse across several steps
    let handle = manager.get_or_create_connection(&descriptor).await?;
    println!("pooled: {}", handle.is_pooled());

    let session_key = SessionConnectionCache::allocate_session_key();
    manager.add_key(&session_key, handle, Duration::from_secs(60));

    let cached = manager
        .get_connection(&session_key)
        .expect("session was just cached");
    println!("cached connection to {} is live: {}", cached.endpoint(), cached.probe().await);

    manager.clear_key(&session_key).await?;
    println!("session cleared; pool stats: {:?}", manager.pools().stats());

    let closed = manager.shutdown().await;
    println!("shut down, {closed} sessions closed");
    Ok(())
}

//! Smart Cache demo driver
//!
//! Runs a memoization workload against a configured cache and prints the
//! resulting metrics as JSON.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_cache::{
    spawn_sweeper, CacheConfig, CacheStore, EntryOptions, KeyPattern, SharedCache,
    TracingObserver,
};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache with a tracing observer
/// 4. Start background TTL sweep task
/// 5. Run the workload until done or Ctrl+C
/// 6. Stop the sweeper and print metrics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_size_bytes={}, default_ttl={}s, cleanup_interval={}s, metrics={}, policy={:?}",
        config.max_size_bytes,
        config.default_ttl_seconds,
        config.cleanup_interval_seconds,
        config.enable_metrics,
        config.capacity_policy
    );

    let store = CacheStore::new(config.clone()).with_observer(Arc::new(TracingObserver));
    let cache = SharedCache::new(store);

    let sweeper = spawn_sweeper(
        cache.clone(),
        Duration::from_secs(config.cleanup_interval_seconds),
    );

    tokio::select! {
        result = run_workload(&cache) => result?,
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C, stopping workload");
        }
    }

    sweeper.abort();

    let metrics = cache.metrics().await;
    info!(hit_rate = metrics.hit_rate, entries = metrics.entries, "Workload finished");
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

/// Memoizes per-document analyses, then invalidates by tag and by pattern.
async fn run_workload(cache: &SharedCache<String>) -> anyhow::Result<()> {
    let documents = ["essay-101", "essay-102", "essay-103"];

    for round in 0..3 {
        for document in documents {
            let key = format!("analysis:{}", document);
            let summary = cache
                .get_or_set_coalesced(
                    &key,
                    || analyze(document),
                    EntryOptions::new().tags(["analysis", document]),
                )
                .await?;
            debug!(%key, round, %summary, "analysis served");
        }
    }

    for lesson in 1..=3 {
        cache
            .set_with(
                format!("report-lesson-{}", lesson),
                format!("lesson {} progress report", lesson),
                EntryOptions::new().tag("reports").ttl(60u64),
            )
            .await?;
    }

    let removed = cache.invalidate_by_tags(&["essay-102"]).await;
    info!(?removed, "Invalidated analyses of a revised document");

    let removed = cache.invalidate_pattern(&KeyPattern::prefix("report-")).await?;
    info!(?removed, "Invalidated stale reports");

    Ok(())
}

/// Stand-in for an expensive analysis call.
async fn analyze(document: &str) -> anyhow::Result<String> {
    tokio::time::sleep(Duration::from_millis(25)).await;
    Ok(format!("{}: analysis complete", document))
}

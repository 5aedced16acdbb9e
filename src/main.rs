//! Keyfield Memo - demo driver
//!
//! Replays the identity-keyed caching scenarios against a live tokio runtime
//! and logs what the cache did.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyfield_memo::{Config, ExpireDecision, MemoizeOptions, StatsRegistry};

/// Entry point of the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Replay the reordered-set and eviction scenario
/// 4. Replay the time-to-live scenario
/// 5. Log the statistics snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyfield_memo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting keyfield memo demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: stats_enabled={}, default_max_size={}, default_ttl_ms={}",
        config.stats_enabled, config.default_max_size, config.default_ttl_ms
    );

    // The demo always reports statistics, whatever the environment says
    let registry = StatsRegistry::from_config(&config);
    registry.collect(true);

    identity_scenario(&registry);
    time_to_live_scenario(&registry).await;

    let overall = registry.overall();
    info!("Statistics:\n{}", serde_json::to_string_pretty(&overall)?);

    Ok(())
}

fn items(ids: &[&str]) -> Value {
    Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
}

/// Reordered sets share an entry, and the least recently touched set is
/// evicted once the bound is exceeded.
fn identity_scenario(registry: &StatsRegistry) {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);

    let total_ids = MemoizeOptions::new()
        .identity_field("id")
        .capacity_bound(2)
        .profile_name("total_ids")
        .stats(registry.clone())
        .build(move |args: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            args.first()
                .and_then(Value::as_array)
                .map_or(0, |items| items.len())
        });

    total_ids.call(&[items(&["a", "b"])]);
    total_ids.call(&[items(&["b", "a"])]);
    info!(
        invocations = invocations.load(Ordering::SeqCst),
        "reordered set answered from cache"
    );

    total_ids.call(&[items(&["a", "b", "c"])]);
    info!(size = total_ids.size(), "second identity set cached");

    total_ids.call(&[items(&["d"])]);
    info!(
        size = total_ids.size(),
        ab_cached = total_ids.has(&[items(&["a", "b"])]),
        abc_cached = total_ids.has(&[items(&["a", "b", "c"])]),
        "third identity set evicted the least recently touched one"
    );
}

/// Entries expire after their time-to-live, and the expiry callback may keep
/// them around for one more period.
async fn time_to_live_scenario(registry: &StatsRegistry) {
    let renewals = Arc::new(AtomicUsize::new(0));
    let budget = Arc::clone(&renewals);

    let lookup = MemoizeOptions::new()
        .capacity_bound(4)
        .time_to_live(Duration::from_millis(50))
        .on_expire(move |key| {
            let rendered = Value::Array(key.clone());
            info!(key = %rendered, "expiry callback");
            if budget.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(ExpireDecision::Renew)
            } else {
                Ok(ExpireDecision::Expire)
            }
        })
        .profile_name("lookup")
        .stats(registry.clone())
        .build(|args: &[Value]| format!("value for {}", Value::Array(args.to_vec())));

    lookup.call(&[json!("session")]);
    for expiration in lookup.expirations() {
        info!(
            remaining_ms = expiration.remaining_ms(),
            "expiration scheduled"
        );
    }

    tokio::time::sleep(Duration::from_millis(75)).await;
    info!(size = lookup.size(), "first expiry renewed the entry");

    tokio::time::sleep(Duration::from_millis(75)).await;
    info!(size = lookup.size(), "second expiry removed the entry");
}

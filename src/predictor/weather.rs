//! Time-bounded weather lookups keyed by city.
//!
//! Contests usually carry their own weather snapshot. When they don't, the
//! prediction service asks this cache, which serves entries younger than the
//! freshness window and otherwise falls through to the configured source.
//! Misses are cached too so a city without reports isn't re-queried for every
//! contest in a batch. Stale reads under concurrent refresh are acceptable.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::db::models::WeatherSnapshot;

pub const DEFAULT_WEATHER_TTL: Duration = Duration::from_secs(60 * 60);

/// Anything that can report current conditions for a city.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current_weather(&self, city: &str) -> Result<Option<WeatherSnapshot>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

struct CachedWeather {
    fetched_at: Instant,
    snapshot: Option<WeatherSnapshot>,
}

#[derive(Clone)]
pub struct WeatherCache {
    source: Arc<dyn WeatherSource>,
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CachedWeather>>>,
}

fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

impl WeatherCache {
    pub fn new(source: Arc<dyn WeatherSource>, ttl: Duration) -> Self {
        WeatherCache {
            source,
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cached snapshot for `city`, refreshing it when older than the TTL.
    /// Source errors are logged and reported as "no weather".
    pub async fn lookup(&self, city: &str) -> Option<WeatherSnapshot> {
        let key = normalize_city(city);
        if key.is_empty() {
            return None;
        }

        {
            let entries = self.entries.read().await;
            if let Some(hit) = entries.get(&key) {
                if hit.fetched_at.elapsed() < self.ttl {
                    debug!("Weather cache hit for {}", key);
                    return hit.snapshot.clone();
                }
            }
        }

        let snapshot = match self.source.current_weather(&key).await {
            Ok(s) => s,
            Err(e) => {
                warn!("Weather source '{}' failed for {}: {}", self.source.name(), key, e);
                return None;
            }
        };

        self.entries.write().await.insert(
            key,
            CachedWeather {
                fetched_at: Instant::now(),
                snapshot: snapshot.clone(),
            },
        );
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

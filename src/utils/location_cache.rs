use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

use crate::model::location::Location;
use crate::repo;

const ACTIVE: &str = "active";

/// Active locations with their shifts. A company has tens of these and every
/// check-in needs all of them, so keep one copy in memory.
static LOCATION_CACHE: Lazy<Cache<&'static str, Arc<Vec<Location>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(1)
        .time_to_live(Duration::from_secs(300)) // 5 min, writes invalidate anyway
        .build()
});

/// Active locations, from cache when warm.
pub async fn active_locations(pool: &MySqlPool) -> Result<Arc<Vec<Location>>, sqlx::Error> {
    if let Some(hit) = LOCATION_CACHE.get(ACTIVE).await {
        return Ok(hit);
    }

    let fresh = Arc::new(repo::location::fetch_all(pool, true).await?);
    LOCATION_CACHE.insert(ACTIVE, fresh.clone()).await;
    tracing::debug!(count = fresh.len(), "Location cache refreshed");
    Ok(fresh)
}

/// Drop the cached list after any location or shift write.
pub async fn invalidate() {
    LOCATION_CACHE.invalidate(ACTIVE).await;
}

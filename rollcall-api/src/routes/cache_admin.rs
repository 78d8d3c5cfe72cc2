//! Cache administration endpoints, nested under `/api/cache`.
//!
//! - `GET /stats` hit/miss counters and live keys
//! - `DELETE /` clear everything
//! - `DELETE /entries?pattern=..&regex=true` invalidate matching keys

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{delete, get},
    Json, Router,
};
use rollcall_storage::{CacheStats, KeyPattern};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::ResponseCache;
use crate::state::Governance;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub success: bool,
    pub stats: CacheStats,
    pub hit_rate: f64,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationResponse {
    pub success: bool,
    pub message: String,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateQuery {
    pub pattern: Option<String>,
    /// Treat `pattern` as a regular expression instead of a substring.
    #[serde(default)]
    pub regex: bool,
}

impl InvalidateQuery {
    fn key_pattern(&self) -> ApiResult<KeyPattern> {
        let pattern = self
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::missing_field("pattern"))?;

        if self.regex {
            Ok(KeyPattern::regex(pattern)?)
        } else {
            Ok(KeyPattern::substring(pattern))
        }
    }
}

/// GET /api/cache/stats
pub async fn cache_stats(State(cache): State<Arc<ResponseCache>>) -> Json<CacheStatsResponse> {
    let stats = cache.stats();
    Json(CacheStatsResponse {
        success: true,
        hit_rate: stats.hit_rate(),
        stats,
        keys: cache.keys(),
    })
}

/// DELETE /api/cache
pub async fn clear_cache(State(cache): State<Arc<ResponseCache>>) -> Json<InvalidationResponse> {
    let removed = cache.len();
    cache.clear();
    Json(InvalidationResponse {
        success: true,
        message: "Cache cleared".to_string(),
        removed,
    })
}

/// DELETE /api/cache/entries
pub async fn invalidate_entries(
    State(cache): State<Arc<ResponseCache>>,
    Query(query): Query<InvalidateQuery>,
) -> ApiResult<Json<InvalidationResponse>> {
    let pattern = query.key_pattern()?;
    let removed = cache.invalidate_matching(&pattern);
    Ok(Json(InvalidationResponse {
        success: true,
        message: format!("Invalidated entries matching {}", pattern),
        removed,
    }))
}

pub fn create_router(governance: Governance) -> Router {
    Router::new()
        .route("/", delete(clear_cache))
        .route("/stats", get(cache_stats))
        .route("/entries", delete(invalidate_entries))
        .with_state(governance)
}

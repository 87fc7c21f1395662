//! Cache-aside decorator around any render backend.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, warn};

use crate::application::backend::{RenderBackend, RenderError};
use crate::domain::{IncomingRequest, RenderRequest, RenderedResponse};

use super::{
    codec,
    keys::build_key,
    store::{CacheStore, StoreError},
};

pub(crate) const METRIC_CACHE_HIT: &str = "ssr_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "ssr_cache_miss_total";
pub(crate) const METRIC_CACHE_CORRUPT: &str = "ssr_cache_corrupt_total";
pub(crate) const METRIC_CACHE_WRITE_ERROR: &str = "ssr_cache_write_error_total";

/// Serves repeated renders of one URL from `store` until the entry expires
/// or an update invalidates it.
pub struct CachingBackend {
    inner: Arc<dyn RenderBackend>,
    store: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
}

impl CachingBackend {
    pub fn new(
        inner: Arc<dyn RenderBackend>,
        store: Arc<dyn CacheStore>,
        prefix: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            store,
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn cache_build_key(&self, url: &str) -> String {
        build_key(&self.prefix, url)
    }

    /// Cached response for `url`, if a readable one exists.
    ///
    /// Store failures and undecodable payloads count as misses.
    pub async fn cache_get(&self, url: &str) -> Option<RenderedResponse> {
        let key = self.cache_build_key(url);
        let payload = match self.store.get(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, cache_key = %key, "cache read failed, treating as miss");
                return None;
            }
        };

        match codec::decode(&payload) {
            Ok(response) => Some(response),
            Err(err) => {
                counter!(METRIC_CACHE_CORRUPT).increment(1);
                warn!(
                    error = %err,
                    cache_key = %key,
                    url,
                    "discarding unreadable cache entry"
                );
                None
            }
        }
    }

    pub async fn cache_set(&self, url: &str, response: &RenderedResponse) -> Result<(), StoreError> {
        let payload = codec::encode(response)
            .map_err(|err| StoreError::Unavailable(format!("failed to encode response: {err}")))?;
        self.store
            .set(&self.cache_build_key(url), payload, self.ttl)
            .await
    }

    pub async fn cache_clear(&self, url: &str) -> Result<(), StoreError> {
        self.store.delete(&self.cache_build_key(url)).await
    }
}

#[async_trait]
impl RenderBackend for CachingBackend {
    fn strip_query_params(&self) -> bool {
        self.inner.strip_query_params()
    }

    fn build_absolute_url(&self, request: &dyn IncomingRequest) -> RenderRequest {
        self.inner.build_absolute_url(request)
    }

    async fn render(&self, url: &str) -> Result<RenderedResponse, RenderError> {
        if let Some(cached) = self.cache_get(url).await {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(cache = "render", outcome = "hit", url, "serving cached snapshot");
            return Ok(cached);
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(cache = "render", outcome = "miss", url, "rendering snapshot");

        let response = self.inner.render(url).await?;
        if let Err(err) = self.cache_set(url, &response).await {
            counter!(METRIC_CACHE_WRITE_ERROR).increment(1);
            warn!(error = %err, url, "failed to cache rendered snapshot");
        }
        Ok(response)
    }

    async fn update(&self, url: &str) -> Result<bool, RenderError> {
        if !self.inner.update(url).await? {
            return Ok(false);
        }
        if let Err(err) = self.cache_clear(url).await {
            warn!(error = %err, url, "failed to invalidate cached snapshot");
        }
        Ok(true)
    }
}

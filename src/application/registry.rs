//! Backend selection by configuration key.

use std::{collections::HashMap, sync::Arc};

use tracing::info;

use crate::{
    cache::{CachingBackend, StoreRegistry},
    config::SsrSettings,
    infra::prerender::{PrerenderHosted, PrerenderIo},
};

use super::backend::{BackendError, RenderBackend};

pub type BackendConstructor =
    fn(&SsrSettings, &StoreRegistry) -> Result<Arc<dyn RenderBackend>, BackendError>;

pub const PRERENDER_IO: &str = "prerender_io";
pub const PRERENDER_IO_HOSTED: &str = "prerender_io_hosted";

/// Constructors for every backend a configuration may name.
#[derive(Clone)]
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry holding the built-in prerender backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(PRERENDER_IO, prerender_io);
        registry.register(PRERENDER_IO_HOSTED, prerender_io_hosted);
        registry
    }

    /// Adds or replaces the constructor used for `name`.
    pub fn register(&mut self, name: impl Into<String>, constructor: BackendConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Builds the backend named by `settings.backend`.
    ///
    /// With caching enabled the backend is wrapped in a [`CachingBackend`]
    /// over the store registered under `settings.cache.alias`.
    pub fn build(
        &self,
        settings: &SsrSettings,
        stores: &StoreRegistry,
    ) -> Result<Arc<dyn RenderBackend>, BackendError> {
        let constructor = self
            .constructors
            .get(&settings.backend)
            .ok_or_else(|| BackendError::UnknownBackend(settings.backend.clone()))?;
        let backend = constructor(settings, stores)?;

        if !settings.cache.enabled {
            info!(backend = %settings.backend, cache = false, "render backend ready");
            return Ok(backend);
        }

        let store = stores
            .get(&settings.cache.alias)
            .ok_or_else(|| BackendError::UnknownCacheAlias(settings.cache.alias.clone()))?;
        info!(
            backend = %settings.backend,
            cache = true,
            cache_alias = %settings.cache.alias,
            "render backend ready"
        );
        Ok(Arc::new(CachingBackend::new(
            backend,
            store,
            settings.cache.prefix.clone(),
            settings.cache.timeout,
        )))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn prerender_io(
    settings: &SsrSettings,
    _stores: &StoreRegistry,
) -> Result<Arc<dyn RenderBackend>, BackendError> {
    Ok(Arc::new(PrerenderIo::from_settings(settings)?))
}

fn prerender_io_hosted(
    settings: &SsrSettings,
    _stores: &StoreRegistry,
) -> Result<Arc<dyn RenderBackend>, BackendError> {
    Ok(Arc::new(PrerenderHosted::from_settings(settings)?))
}

//! Render cache.
//!
//! A cache-aside layer keeps one snapshot per fully-qualified URL:
//!
//! - [`CachingBackend`] wraps any [`RenderBackend`](crate::application::backend::RenderBackend)
//!   and consults a [`CacheStore`] before calling it.
//! - Entries live under `{prefix}:{sha256(url)}` until their TTL runs out or
//!   an `update` for the URL succeeds.
//!
//! Nothing deduplicates concurrent misses: two requests for a cold URL may
//! both reach the render service.

mod backend;
mod codec;
mod keys;
mod store;

pub use backend::CachingBackend;
pub use codec::{CodecError, decode, encode};
pub use keys::build_key;
pub use store::{CacheStore, MemoryStore, StoreError, StoreRegistry};

pub(crate) use backend::{
    METRIC_CACHE_CORRUPT, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_WRITE_ERROR,
};

//! Request-tier cache.
//!
//! The base chain, scoped to one execution context. Nothing survives
//! the context: the acceleration table and any request-local store go
//! down with it.

use std::collections::{BTreeMap, HashMap};

use crate::context::RequestContext;
use crate::error::CacheError;
use crate::keys::CacheKey;
use crate::loader::{Cache, CacheLoader, Strictness};
use crate::value::{CacheValue, Cacheable};

pub struct RequestCache {
    inner: Cache,
}

impl RequestCache {
    pub fn new(inner: Cache) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Cache {
        &self.inner
    }

    pub fn set_cacheable<T: Cacheable>(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        object: &T,
    ) -> bool {
        self.inner.set_cacheable(ctx, key, object)
    }

    pub fn get_cacheable<T: Cacheable>(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
    ) -> Option<T> {
        self.inner.get_cacheable(ctx, key)
    }

    pub fn has_with_load(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.inner.has_with_load(ctx, key)
    }
}

impl CacheLoader for RequestCache {
    fn get_with(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        strictness: Strictness,
    ) -> Result<Option<CacheValue>, CacheError> {
        self.inner.get_with(ctx, key, strictness)
    }

    fn get_many_with(
        &self,
        ctx: &RequestContext,
        keys: &[CacheKey],
        strictness: Strictness,
    ) -> Result<HashMap<CacheKey, Option<CacheValue>>, CacheError> {
        self.inner.get_many_with(ctx, keys, strictness)
    }

    fn set(&self, ctx: &RequestContext, key: &CacheKey, value: CacheValue) -> bool {
        self.inner.set(ctx, key, value)
    }

    fn set_many(&self, ctx: &RequestContext, items: Vec<(CacheKey, CacheValue)>) -> usize {
        self.inner.set_many(ctx, items)
    }

    fn delete(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.inner.delete(ctx, key)
    }

    fn delete_many(&self, ctx: &RequestContext, keys: &[CacheKey]) -> usize {
        self.inner.delete_many(ctx, keys)
    }

    fn has(&self, ctx: &RequestContext, key: &CacheKey) -> bool {
        self.inner.has(ctx, key)
    }

    fn has_all(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        self.inner.has_all(ctx, keys)
    }

    fn has_any(&self, ctx: &RequestContext, keys: &[CacheKey]) -> bool {
        self.inner.has_any(ctx, keys)
    }

    fn purge(&self, ctx: &RequestContext) -> bool {
        self.inner.purge(ctx)
    }

    fn set_identifiers(&self, identifiers: BTreeMap<String, String>) {
        self.inner.set_identifiers(identifiers);
    }

    fn invalidation_events(&self) -> Vec<String> {
        self.inner.invalidation_events()
    }
}

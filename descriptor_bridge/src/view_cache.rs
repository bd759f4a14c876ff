//! Per-resource view deduplication
//!
//! Lookups take a shared lock. A miss creates the view with no lock held,
//! then inserts under the exclusive lock; if another thread inserted the
//! same key in between, its view wins and ours is discarded.

use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::context::DeviceContext;
use crate::error::Result;
use crate::view::{View, ViewRef};
use crate::view_key::ViewKey;
use crate::{bridge_error, bridge_trace};

pub struct ViewCache {
    owner_cookie: u64,
    map: RwLock<FxHashMap<ViewKey, ViewRef>>,
}

impl ViewCache {
    /// Empty cache whose views are registered under `owner_cookie`
    pub fn new(owner_cookie: u64) -> Self {
        Self {
            owner_cookie,
            map: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn owner_cookie(&self) -> u64 {
        self.owner_cookie
    }

    pub fn find(&self, key: &ViewKey) -> Option<ViewRef> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    /// Return the view for `key`, creating it on first use
    ///
    /// Two concurrent callers with equal keys always get the same view.
    /// Creation failures are not cached.
    pub fn find_or_create(&self, ctx: &Arc<DeviceContext>, key: &ViewKey) -> Result<ViewRef> {
        if let Some(view) = self.find(key) {
            return Ok(view);
        }

        let created = View::create(ctx, key, self.owner_cookie)?;

        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(key) {
            let existing = existing.clone();
            drop(map);
            bridge_trace!(
                "bridge::view_cache",
                "Lost view creation race for {:?} view, discarding cookie {}",
                key.kind(),
                created.cookie()
            );
            return Ok(existing);
        }

        map.insert(*key, created.clone());
        let len = map.len();
        drop(map);

        let interval = ctx.config.view_pressure_interval;
        if interval != 0 && len % interval == 0 {
            bridge_error!(
                "bridge::view_cache",
                "Intense view map pressure! Got {} views in hash map {:#x}.",
                len,
                self.owner_cookie
            );
        }

        Ok(created)
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the cache's references; views still bound elsewhere stay alive
    pub fn clear(&self) {
        let drained: Vec<ViewRef> = {
            let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
            map.drain().map(|(_, view)| view).collect()
        };
        drop(drained);
    }
}

#[cfg(test)]
#[path = "view_cache_tests.rs"]
mod tests;

//! Static sampler state
//!
//! Root-signature samplers are baked into small descriptor sets instead of
//! the bindless sampler heap. Samplers are deduplicated under a single
//! mutex, held across creation since this path is rare; descriptor sets
//! come from a growing list of pools.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::backend::{DescriptorPoolDesc, PoolAllocError};
use crate::context::DeviceContext;
use crate::descriptor::DescriptorType;
use crate::error::{Error, Result};
use crate::handle::{DescriptorPoolHandle, DescriptorSetHandle, SetLayoutHandle, ViewHandle};
use crate::sampler::{SamplerInfo, StaticSamplerDesc};
use crate::view::ViewKind;
use crate::{bridge_error, bridge_info};

const SOURCE: &str = "bridge::SamplerState";

#[derive(Default)]
struct SamplerStateInner {
    samplers: FxHashMap<SamplerInfo, ViewHandle>,
    pools: Vec<DescriptorPoolHandle>,
}

pub struct SamplerState {
    ctx: Arc<DeviceContext>,
    inner: Mutex<SamplerStateInner>,
}

impl SamplerState {
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        Self {
            ctx,
            inner: Mutex::new(SamplerStateInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SamplerStateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Low-level sampler for a static sampler description
    pub fn get_or_create(&self, desc: &StaticSamplerDesc) -> Result<ViewHandle> {
        let info = SamplerInfo::from_static_desc(desc, &self.ctx.caps)?;

        let mut inner = self.lock();
        if let Some(&sampler) = inner.samplers.get(&info) {
            return Ok(sampler);
        }

        let sampler = self.ctx.backend.create_sampler(&info)?;
        inner.samplers.insert(info, sampler);
        Ok(sampler)
    }

    pub fn sampler_count(&self) -> usize {
        self.lock().samplers.len()
    }

    pub fn pool_count(&self) -> usize {
        self.lock().pools.len()
    }

    fn create_pool(&self) -> Result<DescriptorPoolHandle> {
        let config = &self.ctx.config;
        self.ctx.backend.create_descriptor_pool(&DescriptorPoolDesc {
            descriptor_type: DescriptorType::Sampler,
            descriptor_count: config.sampler_pool_descriptors,
            max_sets: config.sampler_pool_sets,
        })
    }

    /// Allocate a static sampler set, adding a pool when the current one
    /// is exhausted or fragmented
    ///
    /// Returns the set and the pool it must be freed to.
    pub fn allocate_descriptor_set(
        &self,
        layout: SetLayoutHandle,
    ) -> Result<(DescriptorSetHandle, DescriptorPoolHandle)> {
        let backend = &self.ctx.backend;
        let mut inner = self.lock();

        if let Some(&pool) = inner.pools.last() {
            match backend.allocate_descriptor_set(pool, layout) {
                Ok(set) => return Ok((set, pool)),
                Err(PoolAllocError::OutOfPoolMemory) | Err(PoolAllocError::FragmentedPool) => {}
                Err(PoolAllocError::Failed(error)) => return Err(error),
            }
        }

        let pool = self.create_pool()?;
        inner.pools.push(pool);
        bridge_info!(SOURCE, "Allocated static sampler descriptor pool #{}", inner.pools.len());

        match backend.allocate_descriptor_set(pool, layout) {
            Ok(set) => Ok((set, pool)),
            Err(PoolAllocError::Failed(error)) => Err(error),
            Err(error) => {
                bridge_error!(SOURCE, "Fresh descriptor pool failed to allocate a set: {:?}", error);
                Err(Error::OutOfMemory)
            }
        }
    }

    pub fn free_descriptor_set(&self, set: DescriptorSetHandle, pool: DescriptorPoolHandle) {
        let _inner = self.lock();
        self.ctx.backend.free_descriptor_set(pool, set);
    }
}

impl Drop for SamplerState {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, sampler) in inner.samplers.drain() {
            self.ctx.backend.destroy_view(ViewKind::Sampler, sampler);
        }
        for pool in inner.pools.drain(..) {
            self.ctx.backend.destroy_descriptor_pool(pool);
        }
    }
}

#[cfg(test)]
#[path = "sampler_state_tests.rs"]
mod tests;

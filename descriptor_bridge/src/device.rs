//! Device - entry point of the descriptor bridge
//!
//! Owns the shared `DeviceContext`, the bindless sampler cache and the
//! static sampler state. Resources and heaps are created through it, and
//! the descriptor create/copy operations live in `descriptor_create.rs`
//! and `descriptor_copy.rs` as further `impl Device` blocks.

use std::sync::Arc;

use crate::backend::DeviceBackend;
use crate::bindless::BindlessState;
use crate::config::{Config, DeviceCaps};
use crate::context::DeviceContext;
use crate::cookie::CookieAllocator;
use crate::descriptor_qa::DescriptorQa;
use crate::error::Result;
use crate::format::Format;
use crate::handle::ImageHandle;
use crate::heap::{DescriptorHeap, HeapDesc, HeapKind};
use crate::resource::{BufferPlacement, Resource, ResourceDesc};
use crate::sampler_state::SamplerState;
use crate::view::{View, ViewRef};
use crate::view_cache::ViewCache;
use crate::view_key::{BufferViewDesc, ViewKey};
use crate::{bridge_bail, bridge_err, bridge_info};

pub(crate) const SOURCE: &str = "bridge::Device";

pub struct Device {
    ctx: Arc<DeviceContext>,
    /// Bindless sampler views, shared by every sampler heap
    sampler_cache: ViewCache,
    sampler_state: SamplerState,
}

impl Device {
    /// Device with its own cookie allocator and no QA collaborator
    pub fn new(backend: Arc<dyn DeviceBackend>, config: Config) -> Self {
        Self::with_collaborators(backend, config, Arc::new(CookieAllocator::new()), None)
    }

    /// Device sharing `cookies` with other devices, optionally reporting
    /// descriptor activity to `qa`
    pub fn with_collaborators(
        backend: Arc<dyn DeviceBackend>,
        config: Config,
        cookies: Arc<CookieAllocator>,
        qa: Option<Arc<dyn DescriptorQa>>,
    ) -> Self {
        let ctx = Arc::new(DeviceContext::new(backend, config, cookies, qa));
        bridge_info!(SOURCE, "Bindless layout: {} sets, flags {:?}",
            ctx.bindless.set_infos().len(), ctx.bindless.flags());

        Self {
            sampler_cache: ViewCache::new(0),
            sampler_state: SamplerState::new(ctx.clone()),
            ctx,
        }
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.ctx.caps
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn bindless(&self) -> &BindlessState {
        &self.ctx.bindless
    }

    pub fn cookies(&self) -> &Arc<CookieAllocator> {
        &self.ctx.cookies
    }

    pub(crate) fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    pub fn sampler_cache(&self) -> &ViewCache {
        &self.sampler_cache
    }

    pub fn sampler_state(&self) -> &SamplerState {
        &self.sampler_state
    }

    /// Register a buffer placed at `placement` and map its device addresses
    pub fn import_buffer(&self, desc: ResourceDesc, placement: BufferPlacement) -> Result<Arc<Resource>> {
        if !desc.is_buffer() {
            bridge_bail!(InvalidArgument, SOURCE,
                "import_buffer called with {:?} description", desc.dimension);
        }
        if placement.buffer.is_null() {
            bridge_bail!(InvalidArgument, SOURCE, "Buffer resource without a buffer object");
        }
        Ok(Resource::new_buffer(&self.ctx, desc, placement))
    }

    /// Register a texture backed by `image`
    pub fn import_texture(&self, desc: ResourceDesc, image: ImageHandle) -> Result<Arc<Resource>> {
        if desc.is_buffer() {
            bridge_bail!(InvalidArgument, SOURCE, "import_texture called with a buffer description");
        }
        if image.is_null() {
            bridge_bail!(InvalidArgument, SOURCE, "Texture resource without an image object");
        }
        if desc.mip_levels == 0 || desc.depth_or_array_size == 0 {
            bridge_bail!(InvalidArgument, SOURCE,
                "Texture with {} mips and {} layers", desc.mip_levels, desc.depth_or_array_size);
        }
        Ok(Resource::new_texture(&self.ctx, desc, image))
    }

    pub fn allocate_descriptor_table(
        &self,
        kind: HeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<Arc<DescriptorHeap>> {
        DescriptorHeap::new(&self.ctx, &HeapDesc { kind, capacity, shader_visible })
    }

    /// Uncached `R32_UINT` view of the buffer memory starting at `va`
    ///
    /// Used for root descriptors, which are not cached per resource.
    pub fn create_raw_buffer_view(&self, va: u64) -> Result<ViewRef> {
        let range = self.ctx.va_map.lookup(va).ok_or_else(|| {
            bridge_err!(InvalidArgument, SOURCE, "No buffer mapped at VA {:#x}", va)
        })?;

        let size = (range.size - range.resource_offset(va)).min(self.ctx.caps.max_storage_buffer_range);
        let key = ViewKey::Buffer(BufferViewDesc {
            buffer: range.buffer,
            format: Format::R32_UINT,
            offset: range.buffer_offset(va),
            size,
        });
        View::create(&self.ctx, &key, range.cookie)
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;

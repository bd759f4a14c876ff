/*!
# Descriptor Bridge

Descriptor view cache and bindless descriptor update engine for a D3D12-style
resource model running on top of an explicit, Vulkan-like API.

This crate is backend agnostic: every low-level call goes through the
`DeviceBackend` trait. `RecordingBackend` is a headless implementation that
records what the engine asks for; the `descriptor_bridge_vulkan` crate
provides the real one.

## Architecture

- **Device**: owns the shared device context and exposes the descriptor
  create/copy operations
- **Resource**: a registered buffer or texture with its own view cache
- **ViewCache**: concurrent find-or-create of deduplicated views
- **DescriptorHeap**: logical slots backed by physical bindless sets and
  host side tables
- **BindlessState**: static choice between one mutable set and N typed sets
- **SamplerState**: static samplers and their descriptor pools
*/

// Internal modules
mod backend;
mod bindless;
mod config;
mod context;
mod cookie;
mod descriptor;
mod descriptor_copy;
mod descriptor_create;
mod descriptor_qa;
mod device;
mod error;
mod format;
mod handle;
mod heap;
pub mod log;
mod quantize;
mod recording_backend;
mod registry;
mod resource;
mod sampler;
mod sampler_state;
mod va_map;
mod view;
mod view_cache;
mod view_desc;
mod view_key;

// Main bridge namespace module
pub mod bridge {
    // Error types
    pub use crate::error::{Error, Result};

    // Logger registry
    pub use crate::registry::Bridge;

    // Device and configuration
    pub use crate::config::{Config, DeviceCaps};
    pub use crate::cookie::CookieAllocator;
    pub use crate::device::Device;

    // Backend interface
    pub use crate::backend::{
        DescriptorCopy, DescriptorPoolDesc, DescriptorWrite, DeviceBackend, HeapStorage,
        HeapStorageDesc, HostTables, ImageLayout, PoolAllocError, WritePayload,
    };
    pub use crate::handle::{
        BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, ImageHandle, SetLayoutHandle,
        ViewHandle,
    };
    pub use crate::recording_backend::{RecordingBackend, BUFFER_ADDRESS_SPACING};

    // Bindless layout
    pub use crate::bindless::{
        BindlessFlags, BindlessSetFlags, BindlessSetInfo, BindlessState, DescriptorBinding,
        MAX_BINDLESS_DESCRIPTOR_SETS,
    };

    // Descriptors and heaps
    pub use crate::descriptor::{
        BoundBufferRange, BufferBinding, DescriptorFlags, DescriptorMetadata, DescriptorPayload,
        DescriptorState, DescriptorType,
    };
    pub use crate::descriptor_qa::{DescriptorQa, QaTypeFlags};
    pub use crate::heap::{DescriptorHeap, DescriptorRef, HeapDesc, HeapKind, RtvDescriptor, RtvRef};

    // Resources and views
    pub use crate::format::{Format, FormatAspects};
    pub use crate::quantize::{align_byte_range, quantize_typed_range, AlignedByteRange, QuantizedRange};
    pub use crate::resource::{BufferPlacement, Resource, ResourceDesc, ResourceDimension, ResourceFlags};
    pub use crate::va_map::{VaMap, VaRange};
    pub use crate::view::{View, ViewKind, ViewRef};
    pub use crate::view_cache::ViewCache;
    pub use crate::view_desc::*;
    pub use crate::view_key::{
        BufferViewDesc, ComponentSwizzle, ImageUsage, ImageViewDesc, ImageViewType, Swizzle,
        ViewKey, DEFAULT_COMPONENT_MAPPING,
    };

    // Samplers
    pub use crate::sampler::{
        AddressMode, BorderColor, ComparisonFunc, Filter, FilterMode, ReductionMode, SamplerDesc,
        SamplerInfo, StaticBorderColor, StaticSamplerDesc,
    };
    pub use crate::sampler_state::SamplerState;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }
}

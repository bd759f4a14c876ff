/*!
# Descriptor Bridge - Vulkan Backend

Vulkan implementation of the descriptor bridge's `DeviceBackend`.

This crate creates views, bindless descriptor sets and host side tables
using the Ash library for Vulkan bindings and gpu-allocator for memory
management.

# Example

```no_run
use descriptor_bridge::bridge::{Config, Device};
use descriptor_bridge_vulkan::{ContextConfig, VulkanBackend, VulkanContext};
use std::sync::Arc;

let ctx = VulkanContext::new(ContextConfig::default())?;
let backend = Arc::new(VulkanBackend::new(ctx)?);
let device = Device::new(backend, Config::default());
# Ok::<(), descriptor_bridge::bridge::Error>(())
```
*/

mod vulkan_backend;
mod vulkan_context;
mod vulkan_debug;
mod vulkan_format;

pub use vulkan_backend::VulkanBackend;
pub use vulkan_context::{
    ContextConfig, VulkanContext, VulkanFeatures, VulkanLimits, MAX_BINDLESS_RESOURCES,
    MAX_BINDLESS_SAMPLERS,
};

// Re-export debug utilities
pub use vulkan_debug::{get_validation_stats, reset_validation_stats, ValidationStats};

//! Device capabilities and bridge configuration
//!
//! `DeviceCaps` are facts reported by the backend at device creation;
//! `Config` is policy chosen by the embedder. Both are combined once into
//! the bindless layout and never change for the lifetime of a device.

/// Hardware facts reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// A single descriptor binding may hold any resource descriptor type
    pub mutable_descriptor_type: bool,
    /// Acceleration structures and their device addresses are available
    pub ray_tracing: bool,
    pub custom_border_color: bool,
    pub sampler_min_max_reduction: bool,
    /// Largest element count of one texel buffer view
    pub max_texel_buffer_elements: u64,
    pub min_storage_buffer_offset_alignment: u64,
    pub min_texel_buffer_offset_alignment: u64,
    pub max_storage_buffer_range: u64,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            mutable_descriptor_type: false,
            ray_tracing: false,
            custom_border_color: false,
            sampler_min_max_reduction: false,
            max_texel_buffer_elements: 1 << 27,
            min_storage_buffer_offset_alignment: 16,
            min_texel_buffer_offset_alignment: 16,
            max_storage_buffer_range: u32::MAX as u64,
        }
    }
}

/// Bridge policy
///
/// # Example
///
/// ```
/// use descriptor_bridge::bridge::Config;
///
/// let config = Config {
///     typed_offset_buffer: false,
///     ..Config::default()
/// };
/// assert_eq!(config.constant_buffer_alignment, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Use one mutable set for CBV/SRV/UAV when the device supports it
    pub use_mutable_descriptors: bool,
    /// Keep UAV counters and RTAS addresses in a raw VA side table
    pub raw_va_aux_buffer: bool,
    /// Quantize typed buffer views and publish the residual offset
    pub typed_offset_buffer: bool,
    /// Publish SSBO alignment residuals in the buffer range side table
    pub ssbo_offset_buffer: bool,
    /// Also expose buffer SRV/UAVs as storage buffers
    pub ssbo_raw_buffers: bool,
    /// Interval (in entries) of the view map pressure diagnostic
    pub view_pressure_interval: usize,
    /// Required alignment of constant buffer view sizes, 0 disables the check
    pub constant_buffer_alignment: u64,
    /// Sets per static sampler descriptor pool
    pub sampler_pool_sets: u32,
    /// Sampler descriptors per static sampler descriptor pool
    pub sampler_pool_descriptors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_mutable_descriptors: true,
            raw_va_aux_buffer: true,
            typed_offset_buffer: true,
            ssbo_offset_buffer: true,
            ssbo_raw_buffers: true,
            view_pressure_interval: 1024,
            constant_buffer_alignment: 256,
            sampler_pool_sets: 4096,
            sampler_pool_descriptors: 16384,
        }
    }
}

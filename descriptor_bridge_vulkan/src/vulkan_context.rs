//! VulkanContext - Shared device state for the Vulkan backend
//!
//! Owns the instance, the logical device and the memory allocator, plus
//! the feature bits and limits the descriptor bridge cares about. Shared
//! via `Arc` by the backend and every host side table it allocates.

use ash::vk;
use descriptor_bridge::bridge::{DeviceCaps, Error, Result};
use descriptor_bridge::{bridge_err, bridge_info, bridge_warn};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

const SOURCE: &str = "bridge::vulkan";

/// Upper bound of resource descriptors in one bindless set
pub const MAX_BINDLESS_RESOURCES: u32 = 1_000_000;
/// Upper bound of samplers in one bindless set
pub const MAX_BINDLESS_SAMPLERS: u32 = 2048;

/// Context creation options
#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    /// Enable VK_LAYER_KHRONOS_validation and route its messages to the bridge logger
    ///
    /// Ignored unless the `vulkan-validation` feature is compiled in.
    pub enable_validation: bool,
    /// Enable acceleration structures when the device supports them
    pub enable_ray_tracing: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enable_validation: false,
            enable_ray_tracing: true,
        }
    }
}

/// Optional device features that were found and enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VulkanFeatures {
    pub mutable_descriptor_type: bool,
    pub acceleration_structure: bool,
    pub custom_border_color: bool,
    pub sampler_filter_minmax: bool,
    pub image_view_min_lod: bool,
}

/// Device limits relevant to descriptor management
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanLimits {
    pub max_texel_buffer_elements: u64,
    pub min_storage_buffer_offset_alignment: u64,
    pub min_texel_buffer_offset_alignment: u64,
    pub max_storage_buffer_range: u64,
    pub max_bindless_resources: u32,
    pub max_bindless_samplers: u32,
}

/// Shared Vulkan device context
pub struct VulkanContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    pub physical_device: vk::PhysicalDevice,

    /// Queue family the device was created with (graphics or compute)
    pub queue_family: u32,

    pub features: VulkanFeatures,
    pub limits: VulkanLimits,

    /// Acceleration structure loader, present when ray tracing is enabled
    pub(crate) acceleration_structure: Option<ash::khr::acceleration_structure::Device>,

    instance: ash::Instance,
    _entry: ash::Entry,

    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext_name| ext_name == name))
}

impl VulkanContext {
    /// Create a headless context on the first device with Vulkan 1.2+
    ///
    /// Bindless descriptors (descriptor indexing, update-after-bind,
    /// partially bound arrays), buffer device addresses and null
    /// descriptors are required. Everything else is enabled when present
    /// and reported through [`VulkanContext::caps`].
    pub fn new(config: ContextConfig) -> Result<Arc<Self>> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to load Vulkan library: {:?}", e))?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"Descriptor Bridge")
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"DescriptorBridge")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let enable_validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !enable_validation {
                bridge_warn!(SOURCE, "Validation requested but the vulkan-validation feature is disabled");
            }

            let mut extension_names = Vec::new();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if enable_validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create Vulkan instance: {:?}", e))?;

            let (debug_utils_loader, debug_messenger) = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::vulkan_debug::messenger_severity())
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));

                match debug_utils.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => (Some(debug_utils), Some(messenger)),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(bridge_err!(DeviceCallFailed, SOURCE,
                            "Failed to create debug messenger: {:?}", e));
                    }
                }
            } else {
                (None, None)
            };

            let result = Self::create_device(&instance, config);
            let (physical_device, queue_family, device, features, limits) = match result {
                Ok(created) => created,
                Err(error) => {
                    if let (Some(loader), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                        loader.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                    return Err(error);
                }
            };

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: true,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    if let (Some(loader), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                        loader.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                    return Err(bridge_err!(DeviceCallFailed, SOURCE,
                        "Failed to create GPU allocator: {:?}", e));
                }
            };

            let acceleration_structure = features
                .acceleration_structure
                .then(|| ash::khr::acceleration_structure::Device::new(&instance, &device));

            bridge_info!(SOURCE, "Vulkan device ready ({:?})", features);

            Ok(Arc::new(Self {
                device,
                allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
                physical_device,
                queue_family,
                features,
                limits,
                acceleration_structure,
                instance,
                _entry: entry,
                debug_utils_loader,
                debug_messenger,
            }))
        }
    }

    #[allow(clippy::type_complexity)]
    unsafe fn create_device(
        instance: &ash::Instance,
        config: ContextConfig,
    ) -> Result<(vk::PhysicalDevice, u32, ash::Device, VulkanFeatures, VulkanLimits)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to enumerate physical devices: {:?}", e))?;

        let physical_device = physical_devices
            .into_iter()
            .find(|&pd| instance.get_physical_device_properties(pd).api_version >= vk::API_VERSION_1_2)
            .ok_or_else(|| bridge_err!(NotImplemented, SOURCE, "No Vulkan 1.2 capable GPU found"))?;

        let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
        let queue_family = queue_families
            .iter()
            .position(|qf| qf.queue_flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))
            .map(|i| i as u32)
            .ok_or_else(|| bridge_err!(NotImplemented, SOURCE, "No graphics or compute queue family found"))?;

        let available = instance
            .enumerate_device_extension_properties(physical_device)
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to enumerate device extensions: {:?}", e))?;

        if !has_extension(&available, ash::ext::robustness2::NAME) {
            return Err(bridge_err!(NotImplemented, SOURCE, "VK_EXT_robustness2 is required for null descriptors"));
        }
        let has_mutable = has_extension(&available, ash::ext::mutable_descriptor_type::NAME);
        let has_border = has_extension(&available, ash::ext::custom_border_color::NAME);
        let has_min_lod = has_extension(&available, ash::ext::image_view_min_lod::NAME);
        let has_accel = config.enable_ray_tracing
            && has_extension(&available, ash::khr::acceleration_structure::NAME)
            && has_extension(&available, ash::khr::deferred_host_operations::NAME);

        // Query what the device supports
        let mut supported12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut supported_robustness2 = vk::PhysicalDeviceRobustness2FeaturesEXT::default();
        let mut supported_mutable = vk::PhysicalDeviceMutableDescriptorTypeFeaturesEXT::default();
        let mut supported_border = vk::PhysicalDeviceCustomBorderColorFeaturesEXT::default();
        let mut supported_min_lod = vk::PhysicalDeviceImageViewMinLodFeaturesEXT::default();
        let mut supported_accel = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
        let supported_core = {
            let mut query = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut supported12)
                .push_next(&mut supported_robustness2);
            if has_mutable {
                query = query.push_next(&mut supported_mutable);
            }
            if has_border {
                query = query.push_next(&mut supported_border);
            }
            if has_min_lod {
                query = query.push_next(&mut supported_min_lod);
            }
            if has_accel {
                query = query.push_next(&mut supported_accel);
            }
            instance.get_physical_device_features2(physical_device, &mut query);
            query.features
        };

        let required = [
            ("descriptorIndexing", supported12.descriptor_indexing),
            ("runtimeDescriptorArray", supported12.runtime_descriptor_array),
            ("descriptorBindingPartiallyBound", supported12.descriptor_binding_partially_bound),
            ("descriptorBindingVariableDescriptorCount", supported12.descriptor_binding_variable_descriptor_count),
            ("descriptorBindingSampledImageUpdateAfterBind", supported12.descriptor_binding_sampled_image_update_after_bind),
            ("descriptorBindingStorageImageUpdateAfterBind", supported12.descriptor_binding_storage_image_update_after_bind),
            ("descriptorBindingStorageBufferUpdateAfterBind", supported12.descriptor_binding_storage_buffer_update_after_bind),
            ("descriptorBindingUniformBufferUpdateAfterBind", supported12.descriptor_binding_uniform_buffer_update_after_bind),
            ("descriptorBindingUniformTexelBufferUpdateAfterBind", supported12.descriptor_binding_uniform_texel_buffer_update_after_bind),
            ("descriptorBindingStorageTexelBufferUpdateAfterBind", supported12.descriptor_binding_storage_texel_buffer_update_after_bind),
            ("bufferDeviceAddress", supported12.buffer_device_address),
            ("nullDescriptor", supported_robustness2.null_descriptor),
        ];
        if let Some((name, _)) = required.iter().find(|(_, supported)| *supported != vk::TRUE) {
            return Err(bridge_err!(NotImplemented, SOURCE, "Required device feature {} is not supported", name));
        }

        let features = VulkanFeatures {
            mutable_descriptor_type: has_mutable && supported_mutable.mutable_descriptor_type == vk::TRUE,
            acceleration_structure: has_accel && supported_accel.acceleration_structure == vk::TRUE,
            custom_border_color: has_border
                && supported_border.custom_border_colors == vk::TRUE
                && supported_border.custom_border_color_without_format == vk::TRUE,
            sampler_filter_minmax: supported12.sampler_filter_minmax == vk::TRUE,
            image_view_min_lod: has_min_lod && supported_min_lod.min_lod == vk::TRUE,
        };
        if config.enable_ray_tracing && !features.acceleration_structure {
            bridge_warn!(SOURCE, "Acceleration structures are not supported, ray tracing disabled");
        }

        // Enable exactly what the bridge uses
        let mut enabled12 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_variable_descriptor_count(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_storage_image_update_after_bind(true)
            .descriptor_binding_storage_buffer_update_after_bind(true)
            .descriptor_binding_uniform_buffer_update_after_bind(true)
            .descriptor_binding_uniform_texel_buffer_update_after_bind(true)
            .descriptor_binding_storage_texel_buffer_update_after_bind(true)
            .shader_sampled_image_array_non_uniform_indexing(supported12.shader_sampled_image_array_non_uniform_indexing == vk::TRUE)
            .shader_storage_image_array_non_uniform_indexing(supported12.shader_storage_image_array_non_uniform_indexing == vk::TRUE)
            .shader_storage_buffer_array_non_uniform_indexing(supported12.shader_storage_buffer_array_non_uniform_indexing == vk::TRUE)
            .buffer_device_address(true)
            .sampler_filter_minmax(features.sampler_filter_minmax);
        let mut enabled_robustness2 = vk::PhysicalDeviceRobustness2FeaturesEXT::default().null_descriptor(true);
        let mut enabled_mutable = vk::PhysicalDeviceMutableDescriptorTypeFeaturesEXT::default().mutable_descriptor_type(true);
        let mut enabled_border = vk::PhysicalDeviceCustomBorderColorFeaturesEXT::default()
            .custom_border_colors(true)
            .custom_border_color_without_format(true);
        let mut enabled_min_lod = vk::PhysicalDeviceImageViewMinLodFeaturesEXT::default().min_lod(true);
        let mut enabled_accel = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);
        let enabled_core = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(supported_core.sampler_anisotropy == vk::TRUE)
            .shader_int64(supported_core.shader_int64 == vk::TRUE);

        let mut device_extension_names = vec![ash::ext::robustness2::NAME.as_ptr()];
        if features.mutable_descriptor_type {
            device_extension_names.push(ash::ext::mutable_descriptor_type::NAME.as_ptr());
        }
        if features.custom_border_color {
            device_extension_names.push(ash::ext::custom_border_color::NAME.as_ptr());
        }
        if features.image_view_min_lod {
            device_extension_names.push(ash::ext::image_view_min_lod::NAME.as_ptr());
        }
        if features.acceleration_structure {
            device_extension_names.push(ash::khr::acceleration_structure::NAME.as_ptr());
            device_extension_names.push(ash::khr::deferred_host_operations::NAME.as_ptr());
        }

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let mut device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .enabled_features(&enabled_core)
            .push_next(&mut enabled12)
            .push_next(&mut enabled_robustness2);
        if features.mutable_descriptor_type {
            device_create_info = device_create_info.push_next(&mut enabled_mutable);
        }
        if features.custom_border_color {
            device_create_info = device_create_info.push_next(&mut enabled_border);
        }
        if features.image_view_min_lod {
            device_create_info = device_create_info.push_next(&mut enabled_min_lod);
        }
        if features.acceleration_structure {
            device_create_info = device_create_info.push_next(&mut enabled_accel);
        }

        let device = instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(|e| bridge_err!(DeviceCallFailed, SOURCE, "Failed to create logical device: {:?}", e))?;

        let limits = Self::query_limits(instance, physical_device);
        Ok((physical_device, queue_family, device, features, limits))
    }

    unsafe fn query_limits(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> VulkanLimits {
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingProperties::default();
        let core = {
            let mut properties = vk::PhysicalDeviceProperties2::default().push_next(&mut indexing);
            instance.get_physical_device_properties2(physical_device, &mut properties);
            properties.properties.limits
        };

        let max_bindless_resources = [
            indexing.max_per_stage_update_after_bind_resources,
            indexing.max_descriptor_set_update_after_bind_sampled_images,
            indexing.max_descriptor_set_update_after_bind_storage_images,
            indexing.max_descriptor_set_update_after_bind_storage_buffers,
            MAX_BINDLESS_RESOURCES,
        ]
        .into_iter()
        .min()
        .unwrap_or(MAX_BINDLESS_RESOURCES);

        VulkanLimits {
            max_texel_buffer_elements: core.max_texel_buffer_elements as u64,
            min_storage_buffer_offset_alignment: core.min_storage_buffer_offset_alignment,
            min_texel_buffer_offset_alignment: core.min_texel_buffer_offset_alignment,
            max_storage_buffer_range: core.max_storage_buffer_range as u64,
            max_bindless_resources,
            max_bindless_samplers: indexing
                .max_descriptor_set_update_after_bind_samplers
                .min(MAX_BINDLESS_SAMPLERS),
        }
    }

    /// Capabilities reported to the bridge
    pub fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            mutable_descriptor_type: self.features.mutable_descriptor_type,
            ray_tracing: self.features.acceleration_structure,
            custom_border_color: self.features.custom_border_color,
            sampler_min_max_reduction: self.features.sampler_filter_minmax,
            max_texel_buffer_elements: self.limits.max_texel_buffer_elements,
            min_storage_buffer_offset_alignment: self.limits.min_storage_buffer_offset_alignment,
            min_texel_buffer_offset_alignment: self.limits.min_texel_buffer_offset_alignment,
            max_storage_buffer_range: self.limits.max_storage_buffer_range,
        }
    }

    /// Vulkan instance the device was created from
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Wait for all device work to finish
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| -> Error { bridge_err!(DeviceCallFailed, SOURCE, "vkDeviceWaitIdle failed: {:?}", e) })
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Allocator first, it still references the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

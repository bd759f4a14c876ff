//! DeviceContext - state shared by every object of one device
//!
//! Views, heaps and resources hold an `Arc<DeviceContext>` so they can call
//! back into the backend when they are destroyed, without a reference to
//! the `Device` itself.

use std::sync::Arc;

use crate::backend::DeviceBackend;
use crate::bindless::BindlessState;
use crate::config::{Config, DeviceCaps};
use crate::cookie::CookieAllocator;
use crate::descriptor_qa::DescriptorQa;
use crate::va_map::VaMap;

pub struct DeviceContext {
    pub backend: Arc<dyn DeviceBackend>,
    pub caps: DeviceCaps,
    pub config: Config,
    /// Fixed at device creation
    pub bindless: BindlessState,
    pub cookies: Arc<CookieAllocator>,
    pub qa: Option<Arc<dyn DescriptorQa>>,
    /// Device addresses of every live buffer resource
    pub va_map: VaMap,
}

impl DeviceContext {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        config: Config,
        cookies: Arc<CookieAllocator>,
        qa: Option<Arc<dyn DescriptorQa>>,
    ) -> Self {
        let caps = backend.caps();
        let bindless = BindlessState::new(&caps, &config);
        Self {
            backend,
            caps,
            config,
            bindless,
            cookies,
            qa,
            va_map: VaMap::new(),
        }
    }

    /// Run `hook` against the QA collaborator if one is attached
    pub(crate) fn notify_qa(&self, hook: impl FnOnce(&dyn DescriptorQa)) {
        if let Some(qa) = &self.qa {
            hook(qa.as_ref());
        }
    }
}

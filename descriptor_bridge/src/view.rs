//! View objects
//!
//! A `View` owns one low-level view (buffer view, image view, sampler or
//! acceleration structure) and destroys it when the last `ViewRef` goes
//! away. View caches and descriptor slots share ownership through `Arc`.

use std::fmt;
use std::sync::Arc;

use crate::context::DeviceContext;
use crate::error::Result;
use crate::handle::ViewHandle;
use crate::view_key::ViewKey;

/// Kind of low-level object behind a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Buffer,
    Image,
    Sampler,
    AccelerationStructure,
}

impl ViewKey {
    pub fn kind(&self) -> ViewKind {
        match self {
            ViewKey::Buffer(_) => ViewKind::Buffer,
            ViewKey::Image(_) => ViewKind::Image,
            ViewKey::Sampler(_) => ViewKind::Sampler,
            ViewKey::AccelerationStructure(_) => ViewKind::AccelerationStructure,
        }
    }
}

/// Shared reference to a view
pub type ViewRef = Arc<View>;

pub struct View {
    ctx: Arc<DeviceContext>,
    handle: ViewHandle,
    cookie: u64,
    info: ViewKey,
}

impl View {
    /// Create the low-level object described by `key`
    ///
    /// `owner_cookie` identifies the resource (or 0 for the device) the
    /// view is registered under for descriptor QA.
    pub fn create(ctx: &Arc<DeviceContext>, key: &ViewKey, owner_cookie: u64) -> Result<ViewRef> {
        let backend = &ctx.backend;
        let handle = match key {
            ViewKey::Buffer(desc) => backend.create_buffer_view(desc)?,
            ViewKey::Image(desc) => backend.create_image_view(desc)?,
            ViewKey::Sampler(info) => backend.create_sampler(info)?,
            ViewKey::AccelerationStructure(desc) => backend.create_acceleration_structure_view(desc)?,
        };

        let cookie = ctx.cookies.allocate();
        ctx.notify_qa(|qa| qa.register_view(cookie, owner_cookie));

        Ok(Arc::new(View {
            ctx: ctx.clone(),
            handle,
            cookie,
            info: *key,
        }))
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    /// Description the view was created from
    pub fn info(&self) -> &ViewKey {
        &self.info
    }

    pub fn kind(&self) -> ViewKind {
        self.info.kind()
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("handle", &self.handle)
            .field("cookie", &self.cookie)
            .field("info", &self.info)
            .finish()
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.ctx.backend.destroy_view(self.kind(), self.handle);
        self.ctx.notify_qa(|qa| qa.unregister(self.cookie));
    }
}

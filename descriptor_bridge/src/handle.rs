//! Opaque low-level object handles
//!
//! The core never interprets these values; the backend decides what they
//! encode (a raw `VkBuffer`, an index into a table, ...). Zero means null.

use std::num::NonZeroU64;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// Low-level buffer object
    BufferHandle
);
define_handle!(
    /// Low-level image object
    ImageHandle
);
define_handle!(
    /// One physical descriptor set
    DescriptorSetHandle
);
define_handle!(
    /// Pool physical descriptor sets are carved from
    DescriptorPoolHandle
);
define_handle!(
    /// Descriptor set layout, owned by the binding/root-signature layer
    SetLayoutHandle
);

/// Created buffer view, image view, sampler or acceleration structure
///
/// Never null: a `View` cannot exist without a live low-level object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(pub NonZeroU64);

impl ViewHandle {
    /// Wrap a raw backend value, `None` for a null handle
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

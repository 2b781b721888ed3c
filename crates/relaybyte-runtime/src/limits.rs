//! Resource limits applied to guest stores.

use wasmtime::{StoreLimits, StoreLimitsBuilder};

/// Per-instance guest resource limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestLimits {
    /// Ceiling on guest linear memory, in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl GuestLimits {
    /// Build Wasmtime store limits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn store_limits(&self) -> StoreLimits {
        let mut builder = StoreLimitsBuilder::new();
        if let Some(max_bytes) = self.max_memory_bytes {
            builder = builder.memory_size(max_bytes as usize);
        }
        builder.trap_on_grow_failure(true).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_memory_ceiling() {
        assert_eq!(GuestLimits::default().max_memory_bytes, None);
        let _ = GuestLimits::default().store_limits();
    }
}

//! Storage tier definitions

/// Where a shared element lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    /// POSIX shared memory segment
    Shm,
    /// File or directory in a cache namespace
    Disk,
}

impl StorageTier {
    /// URL scheme of the tier
    pub const fn scheme(&self) -> &'static str {
        match self {
            StorageTier::Shm => "shm://",
            StorageTier::Disk => "file://",
        }
    }
}

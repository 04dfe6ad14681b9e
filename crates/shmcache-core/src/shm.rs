//! POSIX shared memory wrapper

use crate::{Error, Result};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::io;
use tracing::debug;

/// OS identifier for a segment name. POSIX wants a single leading slash.
pub(crate) fn os_id(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Shared memory region wrapper
///
/// Dropping the wrapper only unmaps the region. The segment itself persists
/// until [`SharedMemory::unlink`] or [`unlink`] removes it, so it can outlive
/// the exporting handle while workers still use it.
pub struct SharedMemory {
    inner: Shmem,
    name: String,
    size: usize,
}

impl SharedMemory {
    /// Create a new shared memory region
    ///
    /// A stale segment with the same name, left behind by a crashed run, is
    /// unlinked and the creation retried once.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let id = os_id(name);
        let mut shmem = match ShmemConf::new().size(size).os_id(&id).create() {
            Ok(shmem) => shmem,
            Err(ShmemError::MappingIdExists) | Err(ShmemError::LinkExists) => {
                debug!("shared segment {} already exists, replacing", name);
                unlink(name)?;
                ShmemConf::new()
                    .size(size)
                    .os_id(&id)
                    .create()
                    .map_err(|e| Error::SharedMemory(e.to_string()))?
            }
            Err(e) => return Err(Error::SharedMemory(e.to_string())),
        };
        shmem.set_owner(false);

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            size,
        })
    }

    /// Open an existing shared memory region
    pub fn open(name: &str) -> Result<Self> {
        let mut shmem = ShmemConf::new()
            .os_id(os_id(name))
            .open()
            .map_err(|e| Error::SharedMemory(e.to_string()))?;
        shmem.set_owner(false);

        let size = shmem.len();

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            size,
        })
    }

    /// Get the name of the shared memory region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of the shared memory region
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a raw pointer to the shared memory
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Get a mutable raw pointer to the shared memory
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.inner.as_ptr()
    }

    /// Get a slice view of the shared memory
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Get a mutable slice view of the shared memory
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.size) }
    }

    /// Remove the segment from the system once this mapping is dropped
    pub fn unlink(mut self) {
        self.inner.set_owner(true);
    }
}

/// Remove a segment by name. Returns `false` if it did not exist.
///
/// Failing to open the segment for any other reason, such as a permission
/// error, is an error rather than `false`.
pub fn unlink(name: &str) -> Result<bool> {
    match ShmemConf::new().os_id(os_id(name)).open() {
        Ok(mut shmem) => {
            shmem.set_owner(true);
            Ok(true)
        }
        Err(ShmemError::MapOpenFailed(code))
            if io::Error::from_raw_os_error(code as i32).kind() == io::ErrorKind::NotFound =>
        {
            Ok(false)
        }
        Err(e) => Err(Error::SharedMemory(format!("cannot unlink {}: {}", name, e))),
    }
}

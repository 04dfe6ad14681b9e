//! Shared buffers and their handles

use crate::array::{element_count, Array};
use crate::dtype::DType;
use crate::meta::{SegmentHeader, DATA_OFFSET};
use crate::shm::SharedMemory;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Array data either held locally or placed in a shared segment
pub enum Buffer {
    Local(Array),
    Shared(SharedBuffer),
}

impl Buffer {
    pub fn dtype(&self) -> DType {
        match self {
            Buffer::Local(array) => array.dtype(),
            Buffer::Shared(shared) => shared.dtype(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Buffer::Local(array) => array.shape(),
            Buffer::Shared(shared) => shared.shape(),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Buffer::Shared(_))
    }
}

impl From<Array> for Buffer {
    fn from(array: Array) -> Self {
        Buffer::Local(array)
    }
}

impl From<SharedBuffer> for Buffer {
    fn from(shared: SharedBuffer) -> Self {
        Buffer::Shared(shared)
    }
}

/// Everything a worker needs to attach to a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedHandle {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub complex_packing: bool,
    pub len: u64,
    pub owner: u32,
}

/// A typed array stored in a shared memory segment
pub struct SharedBuffer {
    shm: SharedMemory,
    header: SegmentHeader,
    dtype: DType,
    storage: DType,
    shape: Vec<usize>,
}

impl SharedBuffer {
    /// Allocate a segment for `shape` elements of `dtype` and write its header.
    /// The payload is left zeroed for the caller to fill.
    pub(crate) fn create(name: &str, dtype: DType, shape: &[usize], owner: u32) -> Result<Self> {
        let storage = dtype.storage().ok_or(Error::UnsupportedType(dtype))?;
        let header = SegmentHeader::new(dtype, storage, shape, owner);
        let size = DATA_OFFSET + header.len as usize * storage.size();
        let mut shm = SharedMemory::create(name, size)?;

        unsafe {
            *(shm.as_mut_ptr() as *mut SegmentHeader) = header;
        }

        Ok(Self {
            shm,
            header,
            dtype,
            storage,
            shape: shape.to_vec(),
        })
    }

    /// Open an existing segment by name, reading its header
    pub fn open(name: &str) -> Result<Self> {
        let shm = SharedMemory::open(name)?;
        if shm.size() < DATA_OFFSET {
            return Err(Error::CorruptHandle(format!(
                "segment {} is {} bytes, smaller than its header",
                name,
                shm.size()
            )));
        }

        let header = unsafe { *(shm.as_ptr() as *const SegmentHeader) };
        header.validate()?;

        let buffer = Self {
            dtype: header.dtype()?,
            storage: header.storage()?,
            shape: header.shape(),
            shm,
            header,
        };
        buffer.check_len()?;
        Ok(buffer)
    }

    /// Open the segment a handle describes, checking the handle against it
    pub fn attach(handle: &SharedHandle) -> Result<Self> {
        let buffer = Self::open(&handle.name)?;
        let expected = buffer.handle();
        if &expected != handle {
            return Err(Error::CorruptHandle(format!(
                "handle {:?} disagrees with segment header {:?}",
                handle, expected
            )));
        }
        Ok(buffer)
    }

    pub fn name(&self) -> &str {
        self.shm.name()
    }

    /// Logical element type
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Primitive type of the payload
    pub fn storage(&self) -> DType {
        self.storage
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn complex_packing(&self) -> bool {
        self.header.complex_packing()
    }

    /// Payload length in primitives
    pub fn len(&self) -> usize {
        self.header.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.len == 0
    }

    /// Process that exported the segment
    pub fn owner(&self) -> u32 {
        self.header.owner
    }

    pub fn handle(&self) -> SharedHandle {
        SharedHandle {
            name: self.name().to_string(),
            dtype: self.dtype(),
            shape: self.shape.clone(),
            complex_packing: self.complex_packing(),
            len: self.header.len,
            owner: self.header.owner,
        }
    }

    /// Check `len == product(shape) * (2 if complex packing else 1)` and that
    /// the segment holds that many primitives. Returns the element count.
    pub(crate) fn check_len(&self) -> Result<usize> {
        let factor = if self.complex_packing() { 2 } else { 1 };
        let overflow = || {
            Error::CorruptHandle(format!(
                "segment {} declares shape {:?} with {} primitives, which overflows",
                self.name(),
                self.shape,
                self.header.len
            ))
        };

        let count = element_count(&self.shape).ok_or_else(overflow)?;
        let expected = count.checked_mul(factor).ok_or_else(overflow)?;
        if self.header.len != expected as u64 {
            return Err(Error::CorruptHandle(format!(
                "segment {} declares {} elements, shape {:?} needs {}",
                self.name(),
                self.header.len,
                self.shape,
                expected
            )));
        }
        let needed = expected
            .checked_mul(self.storage().size())
            .and_then(|bytes| bytes.checked_add(DATA_OFFSET))
            .ok_or_else(overflow)?;
        if self.shm.size() < needed {
            return Err(Error::CorruptHandle(format!(
                "segment {} is {} bytes, payload needs {}",
                self.name(),
                self.shm.size(),
                needed
            )));
        }
        Ok(count)
    }

    /// Payload reinterpreted as `count` values of `T`
    ///
    /// # Safety
    ///
    /// `T` must match the stored primitive layout and `count * size_of::<T>()`
    /// must not exceed the payload.
    pub(crate) unsafe fn payload<T>(&self, count: usize) -> &[T] {
        let ptr = self.shm.as_ptr().add(DATA_OFFSET) as *const T;
        debug_assert_eq!(ptr as usize % std::mem::align_of::<T>(), 0);
        std::slice::from_raw_parts(ptr, count)
    }

    /// # Safety
    ///
    /// Same requirements as [`SharedBuffer::payload`].
    pub(crate) unsafe fn payload_mut<T>(&mut self, count: usize) -> &mut [T] {
        let ptr = self.shm.as_mut_ptr().add(DATA_OFFSET) as *mut T;
        debug_assert_eq!(ptr as usize % std::mem::align_of::<T>(), 0);
        std::slice::from_raw_parts_mut(ptr, count)
    }

    /// Unlink the segment. Other processes keep their mappings until they drop them.
    pub fn release(self) {
        self.shm.unlink();
    }
}

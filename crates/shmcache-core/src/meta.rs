//! Segment header layout

use crate::dtype::DType;
use crate::{Error, Result};

/// Maximum number of dimensions
pub const MAX_NDIM: usize = 8;

pub(crate) const MAGIC: u32 = 0x4444_4653; // "DDFS"
pub(crate) const VERSION: u32 = 1;

/// Offset of the payload from the start of a segment
pub const DATA_OFFSET: usize = 128;

/// Header written at the start of every exported segment
///
/// Written once by the exporter before the segment name is handed out, read
/// by every importer. Plain fields, no atomics: nobody mutates it afterwards.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SegmentHeader {
    /// Magic number for validation
    pub magic: u32,
    /// Layout version
    pub version: u32,
    /// Logical element type
    pub dtype: u8,
    /// Primitive the payload is stored as
    pub storage: u8,
    /// 1 if complex values are interleaved real/imaginary pairs
    pub complex_packing: u8,
    /// Number of dimensions
    pub ndim: u8,
    /// Process that exported the segment
    pub owner: u32,
    /// Payload length in primitives
    pub len: u64,
    /// Shape (up to 8 dimensions)
    pub shape: [u64; MAX_NDIM],
}

const _: () = assert!(std::mem::size_of::<SegmentHeader>() <= DATA_OFFSET);

impl SegmentHeader {
    /// Size of SegmentHeader in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(dtype: DType, storage: DType, shape: &[usize], owner: u32) -> Self {
        let mut dims = [0u64; MAX_NDIM];
        for (slot, &dim) in dims.iter_mut().zip(shape) {
            *slot = dim as u64;
        }
        let count: usize = shape.iter().product();
        Self {
            magic: MAGIC,
            version: VERSION,
            dtype: dtype as u8,
            storage: storage as u8,
            complex_packing: dtype.is_complex() as u8,
            ndim: shape.len() as u8,
            owner,
            len: (count * dtype.packing_factor()) as u64,
            shape: dims,
        }
    }

    pub fn dtype(&self) -> Result<DType> {
        DType::from_u8(self.dtype)
            .ok_or_else(|| Error::CorruptHandle(format!("unknown dtype tag {}", self.dtype)))
    }

    pub fn storage(&self) -> Result<DType> {
        DType::from_u8(self.storage)
            .ok_or_else(|| Error::CorruptHandle(format!("unknown storage tag {}", self.storage)))
    }

    pub fn complex_packing(&self) -> bool {
        self.complex_packing != 0
    }

    pub fn shape(&self) -> Vec<usize> {
        let ndim = (self.ndim as usize).min(MAX_NDIM);
        self.shape[..ndim].iter().map(|&d| d as usize).collect()
    }

    /// Check magic, version and tags
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::CorruptHandle("invalid magic number".to_string()));
        }
        if self.version != VERSION {
            return Err(Error::CorruptHandle(format!(
                "version mismatch: expected {}, got {}",
                VERSION, self.version
            )));
        }
        if self.ndim as usize > MAX_NDIM {
            return Err(Error::CorruptHandle(format!("{} axes", self.ndim)));
        }
        let dtype = self.dtype()?;
        if dtype.storage() != Some(self.storage()?) {
            return Err(Error::CorruptHandle(format!(
                "{:?} cannot be stored as {:?}",
                dtype,
                self.storage()?
            )));
        }
        if dtype.is_complex() != self.complex_packing() {
            return Err(Error::CorruptHandle(format!(
                "packing flag disagrees with {:?}",
                dtype
            )));
        }
        Ok(())
    }
}

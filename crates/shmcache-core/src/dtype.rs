//! Data type definitions

use serde::{Deserialize, Serialize};

/// Element types an [`Array`](crate::Array) can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DType {
    UInt8 = 0,
    Int8 = 1,
    UInt16 = 2,
    Int16 = 3,
    UInt32 = 4,
    Int32 = 5,
    UInt64 = 6,
    Int64 = 7,
    Float32 = 9,
    Float64 = 10,
    Bool = 11,
    Complex64 = 12,
    Complex128 = 13,
}

impl DType {
    /// Size in bytes of one element
    pub const fn size(&self) -> usize {
        match self {
            DType::UInt8 | DType::Int8 | DType::Bool => 1,
            DType::UInt16 | DType::Int16 => 2,
            DType::UInt32 | DType::Int32 | DType::Float32 => 4,
            DType::UInt64 | DType::Int64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }

    /// Primitive type a segment stores this element type as.
    ///
    /// Complex types map to their real component type (two primitives per
    /// element), booleans to one byte. `None` means the type cannot be
    /// exported.
    pub const fn storage(&self) -> Option<DType> {
        match self {
            DType::Float32 | DType::Complex64 => Some(DType::Float32),
            DType::Float64 | DType::Complex128 => Some(DType::Float64),
            DType::Int32 => Some(DType::Int32),
            DType::Bool => Some(DType::UInt8),
            _ => None,
        }
    }

    /// Primitives per element once stored
    pub const fn packing_factor(&self) -> usize {
        if self.is_complex() {
            2
        } else {
            1
        }
    }

    /// Convert from u8
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(DType::UInt8),
            1 => Some(DType::Int8),
            2 => Some(DType::UInt16),
            3 => Some(DType::Int16),
            4 => Some(DType::UInt32),
            5 => Some(DType::Int32),
            6 => Some(DType::UInt64),
            7 => Some(DType::Int64),
            9 => Some(DType::Float32),
            10 => Some(DType::Float64),
            11 => Some(DType::Bool),
            12 => Some(DType::Complex64),
            13 => Some(DType::Complex128),
            _ => None,
        }
    }
}

//! Typed row-major arrays and borrowed views
//!
//! Complex element types follow the array-library naming: `Complex64` holds
//! two `f32` components, `Complex128` two `f64` components.

use crate::dtype::DType;
use crate::meta::MAX_NDIM;
use crate::{Error, Result};
use num_complex::{Complex32, Complex64};
use std::fmt;

/// Scalar types that can be stored in an [`Array`]
pub trait Element: Copy + PartialEq + fmt::Debug + 'static {
    const DTYPE: DType;

    fn wrap(values: Vec<Self>) -> ArrayData;

    fn slice<'a>(data: &ViewData<'a>) -> Option<&'a [Self]>;
}

macro_rules! array_types {
    ($($variant:ident => $t:ty),* $(,)?) => {
        /// Owned element storage
        #[derive(Debug, Clone, PartialEq)]
        pub enum ArrayData {
            $($variant(Vec<$t>)),*
        }

        /// Borrowed element storage
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum ViewData<'a> {
            $($variant(&'a [$t])),*
        }

        impl ArrayData {
            pub fn dtype(&self) -> DType {
                match self {
                    $(ArrayData::$variant(_) => DType::$variant),*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(ArrayData::$variant(v) => v.len()),*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn view(&self) -> ViewData<'_> {
                match self {
                    $(ArrayData::$variant(v) => ViewData::$variant(v.as_slice())),*
                }
            }
        }

        impl<'a> ViewData<'a> {
            pub fn dtype(&self) -> DType {
                match self {
                    $(ViewData::$variant(_) => DType::$variant),*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(ViewData::$variant(s) => s.len()),*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn to_owned(&self) -> ArrayData {
                match self {
                    $(ViewData::$variant(s) => ArrayData::$variant(s.to_vec())),*
                }
            }
        }

        $(
            impl Element for $t {
                const DTYPE: DType = DType::$variant;

                fn wrap(values: Vec<Self>) -> ArrayData {
                    ArrayData::$variant(values)
                }

                fn slice<'a>(data: &ViewData<'a>) -> Option<&'a [Self]> {
                    match *data {
                        ViewData::$variant(s) => Some(s),
                        _ => None,
                    }
                }
            }
        )*
    };
}

array_types! {
    UInt8 => u8,
    Int8 => i8,
    UInt16 => u16,
    Int16 => i16,
    UInt32 => u32,
    Int32 => i32,
    UInt64 => u64,
    Int64 => i64,
    Float32 => f32,
    Float64 => f64,
    Bool => bool,
    Complex64 => Complex32,
    Complex128 => Complex64,
}

/// Number of elements described by a shape, `None` on overflow
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

pub(crate) fn validate_shape(shape: &[usize], len: usize) -> Result<()> {
    if shape.len() > MAX_NDIM {
        return Err(Error::InvalidShape(format!(
            "{} axes exceeds the maximum of {}",
            shape.len(),
            MAX_NDIM
        )));
    }
    if shape.contains(&0) {
        return Err(Error::InvalidShape(format!("{:?} has an empty axis", shape)));
    }
    let count = element_count(shape)
        .ok_or_else(|| Error::InvalidShape(format!("{:?} overflows the address space", shape)))?;
    if count != len {
        return Err(Error::InvalidShape(format!(
            "shape {:?} holds {} elements, data has {}",
            shape, count, len
        )));
    }
    Ok(())
}

/// Owned n-dimensional array in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    shape: Vec<usize>,
    data: ArrayData,
}

impl Array {
    pub fn from_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Self> {
        Self::from_data(shape, T::wrap(values))
    }

    pub fn from_data(shape: &[usize], data: ArrayData) -> Result<Self> {
        validate_shape(shape, data.len())?;
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data.view())
    }

    /// Borrow as a view without copying
    pub fn view(&self) -> ArrayView<'_> {
        ArrayView {
            shape: self.shape.clone(),
            data: self.data.view(),
        }
    }
}

/// Borrowed n-dimensional array, either over local memory or a shared segment
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayView<'a> {
    shape: Vec<usize>,
    data: ViewData<'a>,
}

impl<'a> ArrayView<'a> {
    pub(crate) fn new(shape: Vec<usize>, data: ViewData<'a>) -> Self {
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> ViewData<'a> {
        self.data
    }

    pub fn as_slice<T: Element>(&self) -> Option<&'a [T]> {
        T::slice(&self.data)
    }

    /// Element at a multi-dimensional index
    pub fn get<T: Element>(&self, index: &[usize]) -> Option<T> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        self.as_slice::<T>()?.get(offset).copied()
    }

    /// Copy into an owned array
    pub fn to_owned(&self) -> Array {
        Array {
            shape: self.shape.clone(),
            data: self.data.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_checks_shape() {
        assert!(Array::from_vec(&[2, 3], vec![0.0f64; 6]).is_ok());
        assert!(matches!(
            Array::from_vec(&[2, 3], vec![0.0f64; 5]),
            Err(Error::InvalidShape(_))
        ));
        assert!(matches!(
            Array::from_vec(&[0, 3], Vec::<f64>::new()),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn too_many_axes_rejected() {
        let shape = [1usize; MAX_NDIM + 1];
        assert!(matches!(
            Array::from_vec(&shape, vec![1i32]),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn element_count_detects_overflow() {
        assert_eq!(element_count(&[2, 3, 4]), Some(24));
        assert_eq!(element_count(&[]), Some(1));
        assert_eq!(element_count(&[1 << 62, 8]), None);
        assert!(matches!(
            Array::from_vec(&[usize::MAX, 2], vec![0u8; 2]),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn dtype_follows_element() {
        let a = Array::from_vec(&[2], vec![Complex32::new(1.0, 2.0); 2]).unwrap();
        assert_eq!(a.dtype(), DType::Complex64);
        let b = Array::from_vec(&[1], vec![true]).unwrap();
        assert_eq!(b.dtype(), DType::Bool);
    }

    #[test]
    fn view_indexes_row_major() {
        let a = Array::from_vec(&[2, 3], vec![0i32, 1, 2, 3, 4, 5]).unwrap();
        let v = a.view();
        assert_eq!(v.get::<i32>(&[0, 2]), Some(2));
        assert_eq!(v.get::<i32>(&[1, 0]), Some(3));
        assert_eq!(v.get::<i32>(&[2, 0]), None);
        assert_eq!(v.get::<f32>(&[0, 0]), None);
        assert_eq!(v.to_owned(), a);
    }

    #[test]
    fn local_view_borrows_same_memory() {
        let a = Array::from_vec(&[4], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let owned = a.as_slice::<f32>().unwrap();
        let viewed = a.view().as_slice::<f32>().unwrap();
        assert_eq!(owned.as_ptr(), viewed.as_ptr());
    }
}

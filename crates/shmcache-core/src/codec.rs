//! Export of arrays into shared segments and import back into views

use crate::address::{Address, DEFAULT_SEGMENT_PREFIX};
use crate::array::{Array, ArrayData, ArrayView, ViewData};
use crate::buffer::{Buffer, SharedBuffer};
use crate::config::StoreConfig;
use crate::dtype::DType;
use crate::registry::SegmentRegistry;
use crate::{Error, Result};
use num_complex::{Complex, Complex32, Complex64};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One element of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot<T> {
    Empty,
    Single(T),
    Pair(T, T),
}

impl<T> Slot<T> {
    pub fn as_ref(&self) -> Slot<&T> {
        match self {
            Slot::Empty => Slot::Empty,
            Slot::Single(a) => Slot::Single(a),
            Slot::Pair(a, b) => Slot::Pair(a, b),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Slot<U> {
        match self {
            Slot::Empty => Slot::Empty,
            Slot::Single(a) => Slot::Single(f(a)),
            Slot::Pair(a, b) => Slot::Pair(f(a), f(b)),
        }
    }

    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(T) -> std::result::Result<U, E>,
    ) -> std::result::Result<Slot<U>, E> {
        Ok(match self {
            Slot::Empty => Slot::Empty,
            Slot::Single(a) => Slot::Single(f(a)?),
            Slot::Pair(a, b) => Slot::Pair(f(a)?, f(b)?),
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

impl<T> From<Option<T>> for Slot<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Slot::Empty, Slot::Single)
    }
}

fn interleave<T: Copy>(out: &mut [T], values: &[Complex<T>]) {
    for (pair, value) in out.chunks_exact_mut(2).zip(values) {
        pair[0] = value.re;
        pair[1] = value.im;
    }
}

/// Moves arrays into and out of shared segments owned by one process
pub struct SharedBufferCodec {
    owner: u32,
    prefix: String,
    registry: Arc<dyn SegmentRegistry>,
}

impl SharedBufferCodec {
    /// Codec owned by the current process with the default `ddf` prefix
    pub fn new(registry: Arc<dyn SegmentRegistry>) -> Self {
        Self::with_owner(std::process::id(), DEFAULT_SEGMENT_PREFIX, registry)
    }

    pub fn with_owner(
        owner: u32,
        prefix: impl Into<String>,
        registry: Arc<dyn SegmentRegistry>,
    ) -> Self {
        Self {
            owner,
            prefix: prefix.into(),
            registry,
        }
    }

    pub fn from_config(config: &StoreConfig, registry: Arc<dyn SegmentRegistry>) -> Self {
        Self::with_owner(std::process::id(), config.segment_prefix.clone(), registry)
    }

    pub fn owner(&self) -> u32 {
        self.owner
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &Arc<dyn SegmentRegistry> {
        &self.registry
    }

    pub fn segment_name(&self, address: &Address) -> String {
        address.segment_name(&self.prefix, self.owner)
    }

    /// Copy `array` into a new segment named after `address`
    ///
    /// Complex arrays are stored as interleaved real/imaginary pairs of the
    /// component type: offset `2i` is the real part of element `i`, `2i + 1`
    /// its imaginary part.
    pub fn export(&self, address: &Address, array: &Array) -> Result<SharedBuffer> {
        let dtype = array.dtype();
        if dtype.storage().is_none() {
            return Err(Error::UnsupportedType(dtype));
        }

        let name = self.segment_name(address);
        let mut shared = SharedBuffer::create(&name, dtype, array.shape(), self.owner)?;
        let len = shared.len();

        // SAFETY: create() sized the payload for `len` primitives of the
        // storage type matched in each arm.
        unsafe {
            match array.data() {
                ArrayData::Float32(v) => shared.payload_mut::<f32>(len).copy_from_slice(v),
                ArrayData::Float64(v) => shared.payload_mut::<f64>(len).copy_from_slice(v),
                ArrayData::Int32(v) => shared.payload_mut::<i32>(len).copy_from_slice(v),
                ArrayData::Bool(v) => {
                    for (out, &b) in shared.payload_mut::<u8>(len).iter_mut().zip(v) {
                        *out = b as u8;
                    }
                }
                ArrayData::Complex64(v) => interleave(shared.payload_mut::<f32>(len), v),
                ArrayData::Complex128(v) => interleave(shared.payload_mut::<f64>(len), v),
                _ => {
                    shared.release();
                    return Err(Error::UnsupportedType(dtype));
                }
            }
        }

        self.registry.register(self.owner, &name);
        debug!(
            "exported {:?} {:?} to shared segment {} ({} elements)",
            dtype,
            array.shape(),
            name,
            len
        );
        Ok(shared)
    }

    /// Export an optional array; `None` becomes [`Slot::Empty`] without allocating
    pub fn export_slot(&self, address: &Address, array: Option<&Array>) -> Result<Slot<Buffer>> {
        match array {
            Some(array) => Ok(Slot::Single(Buffer::Shared(self.export(address, array)?))),
            None => Ok(Slot::Empty),
        }
    }

    /// Export a batch. Element `i` is named `address:slot_i`, pair members
    /// additionally `:part_0` and `:part_1`.
    pub fn export_batch(
        &self,
        address: &Address,
        items: &[Slot<&Array>],
    ) -> Result<Vec<Slot<Buffer>>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| -> Result<Slot<Buffer>> {
                let slot = address.clone().with("slot", i);
                Ok(match item {
                    Slot::Empty => Slot::Empty,
                    Slot::Single(a) => Slot::Single(Buffer::Shared(self.export(&slot, a)?)),
                    Slot::Pair(a, b) => Slot::Pair(
                        Buffer::Shared(self.export(&slot.clone().with("part", 0), a)?),
                        Buffer::Shared(self.export(&slot.with("part", 1), b)?),
                    ),
                })
            })
            .collect()
    }

    /// View a buffer as a typed array. Local arrays are borrowed as they are;
    /// shared buffers are viewed in place without allocating.
    pub fn import(buffer: &Buffer) -> Result<ArrayView<'_>> {
        match buffer {
            Buffer::Local(array) => Ok(array.view()),
            Buffer::Shared(shared) => view_shared(shared),
        }
    }

    pub fn import_batch(items: &[Slot<Buffer>]) -> Result<Vec<Slot<ArrayView<'_>>>> {
        items
            .iter()
            .map(|item| item.as_ref().try_map(Self::import))
            .collect()
    }

    /// Unlink a segment this codec exported
    pub fn release(&self, buffer: SharedBuffer) {
        self.registry.unregister(self.owner, buffer.name());
        debug!("released shared segment {}", buffer.name());
        buffer.release();
    }

    /// Unlink every segment of this codec's owner
    pub fn sweep(&self) -> Result<usize> {
        self.registry.sweep(self.owner)
    }
}

fn view_shared(shared: &SharedBuffer) -> Result<ArrayView<'_>> {
    let count = shared.check_len()?;
    let len = shared.len();

    // SAFETY: check_len() verified the segment holds `len` primitives of the
    // storage type, and num_complex::Complex is repr(C) so `count` complex
    // values occupy exactly those `len = 2 * count` components.
    let data = unsafe {
        match shared.dtype() {
            DType::Float32 => ViewData::Float32(shared.payload::<f32>(len)),
            DType::Float64 => ViewData::Float64(shared.payload::<f64>(len)),
            DType::Int32 => ViewData::Int32(shared.payload::<i32>(len)),
            DType::Complex64 => ViewData::Complex64(shared.payload::<Complex32>(count)),
            DType::Complex128 => ViewData::Complex128(shared.payload::<Complex64>(count)),
            DType::Bool => {
                let bytes = shared.payload::<u8>(len);
                if let Some(bad) = bytes.iter().find(|&&b| b > 1) {
                    return Err(Error::CorruptHandle(format!(
                        "segment {} holds byte {} in a boolean buffer",
                        shared.name(),
                        bad
                    )));
                }
                ViewData::Bool(std::slice::from_raw_parts(bytes.as_ptr() as *const bool, len))
            }
            other => {
                return Err(Error::CorruptHandle(format!(
                    "segment {} tagged with unexportable type {:?}",
                    shared.name(),
                    other
                )))
            }
        }
    };

    Ok(ArrayView::new(shared.shape().to_vec(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{SegmentHeader, DATA_OFFSET};
    use crate::registry::ProcessRegistry;
    use crate::shm::SharedMemory;
    use crate::DType;

    fn codec(tag: &str) -> SharedBufferCodec {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        let prefix = format!("shmcache{}{}", tag, ts);
        let registry = Arc::new(ProcessRegistry::new(prefix.clone()));
        SharedBufferCodec::with_owner(std::process::id(), prefix, registry)
    }

    fn complex_grid() -> Array {
        let values: Vec<Complex64> = (0..12)
            .map(|i| Complex64::new(i as f64 * 0.5, -(i as f64) - 0.25))
            .collect();
        Array::from_vec(&[3, 4], values).unwrap()
    }

    #[test]
    fn complex_export_interleaves() {
        let codec = codec("interleave");
        let array = complex_grid();
        let shared = codec.export(&Address::new("vis"), &array).unwrap();

        assert!(shared.complex_packing());
        assert_eq!(shared.len(), 24);
        assert_eq!(shared.storage(), DType::Float64);

        let raw = unsafe { shared.payload::<f64>(shared.len()) };
        let values = array.as_slice::<Complex64>().unwrap();
        for (i, value) in values.iter().enumerate() {
            assert_eq!(raw[2 * i], value.re);
            assert_eq!(raw[2 * i + 1], value.im);
        }

        codec.sweep().unwrap();
    }

    #[test]
    fn round_trip_supported_types() {
        let codec = codec("roundtrip");
        let arrays = vec![
            Array::from_vec(&[2, 3], vec![1.5f32, -2.0, 3.25, 0.0, 1e-7, 9.0]).unwrap(),
            Array::from_vec(&[5], vec![1.0f64, 2.0, f64::MAX, f64::MIN_POSITIVE, -0.0]).unwrap(),
            Array::from_vec(&[2, 2], vec![Complex32::new(1.0, -1.0); 4]).unwrap(),
            complex_grid(),
            Array::from_vec(&[2, 2, 1], vec![true, false, false, true]).unwrap(),
            Array::from_vec(&[3], vec![i32::MIN, 0, i32::MAX]).unwrap(),
        ];

        for (i, array) in arrays.iter().enumerate() {
            let address = Address::new("arr").with("i", i);
            let buffer = Buffer::Shared(codec.export(&address, array).unwrap());
            let view = SharedBufferCodec::import(&buffer).unwrap();
            assert_eq!(view.shape(), array.shape());
            assert_eq!(view.dtype(), array.dtype());
            assert_eq!(&view.to_owned(), array);
        }

        assert_eq!(codec.sweep().unwrap(), arrays.len());
    }

    #[test]
    fn unsupported_type_rejected_without_allocating() {
        let codec = codec("unsupported");
        let array = Array::from_vec(&[2], vec![1u16, 2]).unwrap();
        assert!(matches!(
            codec.export(&Address::new("u16"), &array),
            Err(Error::UnsupportedType(DType::UInt16))
        ));
        assert!(codec.registry().segments(codec.owner()).is_empty());
    }

    #[test]
    fn local_import_is_pass_through() {
        let array = Array::from_vec(&[3], vec![1i32, 2, 3]).unwrap();
        let ptr = array.as_slice::<i32>().unwrap().as_ptr();
        let buffer = Buffer::Local(array);
        let view = SharedBufferCodec::import(&buffer).unwrap();
        assert_eq!(view.as_slice::<i32>().unwrap().as_ptr(), ptr);
    }

    #[test]
    fn open_detects_length_mismatch() {
        let codec = codec("corrupt");
        let array = Array::from_vec(&[4], vec![1.0f32; 4]).unwrap();
        let shared = codec.export(&Address::new("bad"), &array).unwrap();
        let handle = shared.handle();

        // another mapping rewrites the declared length
        let mut raw = SharedMemory::open(shared.name()).unwrap();
        unsafe {
            (*(raw.as_mut_ptr() as *mut SegmentHeader)).len = 5;
        }
        drop(raw);

        assert!(matches!(
            SharedBuffer::open(&handle.name),
            Err(Error::CorruptHandle(_))
        ));
        assert!(matches!(
            SharedBuffer::attach(&handle),
            Err(Error::CorruptHandle(_))
        ));

        codec.sweep().unwrap();
    }

    #[test]
    fn import_rejects_invalid_bool_bytes() {
        let codec = codec("bool");
        let array = Array::from_vec(&[3], vec![true, false, true]).unwrap();
        let shared = codec.export(&Address::new("mask"), &array).unwrap();

        let mut raw = SharedMemory::open(shared.name()).unwrap();
        raw.as_mut_slice()[DATA_OFFSET + 1] = 7;
        drop(raw);

        let buffer = Buffer::Shared(shared);
        assert!(matches!(
            SharedBufferCodec::import(&buffer),
            Err(Error::CorruptHandle(_))
        ));

        codec.sweep().unwrap();
    }

    #[test]
    fn batch_preserves_heterogeneity() {
        let codec = codec("batch");
        let a = Array::from_vec(&[2], vec![1.0f32, 2.0]).unwrap();
        let b = Array::from_vec(&[2], vec![3i32, 4]).unwrap();
        let c = complex_grid();
        let items = vec![Slot::Single(&a), Slot::Empty, Slot::Pair(&b, &c)];

        let exported = codec.export_batch(&Address::new("batch"), &items).unwrap();
        assert!(matches!(exported[0], Slot::Single(Buffer::Shared(_))));
        assert!(exported[1].is_empty());
        match &exported[2] {
            Slot::Pair(Buffer::Shared(x), Buffer::Shared(y)) => {
                assert!(x.name().ends_with("batch:part_0:slot_2"));
                assert!(y.name().ends_with("batch:part_1:slot_2"));
            }
            _ => panic!("pair lost"),
        }

        let imported = SharedBufferCodec::import_batch(&exported).unwrap();
        let owned: Vec<Slot<Array>> = imported
            .into_iter()
            .map(|slot| slot.map(|view| view.to_owned()))
            .collect();
        assert_eq!(
            owned,
            vec![Slot::Single(a.clone()), Slot::Empty, Slot::Pair(b.clone(), c.clone())]
        );

        assert_eq!(codec.sweep().unwrap(), 3);
    }

    #[test]
    fn export_slot_none_is_empty_sentinel() {
        let codec = codec("slot");
        let slot = codec.export_slot(&Address::new("none"), None).unwrap();
        assert!(slot.is_empty());
        assert!(codec.registry().segments(codec.owner()).is_empty());
    }

    #[test]
    fn release_unregisters_and_unlinks() {
        let codec = codec("release");
        let array = Array::from_vec(&[1], vec![42i32]).unwrap();
        let shared = codec.export(&Address::new("one"), &array).unwrap();
        let name = shared.name().to_string();
        assert_eq!(codec.registry().segments(codec.owner()), vec![name.clone()]);

        codec.release(shared);
        assert!(codec.registry().segments(codec.owner()).is_empty());
        assert!(SharedBuffer::open(&name).is_err());
    }
}

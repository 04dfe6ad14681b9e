//! shmcache - Process-shared array exchange and hash-gated disk cache

pub mod address;
pub mod array;
pub mod buffer;
pub mod cache;
pub mod codec;
pub mod config;
pub mod dtype;
pub mod error;
pub mod meta;
pub mod registry;
pub mod shm;
pub mod storage;

pub use address::{Address, DEFAULT_SEGMENT_PREFIX};
pub use array::{Array, ArrayData, ArrayView, Element, ViewData};
pub use buffer::{Buffer, SharedBuffer, SharedHandle};
pub use cache::{CacheStore, CheckOutcome, EntryKind, EntryState};
pub use codec::{SharedBufferCodec, Slot};
pub use config::StoreConfig;
pub use dtype::DType;
pub use error::{Error, Result};
pub use meta::{SegmentHeader, MAX_NDIM};
pub use registry::{ProcessRegistry, SegmentRegistry};
pub use storage::StorageTier;

pub use num_complex::{Complex32, Complex64};

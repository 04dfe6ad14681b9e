//! Hash-gated disk cache
//!
//! A [`CacheStore`] manages one namespace directory. Each entry is a file or
//! directory named after its [`Address`], with a `.hash` sidecar holding the
//! descriptor it was computed from. Typical use:
//!
//! ```no_run
//! # use shmcache_core::{Address, CacheStore, EntryKind};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cache = CacheStore::open("/data/obs.ms.ddfcache", false)?;
//! let params = serde_json::json!({ "wmax": 25000, "nw": 101 });
//! let outcome = cache.check_validity("WTerm", &params, EntryKind::File, false)?;
//! if !outcome.valid {
//!     std::fs::write(&outcome.path, b"...")?;
//!     cache.commit("WTerm")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! `commit` must follow a successful write: the store cannot tell by itself
//! when the payload at the returned path is complete.

use crate::address::{Address, DEFAULT_SEGMENT_PREFIX};
use crate::config::StoreConfig;
use crate::storage::StorageTier;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension of descriptor sidecars
const HASH_EXT: &str = ".hash";

/// Whether an entry's content is a single file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Lifecycle of a checked entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Stored descriptor matched; nothing to write
    Valid,
    /// Content was reset; descriptor waits for `commit`
    Pending,
    /// Descriptor written by `commit`
    Committed,
}

/// Result of [`CacheStore::check_validity`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Content path to load from or write to
    pub path: PathBuf,
    /// `true` if the content can be reused
    pub valid: bool,
}

#[derive(Debug)]
struct StagedEntry {
    hash_path: PathBuf,
    descriptor: serde_json::Value,
    state: EntryState,
}

/// Disk cache namespace
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    prefix: String,
    owner: u32,
    staged: BTreeMap<String, StagedEntry>,
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(HASH_EXT);
    PathBuf::from(name)
}

/// Remove whatever is at `path`, recursively for directories
fn remove_path(path: &Path) -> Result<()> {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    removed.map_err(|source| Error::CacheDeleteFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a stored descriptor. Every failure is `HashUnreadable`.
fn read_hash<D: DeserializeOwned>(hash_path: &Path) -> Result<D> {
    let text = fs::read_to_string(hash_path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            debug!("cache hash {} missing", hash_path.display());
        } else {
            warn!("cache hash {} could not be read: {}", hash_path.display(), e);
        }
        Error::HashUnreadable {
            path: hash_path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    serde_json::from_str(&text).map_err(|e| Error::HashUnreadable {
        path: hash_path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_hash(hash_path: &Path, descriptor: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(descriptor)?;
    let mut tmp = OsString::from(hash_path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, text).map_err(|source| Error::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, hash_path).map_err(|source| Error::Io {
        path: hash_path.to_path_buf(),
        source,
    })
}

impl CacheStore {
    /// Open the namespace at `root`, creating it if needed
    ///
    /// With `reset`, the whole namespace is removed and recreated empty,
    /// which invalidates every entry in it.
    pub fn open(root: impl Into<PathBuf>, reset: bool) -> Result<Self> {
        let root = root.into();

        if root.is_dir() {
            if reset {
                info!(
                    "clearing cache {}, since we were asked to reset the cache",
                    root.display()
                );
                remove_path(&root)?;
                Self::create_root(&root)?;
            }
        } else {
            info!("cache directory {} does not exist, creating", root.display());
            Self::create_root(&root)?;
        }

        Ok(Self {
            root,
            prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            owner: std::process::id(),
            staged: BTreeMap::new(),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let store = Self::open(&config.cache_dir, config.reset)?;
        Ok(store.with_segment_prefix(config.segment_prefix.as_str()))
    }

    fn create_root(root: &Path) -> Result<()> {
        fs::create_dir_all(root).map_err(|source| Error::CacheRootUnavailable {
            path: root.to_path_buf(),
            source,
        })
    }

    pub fn with_segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Process id used in segment names, the current process by default
    pub fn with_owner(mut self, owner: u32) -> Self {
        self.owner = owner;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, address: &Address) -> PathBuf {
        address.path_in(&self.root)
    }

    pub fn hash_path(&self, address: &Address) -> PathBuf {
        sidecar_path(&self.entry_path(address))
    }

    /// `<prefix>.<pid>.<address>`
    pub fn segment_name(&self, address: &Address) -> String {
        address.segment_name(&self.prefix, self.owner)
    }

    pub fn shm_url(&self, address: &Address) -> String {
        self.url(address, StorageTier::Shm)
    }

    pub fn cache_url(&self, address: &Address) -> String {
        self.url(address, StorageTier::Disk)
    }

    pub fn url(&self, address: &Address, tier: StorageTier) -> String {
        match tier {
            StorageTier::Shm => format!("{}{}", tier.scheme(), self.segment_name(address)),
            StorageTier::Disk => format!("{}{}", tier.scheme(), self.entry_path(address).display()),
        }
    }

    /// Check whether the entry at `address` was produced from `descriptor`
    ///
    /// An invalid entry is cleared before returning: its sidecar is removed,
    /// a file entry is deleted, a directory entry is emptied. A directory
    /// entry always exists when this returns. The descriptor is staged and
    /// written to the sidecar by [`CacheStore::commit`].
    pub fn check_validity<D>(
        &mut self,
        address: impl Into<Address>,
        descriptor: &D,
        kind: EntryKind,
        force_reset: bool,
    ) -> Result<CheckOutcome>
    where
        D: Serialize + DeserializeOwned + PartialEq,
    {
        let address = address.into();
        let path = self.entry_path(&address);
        let hash_path = sidecar_path(&path);
        let staged = serde_json::to_value(descriptor)?;
        let key = address.to_string();
        // a failed reset below must not leave an earlier state behind
        self.staged.remove(&key);

        let existed = path.exists();
        if !existed && kind == EntryKind::Directory {
            create_dir(&path)?;
        }

        let reset = if force_reset {
            info!("cache element {} will be explicitly reset", path.display());
            true
        } else if !existed {
            debug!("cache element {} does not exist, will re-make", path.display());
            true
        } else {
            match read_hash::<D>(&hash_path) {
                Ok(stored) if stored == *descriptor => false,
                Ok(_) => {
                    debug!("cache hash {} does not match, will re-make", hash_path.display());
                    true
                }
                Err(e) => {
                    debug!("{}, will re-make", e);
                    true
                }
            }
        };

        if reset {
            remove_path(&hash_path)?;
            if existed {
                remove_path(&path)?;
                if kind == EntryKind::Directory {
                    create_dir(&path)?;
                }
            }
        }

        let state = if reset {
            EntryState::Pending
        } else {
            EntryState::Valid
        };
        self.staged.insert(
            key,
            StagedEntry {
                hash_path,
                descriptor: staged,
                state,
            },
        );

        Ok(CheckOutcome {
            path,
            valid: !reset,
        })
    }

    /// State of an entry since its last check, `None` if never checked
    pub fn state(&self, address: impl Into<Address>) -> Option<EntryState> {
        self.staged
            .get(&address.into().to_string())
            .map(|entry| entry.state)
    }

    /// Persist the staged descriptor of a pending entry
    ///
    /// Returns `true` if the sidecar was written. Entries found valid, or
    /// already committed, are left untouched.
    pub fn commit(&mut self, address: impl Into<Address>) -> Result<bool> {
        self.commit_key(&address.into().to_string())
    }

    fn commit_key(&mut self, key: &str) -> Result<bool> {
        let entry = self
            .staged
            .get_mut(key)
            .ok_or_else(|| Error::EntryNotChecked(key.to_string()))?;

        if entry.state != EntryState::Pending {
            return Ok(false);
        }

        write_hash(&entry.hash_path, &entry.descriptor)?;
        entry.state = EntryState::Committed;
        info!("writing cache hash {}", entry.hash_path.display());
        Ok(true)
    }

    /// Commit every pending entry. Returns how many sidecars were written.
    pub fn commit_all(&mut self) -> Result<usize> {
        let pending: Vec<String> = self
            .staged
            .iter()
            .filter(|(_, entry)| entry.state == EntryState::Pending)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &pending {
            self.commit_key(key)?;
        }
        Ok(pending.len())
    }
}

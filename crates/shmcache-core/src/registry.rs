//! Tracking of shared segments by owning process

use crate::shm;
use crate::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Records which segments belong to which process so they can be swept
pub trait SegmentRegistry: Send + Sync {
    fn register(&self, owner: u32, name: &str);

    fn unregister(&self, owner: u32, name: &str);

    /// Names currently recorded for `owner`
    fn segments(&self, owner: u32) -> Vec<String>;

    /// Unlink every segment of `owner`. Returns how many were removed.
    fn sweep(&self, owner: u32) -> Result<usize>;
}

/// In-process registry
///
/// On Linux the sweep also scans `/dev/shm` for `<prefix>.<owner>.` names,
/// which catches segments left by a crashed run of the same pid that this
/// registry never saw.
pub struct ProcessRegistry {
    prefix: String,
    segments: Mutex<HashMap<u32, BTreeSet<String>>>,
}

impl ProcessRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            segments: Mutex::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[cfg(target_os = "linux")]
    fn orphans(&self, owner: u32) -> Vec<String> {
        let marker = format!("{}.{}.", self.prefix, owner);
        match std::fs::read_dir("/dev/shm") {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.starts_with(&marker))
                .collect(),
            Err(e) => {
                warn!("cannot scan /dev/shm for orphaned segments: {}", e);
                Vec::new()
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn orphans(&self, _owner: u32) -> Vec<String> {
        Vec::new()
    }
}

impl SegmentRegistry for ProcessRegistry {
    fn register(&self, owner: u32, name: &str) {
        let mut segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
        segments.entry(owner).or_default().insert(name.to_string());
    }

    fn unregister(&self, owner: u32, name: &str) {
        let mut segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(names) = segments.get_mut(&owner) {
            names.remove(name);
            if names.is_empty() {
                segments.remove(&owner);
            }
        }
    }

    fn segments(&self, owner: u32) -> Vec<String> {
        let segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
        segments
            .get(&owner)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn sweep(&self, owner: u32) -> Result<usize> {
        let mut names: BTreeSet<String> = {
            let mut segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
            segments.remove(&owner).unwrap_or_default()
        };
        names.extend(self.orphans(owner));

        let mut removed = 0;
        let mut first_error = None;
        for name in names {
            match shm::unlink(&name) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("cannot sweep shared segment {}: {}", name, e);
                    // keep it recorded for a later sweep
                    self.register(owner, &name);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        debug!("swept {} shared segments of process {}", removed, owner);

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

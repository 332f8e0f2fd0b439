//! File descriptor cache (`SPEC_FULL.md` §1 supplement: fd-cache-style
//! serializer reuse).
//!
//! Grounded on `original_source/fd-cache/fd-cache.c`: handles are keyed by
//! (device, inode) rather than by path, since a path may be replaced on
//! disk while a consumer still holds it open. Concurrent callers asking
//! for the same file share one open fd, refcounted, closed only once the
//! last handle for that (device, inode) drops — no handle, no explicit
//! "put" call, the way `Recycled<T>` releases pooled objects on drop.

use crate::error::GraphError;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct FileKey {
    dev: u64,
    ino: u64,
}

struct CacheEntry {
    file: File,
    ref_count: u64,
}

struct Shared {
    cache: Mutex<HashMap<FileKey, CacheEntry>>,
}

/// A cache of open, read-only file descriptors shared across serializers
/// that may reopen the same backing file, deduplicating by (device, inode)
/// instead of by path so a process emitting many streams doesn't exhaust
/// its fd table.
#[derive(Clone)]
pub struct FdCache {
    shared: Arc<Shared>,
}

impl FdCache {
    pub fn new() -> Self {
        FdCache {
            shared: Arc::new(Shared {
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of distinct (device, inode) entries currently open.
    pub fn len(&self) -> usize {
        self.shared.cache.lock().expect("fd cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens (or reuses an already-open) read-only handle to `path`, keyed
    /// by the file's current device/inode pair. Each call bumps a
    /// refcount; the returned handle releases it on drop, closing the
    /// underlying fd only when the last handle for that (device, inode)
    /// goes away.
    pub fn get_handle(&self, path: impl AsRef<Path>) -> Result<FdHandle, GraphError> {
        let metadata = std::fs::metadata(path.as_ref())?;
        let key = FileKey {
            dev: metadata.dev(),
            ino: metadata.ino(),
        };
        let mut cache = self.shared.cache.lock().expect("fd cache lock poisoned");
        match cache.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                occupied.get_mut().ref_count += 1;
            }
            MapEntry::Vacant(vacant) => {
                let file = File::open(path.as_ref())?;
                vacant.insert(CacheEntry { file, ref_count: 1 });
            }
        }
        Ok(FdHandle {
            shared: self.shared.clone(),
            key,
        })
    }
}

impl Default for FdCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A refcounted handle into an [`FdCache`]. Dropping the last handle for a
/// given (device, inode) closes the underlying fd and removes the entry.
pub struct FdHandle {
    shared: Arc<Shared>,
    key: FileKey,
}

impl FdHandle {
    /// A duplicate fd for the cached file, for a caller that needs its own
    /// seek position (e.g. a packet reader running alongside others).
    pub fn try_clone(&self) -> Result<File, GraphError> {
        let cache = self.shared.cache.lock().expect("fd cache lock poisoned");
        let entry = cache
            .get(&self.key)
            .expect("handle outlives its cache entry");
        Ok(entry.file.try_clone()?)
    }
}

impl Drop for FdHandle {
    fn drop(&mut self) {
        let mut cache = self.shared.cache.lock().expect("fd cache lock poisoned");
        if let MapEntry::Occupied(mut occupied) = cache.entry(self.key) {
            let entry = occupied.get_mut();
            entry.ref_count -= 1;
            if entry.ref_count == 0 {
                occupied.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn concurrent_handles_to_the_same_file_share_one_cache_entry() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = FdCache::new();
        let a = cache.get_handle(tmp.path()).unwrap();
        let b = cache.get_handle(tmp.path()).unwrap();
        assert_eq!(cache.len(), 1);
        drop(a);
        assert_eq!(cache.len(), 1, "entry stays while b is still outstanding");
        drop(b);
        assert_eq!(cache.len(), 0, "last handle drop removes the entry");
    }

    #[test]
    fn distinct_files_get_distinct_entries() {
        let a = NamedTempFile::new().unwrap();
        let b = NamedTempFile::new().unwrap();
        let cache = FdCache::new();
        let _ha = cache.get_handle(a.path()).unwrap();
        let _hb = cache.get_handle(b.path()).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn try_clone_yields_an_independent_fd() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hello").unwrap();
        let cache = FdCache::new();
        let handle = cache.get_handle(tmp.path()).unwrap();
        let mut cloned = handle.try_clone().unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut cloned, &mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}

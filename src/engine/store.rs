// Segment store: deterministic on-disk layout for downloaded segments.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::task::{DownloadRequest, InstanceId};
use crate::error::{BridgeError, BridgeResult};

const SCRATCH_DIR: &str = "scratch";

pub struct SegmentStore {
    root: PathBuf,
    scratch_counter: AtomicU64,
    /// Everything created under `root`, purged on drop.
    created: Mutex<BTreeSet<PathBuf>>,
}

impl SegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch_counter: AtomicU64::new(0),
            created: Mutex::new(BTreeSet::new()),
        }
    }

    /// `<root>/<instance>/<capture_name>/<segment_name>`.
    ///
    /// Only the normal components of the names are used, so `..` or absolute
    /// names cannot escape the instance directory.
    pub fn path_for(&self, instance: InstanceId, capture_name: &str, segment_name: &str) -> PathBuf {
        let mut path = self.instance_dir(instance);
        push_normal(&mut path, capture_name);
        push_normal(&mut path, segment_name);
        path
    }

    pub fn instance_dir(&self, instance: InstanceId) -> PathBuf {
        self.root.join(instance.to_string())
    }

    /// Resolve the destination for `request`, create its parent directories and
    /// remove any stale file so the worker always writes a fresh file.
    pub fn prepare(&self, request: &DownloadRequest) -> BridgeResult<PathBuf> {
        if !has_normal(&request.segment_name) {
            return Err(BridgeError::InvalidArgument(format!(
                "segment name {:?} for instance {} has no file component",
                request.segment_name, request.instance
            )));
        }
        let path = self.path_for(request.instance, &request.capture_name, &request.segment_name);

        let parent = path
            .parent()
            .ok_or_else(|| BridgeError::Io(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent)
            .map_err(|e| BridgeError::Io(format!("create {}: {}", parent.display(), e)))?;
        self.created.lock().insert(self.instance_dir(request.instance));

        if path.is_dir() {
            return Err(BridgeError::Io(format!(
                "destination {} is a directory",
                path.display()
            )));
        }
        if path.exists() {
            debug!("removing stale segment {}", path.display());
            fs::remove_file(&path)
                .map_err(|e| BridgeError::Io(format!("remove stale {}: {}", path.display(), e)))?;
        }

        Ok(path)
    }

    /// A fresh path for a one-off fetch.
    pub fn scratch_path(&self) -> BridgeResult<PathBuf> {
        let dir = self.root.join(SCRATCH_DIR);
        fs::create_dir_all(&dir)
            .map_err(|e| BridgeError::Io(format!("create {}: {}", dir.display(), e)))?;

        let n = self.scratch_counter.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("fetch-{}.tmp", n));
        self.created.lock().insert(dir);
        Ok(path)
    }

    /// Best-effort removal of a partial or unwanted file.
    pub fn discard(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!("discarded {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to discard {}: {}", path.display(), e),
        }
    }
}

impl Drop for SegmentStore {
    fn drop(&mut self) {
        let created = std::mem::take(&mut *self.created.lock());
        for path in created {
            remove_tree(&path);
        }
    }
}

fn push_normal(path: &mut PathBuf, name: &str) {
    for component in Path::new(name).components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
}

fn has_normal(name: &str) -> bool {
    Path::new(name)
        .components()
        .any(|c| matches!(c, Component::Normal(_)))
}

fn remove_tree(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("cleanup of {} failed: {}", path.display(), e),
    }
}

//! Versioned model files behind an in-memory pointer.
//!
//! Every published model gets its own file, `model-<version>.npz`, and is
//! only ever made visible by renaming a fully written staging file into
//! place. Readers open files under the pointer's read lock, so a rotation can
//! remove a superseded file without pulling it from under a reader.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use log::{debug, info, warn};
use parking_lot::RwLock;

/// One immutable model file.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelVersion {
    pub version: u64,
    pub path: PathBuf,
}

struct Versions {
    current: Arc<ModelVersion>,
    candidate: Option<Arc<ModelVersion>>,
    next: u64,
}

/// The model files of a training session: the `current` model clients train
/// on and an optional `candidate` awaiting evaluation.
pub struct ArtifactStore {
    folder: PathBuf,
    versions: RwLock<Versions>,
    staged: AtomicU64,
}

impl ArtifactStore {
    /// Creates a store whose version 0 is a copy of `original`.
    ///
    /// # Arguments
    /// * `folder` - Where the versioned files live, created if missing.
    /// * `original` - The initial model, left untouched.
    pub fn seed<P: AsRef<Path>, Q: AsRef<Path>>(folder: P, original: Q) -> io::Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        fs::create_dir_all(&folder)?;

        let current = Arc::new(ModelVersion {
            version: 0,
            path: folder.join(Self::file_name(0)),
        });
        fs::copy(original, &current.path)?;
        info!(path:? = current.path; "seeded model store");

        Ok(Self {
            folder,
            versions: RwLock::new(Versions {
                current,
                candidate: None,
                next: 1,
            }),
            staged: AtomicU64::new(0),
        })
    }

    fn file_name(version: u64) -> String {
        format!("model-{version:05}.npz")
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// The model clients train on.
    pub fn current(&self) -> Arc<ModelVersion> {
        self.versions.read().current.clone()
    }

    /// The published model awaiting promotion, if any.
    pub fn candidate(&self) -> Option<Arc<ModelVersion>> {
        self.versions.read().candidate.clone()
    }

    /// The candidate if there is one, the current model otherwise.
    pub fn latest(&self) -> Arc<ModelVersion> {
        let versions = self.versions.read();
        versions
            .candidate
            .clone()
            .unwrap_or_else(|| versions.current.clone())
    }

    /// Opens the current model.
    pub fn open_current(&self) -> io::Result<File> {
        let versions = self.versions.read();
        File::open(&versions.current.path)
    }

    /// Opens the latest model, see `latest`.
    pub fn open_latest(&self) -> io::Result<File> {
        let versions = self.versions.read();
        let latest = versions.candidate.as_ref().unwrap_or(&versions.current);
        File::open(&latest.path)
    }

    /// A fresh path to write a model to before publishing it.
    pub fn stage(&self) -> PathBuf {
        let n = self.staged.fetch_add(1, Ordering::Relaxed);
        self.folder.join(format!("staging-{n}.tmp"))
    }

    /// Moves the fully written `staged` file into place as the new candidate.
    ///
    /// A candidate that was never promoted is replaced and its file removed.
    pub fn publish<P: AsRef<Path>>(&self, staged: P) -> io::Result<Arc<ModelVersion>> {
        let mut versions = self.versions.write();

        let published = Arc::new(ModelVersion {
            version: versions.next,
            path: self.folder.join(Self::file_name(versions.next)),
        });
        fs::rename(staged, &published.path)?;
        versions.next += 1;

        if let Some(stale) = versions.candidate.replace(published.clone()) {
            debug!(version = stale.version; "dropping unpromoted candidate");
            if let Err(e) = fs::remove_file(&stale.path) {
                warn!(path:? = stale.path; "leaving stale candidate behind: {e}");
            }
        }

        info!(version = published.version; "published candidate model");
        Ok(published)
    }

    /// Makes the candidate the current model and removes the superseded file.
    ///
    /// On error the current model and the candidate are left as they were.
    ///
    /// # Returns
    /// The new current model, `None` if there was no candidate.
    pub fn promote(&self) -> io::Result<Option<Arc<ModelVersion>>> {
        let mut versions = self.versions.write();
        let Some(candidate) = versions.candidate.clone() else {
            return Ok(None);
        };

        fs::remove_file(&versions.current.path)?;
        versions.current = candidate.clone();
        versions.candidate = None;
        drop(versions);

        info!(version = candidate.version; "promoted model");
        Ok(Some(candidate))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn read(mut file: File) -> String {
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.npz");
        fs::write(&original, "v0").unwrap();

        let store = ArtifactStore::seed(dir.path().join("model"), &original).unwrap();
        (dir, store)
    }

    fn publish(store: &ArtifactStore, contents: &str) -> Arc<ModelVersion> {
        let staged = store.stage();
        fs::write(&staged, contents).unwrap();
        store.publish(&staged).unwrap()
    }

    #[test]
    fn test_seed_copies_the_original() {
        let (dir, store) = store();

        assert_eq!(store.current().version, 0);
        assert_eq!(read(store.open_current().unwrap()), "v0");
        assert!(dir.path().join("original.npz").exists());
        assert!(store.candidate().is_none());
    }

    #[test]
    fn test_publish_then_promote() {
        let (_dir, store) = store();
        let v0 = store.current();

        let v1 = publish(&store, "v1");
        assert_eq!(v1.version, 1);
        assert_eq!(read(store.open_current().unwrap()), "v0");
        assert_eq!(read(store.open_latest().unwrap()), "v1");

        assert_eq!(store.promote().unwrap(), Some(v1.clone()));
        assert_eq!(store.current(), v1);
        assert_eq!(store.latest(), v1);
        assert!(!v0.path.exists());
        assert_eq!(store.promote().unwrap(), None);
    }

    #[test]
    fn test_open_file_survives_rotation() {
        let (_dir, store) = store();
        let reader = store.open_current().unwrap();

        publish(&store, "v1");
        store.promote().unwrap();

        assert_eq!(read(reader), "v0");
    }

    #[test]
    fn test_republish_replaces_stale_candidate() {
        let (_dir, store) = store();
        let stale = publish(&store, "v1");
        let fresh = publish(&store, "v2");

        assert!(!stale.path.exists());
        assert_eq!(store.candidate(), Some(fresh));
        assert_eq!(read(store.open_latest().unwrap()), "v2");
    }

    #[test]
    fn test_staging_paths_are_unique() {
        let (_dir, store) = store();
        assert_ne!(store.stage(), store.stage());
    }
}

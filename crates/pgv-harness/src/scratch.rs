//! Run-scoped scratch space with guaranteed cleanup.
//!
//! All temporary files live under `<root>/pgverify.<pid>` so concurrent runs
//! never collide. Removal happens on drop and tolerates targets that were
//! never created.

use pgv_error::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Remove a file, treating "not found" as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove a directory tree, treating "not found" as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// The per-run scratch directory.
///
/// Cleaned up on drop unless [`RunScratch::preserve`] was called.
#[derive(Debug)]
pub struct RunScratch {
    root: PathBuf,
    preserve: bool,
}

impl RunScratch {
    /// Create `<parent>/pgverify.<pid>` and its `data` subdirectory.
    pub fn create(parent: &Path) -> Result<Self> {
        let root = parent.join(format!("pgverify.{}", std::process::id()));
        fs::create_dir_all(root.join("data"))?;
        debug!(target: "pgv::scratch", root = %root.display(), "scratch created");
        Ok(Self {
            root,
            preserve: false,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the generated object content files.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Directory receiving exported PG archives.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.root.join("export")
    }

    /// A scoped file named `<stem>` inside the scratch root.
    #[must_use]
    pub fn file(&self, stem: &str) -> ScratchFile {
        ScratchFile::new(self.root.join(stem))
    }

    /// Keep the scratch tree on disk after the run.
    pub fn preserve(&mut self) {
        self.preserve = true;
    }
}

impl Drop for RunScratch {
    fn drop(&mut self) {
        if self.preserve {
            return;
        }
        if let Err(err) = remove_dir_if_exists(&self.root) {
            warn!(target: "pgv::scratch", root = %self.root.display(), %err, "scratch cleanup failed");
        }
    }
}

/// A temporary file path whose target is removed on drop.
///
/// The file itself is created lazily by whoever writes to the path.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the current contents so the next writer starts clean.
    pub fn clear(&self) -> io::Result<()> {
        remove_file_if_exists(&self.path)
    }

    /// Read the file, returning `None` if it was never created.
    pub fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = remove_file_if_exists(&self.path);
    }
}

/// A directory tree removed on drop (used for the export tree).
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = remove_dir_if_exists(&self.path);
    }
}

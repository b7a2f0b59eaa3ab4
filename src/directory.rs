//! Directory access capability
//!
//! Model discovery, assembly and downloads all go through a `DirectoryHandle`
//! rooted at the user-connected models folder. Handles are cheap to clone
//! (`Arc`) and a revoked permission is reported through `query_permission`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::{Result, WorkbenchError};

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry returned by `DirectoryHandle::entries`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Filesystem-access collaborator
pub trait DirectoryHandle: Send + Sync {
    /// Name of this directory (last path component)
    fn name(&self) -> &str;

    /// Whether read/write access is still granted
    fn query_permission(&self) -> bool {
        true
    }

    /// Resolve a direct child directory, optionally creating it
    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryHandle>>;

    /// List the entries of this directory
    fn entries(&self) -> Result<Vec<DirEntry>>;

    /// Read the full contents of a direct child file
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Create or overwrite a direct child file
    fn write_file(&self, name: &str, contents: &[u8]) -> Result<()>;
}

impl fmt::Debug for dyn DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("name", &self.name())
            .finish()
    }
}

/// Resolve a `/`-separated relative directory path from `root`
pub fn resolve_dir(
    root: &Arc<dyn DirectoryHandle>,
    relative: &str,
    create: bool,
) -> Result<Arc<dyn DirectoryHandle>> {
    let mut current = Arc::clone(root);
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        current = current.get_directory(segment, create)?;
    }
    Ok(current)
}

/// Split `a/b/file.bin` into (`a/b`, `file.bin`)
pub fn split_path(relative: &str) -> (&str, &str) {
    match relative.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", relative),
    }
}

/// Read a file addressed by a relative path
pub fn read_path(root: &Arc<dyn DirectoryHandle>, relative: &str) -> Result<Vec<u8>> {
    let (dir, file) = split_path(relative);
    resolve_dir(root, dir, false)?.read_file(file)
}

/// Write a file addressed by a relative path, creating parent directories
pub fn write_path(root: &Arc<dyn DirectoryHandle>, relative: &str, contents: &[u8]) -> Result<()> {
    let (dir, file) = split_path(relative);
    resolve_dir(root, dir, true)?.write_file(file, contents)
}

/// `DirectoryHandle` backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    path: PathBuf,
    name: String,
}

impl LocalDirectory {
    /// Open an existing directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(WorkbenchError::EntryNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(Self::at(path.to_path_buf()))
    }

    fn at(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { path, name }
    }

    /// Filesystem path of this directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wrap into a shareable handle
    pub fn into_handle(self) -> Arc<dyn DirectoryHandle> {
        Arc::new(self)
    }
}

impl DirectoryHandle for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_permission(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false)
    }

    fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryHandle>> {
        let path = self.path.join(name);
        if !path.is_dir() {
            if !create {
                return Err(WorkbenchError::EntryNotFound {
                    path: path.display().to_string(),
                });
            }
            fs::create_dir_all(&path).map_err(|e| WorkbenchError::DirectoryCreateError {
                path: path.clone(),
                source: e,
            })?;
        }
        Ok(Arc::new(Self::at(path)))
    }

    fn entries(&self) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.path).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| WorkbenchError::FileReadError {
                path: self.path.clone(),
                source: e.into(),
            })?;
            let kind = if entry.file_type().is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
            });
        }
        Ok(entries)
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path.join(name);
        if !path.is_file() {
            return Err(WorkbenchError::EntryNotFound {
                path: path.display().to_string(),
            });
        }
        fs::read(&path).map_err(|e| WorkbenchError::FileReadError { path, source: e })
    }

    fn write_file(&self, name: &str, contents: &[u8]) -> Result<()> {
        let path = self.path.join(name);
        fs::write(&path, contents).map_err(|e| WorkbenchError::FileWriteError { path, source: e })
    }
}

//! Filesystem blob store.
//!
//! Layout: `{root}/{container}/{blob name}` with `/` in blob names mapped to
//! subdirectories.
//!
//! Features:
//! - Atomic writes (write to a hidden `.partial` file, rename into place)
//! - Create-if-absent via exclusive file creation, used for claim leases
//! - In-progress `.partial` files are never listed

use super::storage::{validate_name, BlobInfo, BlobStore, StorageError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PARTIAL_SUFFIX: &str = ".partial";

/// Blob store rooted at a local directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf, StorageError> {
        validate_name(container)?;
        if container.contains('/') {
            return Err(StorageError::InvalidName {
                name: container.to_string(),
                reason: "container names cannot contain '/'".into(),
            });
        }
        Ok(self.root.join(container))
    }

    /// Directory of an existing container, or `ContainerNotFound`.
    fn existing_container(&self, container: &str) -> Result<PathBuf, StorageError> {
        let dir = self.container_dir(container)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StorageError::ContainerNotFound {
                container: container.to_string(),
            })
        }
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        let mut path = self.existing_container(container)?;
        path.extend(name.split('/'));
        Ok(path)
    }

    /// Write `data` to `path` atomically: write to .partial then rename.
    fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{file_name}{PARTIAL_SUFFIX}"));

        fs::write(&tmp_path, data).map_err(|e| io_err(&tmp_path, e))?;

        fs::rename(&tmp_path, path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            io_err(path, e)
        })
    }

    fn collect(dir: &Path, rel: &str, out: &mut Vec<BlobInfo>) -> Result<(), StorageError> {
        let entries = fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel_name = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };
            let file_type = entry.file_type().map_err(|e| io_err(&entry.path(), e))?;

            if file_type.is_dir() {
                Self::collect(&entry.path(), &rel_name, out)?;
            } else if !(name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)) {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                out.push(BlobInfo {
                    name: rel_name,
                    size,
                });
            }
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn ensure_container(&self, container: &str) -> Result<(), StorageError> {
        let dir = self.container_dir(container)?;
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        log::debug!("container ready: {}", dir.display());
        Ok(())
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<BlobInfo>, StorageError> {
        let dir = self.existing_container(container)?;
        let mut blobs = Vec::new();
        Self::collect(&dir, "", &mut blobs)?;
        blobs.retain(|b| b.name.starts_with(prefix));
        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(container, name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(container, name),
            _ => io_err(&path, e),
        })
    }

    fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.blob_path(container, name)?;
        Self::write_atomic(&path, data)?;
        log::debug!("put {container}/{name} ({} bytes)", data.len());
        Ok(())
    }

    fn put_if_absent(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
    ) -> Result<bool, StorageError> {
        let path = self.blob_path(container, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(io_err(&path, e)),
        };

        if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(io_err(&path, e));
        }
        Ok(true)
    }

    fn copy(&self, container: &str, source: &str, dest: &str) -> Result<(), StorageError> {
        let data = self.get(container, source)?;
        let dest_path = self.blob_path(container, dest)?;
        Self::write_atomic(&dest_path, &data)?;
        log::debug!("copied {container}/{source} -> {dest}");
        Ok(())
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        let path = self.blob_path(container, name)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(container, name),
            _ => io_err(&path, e),
        })
    }

    fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        Ok(self.blob_path(container, name)?.is_file())
    }
}

fn io_err(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        target: path.display().to_string(),
        source,
    }
}

fn not_found(container: &str, name: &str) -> StorageError {
    StorageError::BlobNotFound {
        container: container.to_string(),
        name: name.to_string(),
    }
}

//! In-memory blob store for tests and dry runs.

use super::storage::{validate_name, BlobInfo, BlobStore, StorageError};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

type Containers = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    containers: Mutex<Containers>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_container<T>(
        &self,
        container: &str,
        f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.lock();
        let blobs = guard
            .get_mut(container)
            .ok_or_else(|| StorageError::ContainerNotFound {
                container: container.to_string(),
            })?;
        f(blobs)
    }
}

fn not_found(container: &str, name: &str) -> StorageError {
    StorageError::BlobNotFound {
        container: container.to_string(),
        name: name.to_string(),
    }
}

impl BlobStore for MemoryBlobStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    fn ensure_container(&self, container: &str) -> Result<(), StorageError> {
        validate_name(container)?;
        self.lock().entry(container.to_string()).or_default();
        Ok(())
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<BlobInfo>, StorageError> {
        self.with_container(container, |blobs| {
            Ok(blobs
                .range(prefix.to_string()..)
                .take_while(|(name, _)| name.starts_with(prefix))
                .map(|(name, data)| BlobInfo {
                    name: name.clone(),
                    size: data.len() as u64,
                })
                .collect())
        })
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        self.with_container(container, |blobs| {
            blobs
                .get(name)
                .cloned()
                .ok_or_else(|| not_found(container, name))
        })
    }

    fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        self.with_container(container, |blobs| {
            blobs.insert(name.to_string(), data.to_vec());
            Ok(())
        })
    }

    fn put_if_absent(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
    ) -> Result<bool, StorageError> {
        validate_name(name)?;
        self.with_container(container, |blobs| {
            if blobs.contains_key(name) {
                return Ok(false);
            }
            blobs.insert(name.to_string(), data.to_vec());
            Ok(true)
        })
    }

    fn copy(&self, container: &str, source: &str, dest: &str) -> Result<(), StorageError> {
        validate_name(dest)?;
        self.with_container(container, |blobs| {
            let data = blobs
                .get(source)
                .cloned()
                .ok_or_else(|| not_found(container, source))?;
            blobs.insert(dest.to_string(), data);
            Ok(())
        })
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        self.with_container(container, |blobs| {
            blobs
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| not_found(container, name))
        })
    }

    fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        self.with_container(container, |blobs| Ok(blobs.contains_key(name)))
    }
}

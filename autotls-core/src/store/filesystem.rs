use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{EngineError, Result};

use super::{frame_with_expiry, unframe_with_expiry, LockTable, Store};

/// Filesystem-backed `Store`. Keys map to paths under `root` (hierarchical keys like
/// `certificates/example.com` become nested files); writes go through a temp file and a
/// rename so a reader never observes a partial write.
pub struct FilesystemStore {
  root: PathBuf,
  locks: Arc<LockTable>,
  _sweeper: tokio::task::JoinHandle<()>,
}

impl FilesystemStore {
  pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
    let root = root.into();
    fs::create_dir_all(&root)
      .await
      .map_err(|e| EngineError::StoreError(e.to_string()))?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let _ = fs::set_permissions(&root, std::fs::Permissions::from_mode(0o700)).await;
    }
    let sweep_root = root.clone();
    let sweeper = tokio::spawn(async move {
      loop {
        let interval = sweep_interval(&sweep_root).await;
        tokio::time::sleep(interval).await;
        sweep_expired(&sweep_root).await;
      }
    });
    Ok(Self {
      root,
      locks: Arc::new(LockTable::default()),
      _sweeper: sweeper,
    })
  }

  fn path_for(&self, key: &str) -> PathBuf {
    let mut path = self.root.clone();
    for segment in key.split('/') {
      path.push(segment);
    }
    path
  }
}

impl Drop for FilesystemStore {
  fn drop(&mut self) {
    self._sweeper.abort();
  }
}

/// Sweep cadence scales with disk fullness: a nearly-empty disk is swept rarely, a
/// nearly-full one is swept aggressively so expired entries free space promptly.
async fn sweep_interval(root: &Path) -> Duration {
  let used_fraction = disk_used_fraction(root).await.unwrap_or(0.0);
  if used_fraction < 0.20 {
    Duration::from_secs(600)
  } else if used_fraction < 0.60 {
    Duration::from_secs(300)
  } else if used_fraction < 0.80 {
    Duration::from_secs(120)
  } else {
    Duration::from_secs(15)
  }
}

#[cfg(unix)]
async fn disk_used_fraction(root: &Path) -> Option<f64> {
  let root = root.to_path_buf();
  tokio::task::spawn_blocking(move || {
    let stat = nix::sys::statvfs::statvfs(&root).ok()?;
    let total = stat.blocks() as f64;
    if total == 0.0 {
      return None;
    }
    let free = stat.blocks_available() as f64;
    Some(1.0 - (free / total))
  })
  .await
  .ok()
  .flatten()
}

#[cfg(not(unix))]
async fn disk_used_fraction(_root: &Path) -> Option<f64> {
  None
}

async fn sweep_expired(root: &Path) {
  let mut stack = vec![root.to_path_buf()];
  while let Some(dir) = stack.pop() {
    let Ok(mut entries) = fs::read_dir(&dir).await else {
      continue;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
      let path = entry.path();
      let Ok(file_type) = entry.file_type().await else {
        continue;
      };
      if file_type.is_dir() {
        stack.push(path);
        continue;
      }
      if let Ok(framed) = fs::read(&path).await {
        if unframe_with_expiry(&framed).is_err() {
          let _ = fs::remove_file(&path).await;
        }
      }
    }
  }
}

#[async_trait]
impl Store for FilesystemStore {
  async fn set_kv(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
    let path = self.path_for(key);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await.map_err(|e| EngineError::StoreError(e.to_string()))?;
    }
    let framed = frame_with_expiry(&value, ttl);
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &framed).await.map_err(|e| EngineError::StoreError(e.to_string()))?;
    fs::rename(&tmp_path, &path).await.map_err(|e| EngineError::StoreError(e.to_string()))?;
    Ok(())
  }

  async fn get_kv(&self, key: &str) -> Result<Vec<u8>> {
    let path = self.path_for(key);
    let framed = match fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(EngineError::NotFound),
      Err(e) => return Err(EngineError::StoreError(e.to_string())),
    };
    unframe_with_expiry(&framed)
  }

  async fn delete_kv(&self, key: &str) -> Result<()> {
    let path = self.path_for(key);
    match fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::NotFound),
      Err(e) => Err(EngineError::StoreError(e.to_string())),
    }
  }

  async fn lock_cert(&self, domain: &str, ttl: Duration) -> Result<bool> {
    Ok(self.locks.try_acquire(domain, ttl))
  }

  async fn unlock_cert(&self, domain: &str) -> Result<()> {
    self.locks.release(domain);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn temp_store() -> (FilesystemStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemStore::new(dir.path()).await.unwrap();
    (store, dir)
  }

  #[tokio::test]
  async fn set_then_get_round_trips_through_rename() {
    let (store, _dir) = temp_store().await;
    store.set_kv("certificates/example.com", b"cert-bytes".to_vec(), None).await.unwrap();
    assert_eq!(store.get_kv("certificates/example.com").await.unwrap(), b"cert-bytes");
  }

  #[tokio::test]
  async fn get_missing_key_is_not_found() {
    let (store, _dir) = temp_store().await;
    assert!(matches!(store.get_kv("nope").await, Err(EngineError::NotFound)));
  }

  #[tokio::test]
  async fn nested_keys_create_parent_directories() {
    let (store, _dir) = temp_store().await;
    store.set_kv("challenges/example.com_token123", b"key-auth".to_vec(), None).await.unwrap();
    assert_eq!(store.get_kv("challenges/example.com_token123").await.unwrap(), b"key-auth");
  }
}

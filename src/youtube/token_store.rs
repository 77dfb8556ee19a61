//! Persisted OAuth user token.
//!
//! The token file is only ever replaced whole: the new content goes to a
//! temp file in the same directory which is then renamed over the target.
//! An advisory `fs2` lock on a sibling `.lock` file serializes writers across
//! processes (daemon and `auth login` may run side by side).

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::AuthError;

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

/// Releases the advisory lock on drop.
struct StoreLockGuard {
    file: File,
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing usable is stored. An unreadable file is
    /// treated as absent so that a fresh authorization can replace it.
    pub fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read(&self.path)
            .map_err(|e| AuthError::Store(format!("read {}: {}", self.path.display(), e)))?;

        match serde_json::from_slice::<StoredToken>(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| AuthError::Store(format!("create {}: {}", dir.display(), e)))?;

        let _guard = self.lock()?;

        let json = serde_json::to_vec_pretty(token)
            .map_err(|e| AuthError::Store(format!("serialize token: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| AuthError::Store(format!("temp file in {}: {}", dir.display(), e)))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| AuthError::Store(format!("write token: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::Store(format!("chmod token: {}", e)))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| AuthError::Store(format!("replace {}: {}", self.path.display(), e)))?;

        debug!("Persisted OAuth token to {}", self.path.display());
        Ok(())
    }

    /// [`load`](Self::load) on the blocking pool.
    pub async fn load_async(&self) -> Result<Option<StoredToken>, AuthError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| AuthError::Store(format!("token store task: {}", e)))?
    }

    /// [`save`](Self::save) on the blocking pool. The file lock may be held
    /// by another process for a while.
    pub async fn save_async(&self, token: &StoredToken) -> Result<(), AuthError> {
        let store = self.clone();
        let token = token.clone();
        tokio::task::spawn_blocking(move || store.save(&token))
            .await
            .map_err(|e| AuthError::Store(format!("token store task: {}", e)))?
    }

    fn lock(&self) -> Result<StoreLockGuard, AuthError> {
        let lock_path = self.path.with_extension("lock");
        let file = File::create(&lock_path)
            .map_err(|e| AuthError::Store(format!("lock {}: {}", lock_path.display(), e)))?;
        file.lock_exclusive()
            .map_err(|e| AuthError::Store(format!("lock {}: {}", lock_path.display(), e)))?;
        Ok(StoreLockGuard { file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token(expires_in: i64, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "ya29.test".to_string(),
            refresh_token: refresh.map(String::from),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scope: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("nested/token.json"));
        let t = token(3600, Some("1//refresh"));
        store.save(&t).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, t);

        // Overwrite replaces the whole file
        let t2 = token(10, None);
        store.save(&t2).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), t2);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&token(3600, None)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, b"\x80\x04pickle").unwrap();
        let store = TokenStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_validity_margin() {
        assert!(token(3600, None).is_valid());
        assert!(!token(30, None).is_valid());
        assert!(!token(-10, None).is_valid());
        assert!(token(-10, Some("r")).can_refresh());
        assert!(!token(-10, Some("")).can_refresh());
    }

    #[tokio::test]
    async fn test_save_waiting_on_lock_leaves_runtime_free() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));

        // Another process holds the store lock for a while
        let held = File::create(dir.path().join("token.lock")).unwrap();
        held.lock_exclusive().unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(300));
            drop(held);
        });

        let started = std::time::Instant::now();
        let save = tokio::spawn({
            let store = store.clone();
            async move { store.save_async(&token(3600, None)).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(250));
        assert!(!save.is_finished());

        save.await.unwrap().unwrap();
        holder.join().unwrap();
        assert!(store.load_async().await.unwrap().is_some());
    }
}

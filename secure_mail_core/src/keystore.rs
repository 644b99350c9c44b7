//! 客户端本地密钥存储
//!
//! 每个身份一个 JSON 文件，保存 Base64 SPKI 公钥与 PKCS#8 私钥。
//! 私钥只写入本地，不经过任何网络接口。

use crate::error::{Error, Result};
use crate::keys::{KeyPair, KeyPairProvider};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct StoredKeys {
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "privateKey")]
    private_key: String,
}

/// 本地密钥存储
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, identity: &str) -> Result<PathBuf> {
        if identity.is_empty()
            || !identity
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidParam(format!(
                "Identity '{}' cannot be used as a key file name",
                identity
            )));
        }
        Ok(self.dir.join(format!("{}.keys.json", identity)))
    }

    /// 读取身份对应的密钥对，不存在时返回 `None`
    pub fn load(&self, identity: &str) -> Result<Option<KeyPair>> {
        let path = self.path_for(identity)?;
        if !path.exists() {
            return Ok(None);
        }

        debug!("Loading key pair from {}", path.display());
        let stored: StoredKeys = serde_json::from_slice(&fs::read(&path)?)?;
        let key_pair = KeyPairProvider::import_key_pair(&stored.public_key, &stored.private_key)?;
        Ok(Some(key_pair))
    }

    /// 保存密钥对，覆盖已有文件
    pub fn save(&self, identity: &str, key_pair: &KeyPair) -> Result<()> {
        let path = self.path_for(identity)?;
        fs::create_dir_all(&self.dir)?;

        let stored = StoredKeys {
            public_key: KeyPairProvider::export_public(&key_pair.public_key)?,
            private_key: KeyPairProvider::export_private(&key_pair.private_key)?,
        };
        let json = serde_json::to_vec_pretty(&stored)?;

        // 先写临时文件再改名，文件自创建起即仅属主可读
        let temp_path = temporary_path(&path);
        let mut file = open_owner_only(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &path)?;
        restrict_permissions(&path)?;

        debug!("Saved key pair to {}", path.display());
        Ok(())
    }

    /// 删除本地密钥
    pub fn remove(&self, identity: &str) -> Result<()> {
        let path = self.path_for(identity)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| format!("{}.tmp", value))
        .unwrap_or_else(|| "tmp".to_string());
    path.with_extension(extension)
}

fn open_owner_only(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;
    // 遗留的临时文件不会按 mode 重新创建
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::alice;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("keys"));
        assert_eq!(store.dir(), dir.path().join("keys"));

        assert!(store.load("alice").unwrap().is_none());
        store.save("alice", alice()).unwrap();
        assert!(store.dir().join("alice.keys.json").is_file());

        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded.public_key, alice().public_key);
        assert_eq!(loaded.private_key, alice().private_key);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        store.save("alice", alice()).unwrap();

        let mode = fs::metadata(dir.path().join("alice.keys.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_never_visible_wider_than_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let done = Arc::new(AtomicBool::new(false));

        let watcher = {
            let done = done.clone();
            let dir = dir.path().to_path_buf();
            std::thread::spawn(move || {
                let mut widest = 0o600;
                while !done.load(Ordering::Relaxed) {
                    let Ok(entries) = fs::read_dir(&dir) else { continue };
                    for entry in entries.flatten() {
                        // 临时文件可能刚被改名
                        if let Ok(meta) = entry.metadata() {
                            widest |= meta.permissions().mode() & 0o777;
                        }
                    }
                }
                widest
            })
        };

        for _ in 0..50 {
            store.save("alice", alice()).unwrap();
        }
        done.store(true, Ordering::Relaxed);

        let widest = watcher.join().unwrap();
        assert_eq!(widest & 0o077, 0, "key file visible with mode {:o}", widest);
        assert!(!dir.path().join("alice.keys.json.tmp").exists());
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        store.save("alice", alice()).unwrap();
        let before = fs::read(dir.path().join("alice.keys.json")).unwrap();

        // 临时路径被目录占据，打开失败
        fs::create_dir(dir.path().join("alice.keys.json.tmp")).unwrap();
        assert!(matches!(
            store.save("alice", crate::test_support::bob()),
            Err(Error::Io(_))
        ));

        let after = fs::read(dir.path().join("alice.keys.json")).unwrap();
        assert_eq!(before, after);
        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded.public_key, alice().public_key);
    }

    #[test]
    fn test_rejects_path_like_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        assert!(matches!(store.load("../etc"), Err(Error::InvalidParam(_))));
        assert!(matches!(store.load(""), Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        fs::write(dir.path().join("alice.keys.json"), b"{ not json").unwrap();
        assert!(matches!(store.load("alice"), Err(Error::Json(_))));
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        store.save("alice", alice()).unwrap();
        store.remove("alice").unwrap();
        assert!(store.load("alice").unwrap().is_none());
        store.remove("alice").unwrap();
    }
}

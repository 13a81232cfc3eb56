use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const IP_CACHE_FILE_NAME: &str = "ip-cache.json";

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct KvFile {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// 简单的持久化键值存储（JSON 文件），每次写入立即落盘。
/// `in_memory()` 构造的实例不落盘，用于测试。
#[derive(Debug)]
pub struct KvStore {
    path: Option<PathBuf>,
    inner: Mutex<KvFile>,
}

impl KvStore {
    pub fn load_or_init_at(base_dir: &Path) -> Result<Self> {
        Self::load_or_init_from_file(&Self::join_store_path(base_dir))
    }

    pub fn load_or_init_from_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let file = if path.exists() {
            let data =
                fs::read(path).with_context(|| format!("read ip cache: {}", path.display()))?;
            match serde_json::from_slice::<KvFile>(&data) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(
                        target = "ip_cache",
                        path = %path.display(),
                        error = %err,
                        "ip cache store corrupted, resetting"
                    );
                    KvFile::default()
                }
            }
        } else {
            let default = KvFile::default();
            Self::persist(Some(path), &default)?;
            default
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: Mutex::new(file),
        })
    }

    pub fn load_default() -> Result<Self> {
        let base = crate::core::config::loader::base_dir();
        Self::load_or_init_at(&base)
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(KvFile::default()),
        }
    }

    fn join_store_path(base_dir: &Path) -> PathBuf {
        let mut p = base_dir.to_path_buf();
        p.push("config");
        p.push(IP_CACHE_FILE_NAME);
        p
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.entries.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("ip cache store poisoned"))?;
        guard.entries.insert(key.to_string(), value.to_string());
        Self::persist(self.path.as_deref(), &guard)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("ip cache store poisoned"))?;
        if guard.entries.remove(key).is_some() {
            Self::persist(self.path.as_deref(), &guard)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(path: Option<&Path>, file: &KvFile) -> Result<()> {
        if let Some(path) = path {
            let json = serde_json::to_string_pretty(file).context("serialize ip cache")?;
            fs::write(path, json).with_context(|| format!("write ip cache: {}", path.display()))
        } else {
            Ok(())
        }
    }
}

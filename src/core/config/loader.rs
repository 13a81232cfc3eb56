//! `<base>/config/config.json` 的读取与落盘。
//!
//! base 默认是系统配置目录下的 `pixiv-direct`；测试可通过 [`testing`] 改写。

use anyhow::{Context, Result};
use dirs_next as dirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use super::model::AppConfig;

const APP_IDENTIFIER: &str = "pixiv-direct";
const CONFIG_DIR: &str = "config";
const CONFIG_FILE: &str = "config.json";

static BASE_OVERRIDE: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

fn base_override() -> &'static Mutex<Option<PathBuf>> {
    BASE_OVERRIDE.get_or_init(|| Mutex::new(None))
}

fn config_file_in(base: &Path) -> PathBuf {
    base.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// 配置基目录（`config/` 的上一级），ip-cache.json 也放在其下。
pub fn base_dir() -> PathBuf {
    let overridden = base_override().lock().ok().and_then(|g| g.clone());
    overridden
        .or_else(|| dirs::config_dir().map(|d| d.join(APP_IDENTIFIER)))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub mod testing {
    //! Testing-only helpers exposed to integration suites.
    use super::*;

    pub fn override_global_base_dir<P: AsRef<Path>>(base: P) {
        if let Ok(mut guard) = base_override().lock() {
            *guard = Some(base.as_ref().to_path_buf());
        }
    }

    pub fn clear_global_base_dir() {
        if let Ok(mut guard) = base_override().lock() {
            *guard = None;
        }
    }
}

pub fn load_or_init() -> Result<AppConfig> {
    load_or_init_at(&base_dir())
}

pub fn save(cfg: &AppConfig) -> Result<()> {
    save_at(cfg, &base_dir())
}

/// 文件不存在时写入默认配置并返回；存在但无法解析时报错（不覆盖用户文件）。
pub fn load_or_init_at(base_dir: &Path) -> Result<AppConfig> {
    let path = config_file_in(base_dir);
    if !path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg, &path)?;
        tracing::info!(target = "config", path = %path.display(), "default config created");
        return Ok(cfg);
    }
    let raw = fs::read(&path).with_context(|| format!("read config: {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse config: {}", path.display()))
}

pub fn save_at(cfg: &AppConfig, base_dir: &Path) -> Result<()> {
    write_config(cfg, &config_file_in(base_dir))
}

fn write_config(cfg: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create config dir: {}", dir.display()))?;
    }
    let json = serde_json::to_vec_pretty(cfg).context("serialize config")?;
    fs::write(path, json).with_context(|| format!("write config: {}", path.display()))?;
    tracing::info!(target = "config", path = %path.display(), "config saved");
    Ok(())
}

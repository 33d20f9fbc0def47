// 本地数据持久化服务
// 只在调用方显式要求时读写文件

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::APP_DIR;
use crate::models::AppSettings;
use crate::ssh::{HostKeyStore, KnownHostsFile};

use super::host_registry::HostRegistry;
use super::weak_keys::WeakKeyDatabase;

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/keyprobe
/// Linux: ~/.config/keyprobe
/// Windows: C:\Users\<用户名>\AppData\Roaming\keyprobe
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join(APP_DIR);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;
    }
    Ok(config_dir)
}

// ======================== Settings 配置持久化 ========================

/// 获取设置配置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("settings.json"))
}

/// 加载应用设置，文件不存在时返回默认值
pub fn load_settings() -> Result<AppSettings> {
    load_settings_from(&get_settings_file()?)
}

pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let content = fs::read_to_string(path).context("无法读取设置配置文件")?;
    let settings: AppSettings = serde_json::from_str(&content).context("无法解析设置配置文件")?;
    Ok(settings)
}

/// 保存应用设置
pub fn save_settings(settings: &AppSettings) -> Result<()> {
    save_settings_to(&get_settings_file()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings).context("无法序列化设置配置")?;
    fs::write(path, content).context("无法写入设置配置文件")?;
    Ok(())
}

// ======================== 由设置构建核心对象 ========================

/// 内置平台加上设置中的自定义平台
pub fn build_registry(settings: &AppSettings) -> Result<HostRegistry> {
    HostRegistry::with_custom(settings.hosts.clone()).context("自定义主机配置无效")
}

/// 内置弱密钥库加上设置中的外部库
pub fn build_weak_key_database(settings: &AppSettings) -> Result<WeakKeyDatabase> {
    let mut database = WeakKeyDatabase::builtin();
    if let Some(path) = &settings.weak_keys.database_path {
        let extra = WeakKeyDatabase::load(path)
            .with_context(|| format!("无法加载弱密钥库 {}", path.display()))?;
        database.extend(extra);
    }
    Ok(database)
}

// ======================== Known Hosts 持久化 ========================

/// Known Hosts 文件路径
pub fn get_known_hosts_file(settings: &AppSettings) -> Result<PathBuf> {
    match &settings.known_hosts.path {
        Some(path) => Ok(path.clone()),
        None => Ok(get_config_dir()?.join("known_hosts.json")),
    }
}

/// 构建主机公钥存储：未开启持久化时为空存储
pub fn load_host_key_store(settings: &AppSettings) -> Result<HostKeyStore> {
    if !settings.known_hosts.persist {
        return Ok(HostKeyStore::new());
    }
    load_known_hosts_from(&get_known_hosts_file(settings)?)
}

/// 开启持久化时保存主机公钥记录
pub fn save_host_key_store(settings: &AppSettings, store: &HostKeyStore) -> Result<()> {
    if !settings.known_hosts.persist {
        return Ok(());
    }
    save_known_hosts_to(&get_known_hosts_file(settings)?, store)
}

pub fn load_known_hosts_from(path: &Path) -> Result<HostKeyStore> {
    if !path.exists() {
        return Ok(HostKeyStore::new());
    }
    let content = fs::read_to_string(path).context("无法读取 Known Hosts 文件")?;
    let file: KnownHostsFile =
        serde_json::from_str(&content).context("无法解析 Known Hosts 文件")?;
    Ok(HostKeyStore::from_file(file))
}

pub fn save_known_hosts_to(path: &Path, store: &HostKeyStore) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("无法创建 Known Hosts 目录")?;
    }
    let content =
        serde_json::to_string_pretty(&store.to_file()).context("无法序列化 Known Hosts")?;
    fs::write(path, content).context("无法写入 Known Hosts 文件")?;
    Ok(())
}

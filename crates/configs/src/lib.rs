use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Callback identifiers resolvable by the action registry, keyed by identifier.
    #[serde(default)]
    pub actions: BTreeMap<String, ActionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_listeners_file")]
    pub listeners_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            data_dir: default_data_dir(),
            state_file: default_state_file(),
            listeners_file: default_listeners_file(),
        }
    }
}

fn default_data_dir() -> String { "data".into() }
fn default_state_file() -> String { "state.json".into() }
fn default_listeners_file() -> String { "listeners.json".into() }

/// What the dispatcher does when one callback fails.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and move on to the next callback.
    #[default]
    Continue,
    /// Stop the remaining callbacks for this change.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// No timeout when absent.
    #[serde(default)]
    pub callback_timeout_ms: Option<u64>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { failure_policy: FailurePolicy::Continue, callback_timeout_ms: None, max_depth: default_max_depth() }
    }
}

fn default_max_depth() -> usize { 8 }

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ActionConfig {
    /// Webhook target receiving `{action, key, value}` as JSON.
    pub url: String,
}

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Like [`AppConfig::load_and_validate`] but falls back to defaults when no config file exists.
    pub fn load_or_default() -> Result<Self> {
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(e) if e.downcast_ref::<std::io::Error>().is_some() => AppConfig::default(),
            Err(e) => return Err(e),
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        // 归一化 server
        self.server.normalize()?;
        // 归一化 storage（支持从环境变量覆盖数据目录）
        self.storage.normalize_from_env();
        self.storage.validate()?;
        self.dispatch.validate()?;
        for (id, action) in &self.actions {
            action.validate(id)?;
        }
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        if let Some(w) = self.worker_threads {
            if w == 0 { self.worker_threads = Some(4); }
        } else {
            self.worker_threads = Some(4);
        }
        Ok(())
    }
}

impl StorageConfig {
    pub fn normalize_from_env(&mut self) {
        if let Ok(dir) = std::env::var("STATE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = dir;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir is empty"));
        }
        if self.state_file.trim().is_empty() || self.listeners_file.trim().is_empty() {
            return Err(anyhow!("storage.state_file and storage.listeners_file must be set"));
        }
        if self.state_file == self.listeners_file {
            return Err(anyhow!("storage.state_file and storage.listeners_file must differ"));
        }
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.state_file)
    }

    pub fn listeners_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.listeners_file)
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(anyhow!("dispatch.max_depth must be >= 1"));
        }
        if self.callback_timeout_ms == Some(0) {
            return Err(anyhow!("dispatch.callback_timeout_ms must be a positive number of milliseconds"));
        }
        Ok(())
    }
}

impl ActionConfig {
    fn validate(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(anyhow!("actions: identifier must not be empty"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(anyhow!("actions.{id}.url must start with http:// or https://"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let mut cfg = load_from_str("").expect("parse");
        cfg.normalize_and_validate().expect("valid");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.backend, BackendKind::File);
        assert_eq!(cfg.dispatch.failure_policy, FailurePolicy::Continue);
        assert_eq!(cfg.dispatch.callback_timeout_ms, None);
        assert_eq!(cfg.dispatch.max_depth, 8);
        assert!(cfg.actions.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let src = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [storage]
            backend = "memory"
            data_dir = "/var/lib/state"

            [dispatch]
            failure_policy = "abort"
            callback_timeout_ms = 1500

            [actions."highlight.jump"]
            url = "http://localhost:7000/hooks/jump"
        "#;
        let mut cfg = load_from_str(src).expect("parse");
        cfg.normalize_and_validate().expect("valid");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.storage.backend, BackendKind::Memory);
        assert_eq!(cfg.storage.listeners_path(), PathBuf::from("/var/lib/state/listeners.json"));
        assert_eq!(cfg.dispatch.failure_policy, FailurePolicy::Abort);
        assert_eq!(cfg.dispatch.callback_timeout_ms, Some(1500));
        assert_eq!(cfg.actions["highlight.jump"].url, "http://localhost:7000/hooks/jump");
    }

    #[test]
    fn rejects_bad_values() {
        let mut same_files = load_from_str("[storage]\nstate_file = \"a.json\"\nlisteners_file = \"a.json\"").unwrap();
        assert!(same_files.normalize_and_validate().is_err());

        let mut bad_url = load_from_str("[actions.x]\nurl = \"ftp://nope\"").unwrap();
        assert!(bad_url.normalize_and_validate().is_err());

        let mut zero_depth = load_from_str("[dispatch]\nmax_depth = 0").unwrap();
        assert!(zero_depth.normalize_and_validate().is_err());
    }
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRIPMIND__*` 覆盖（双下划线表示嵌套，如 `TRIPMIND__STORE__BACKEND=sqlite`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// [app] 段：应用名、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 对话历史保留轮数
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    20
}

/// [planner] 段：并发步骤数与单步超时
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_concurrent_steps: default_max_concurrent_steps(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

fn default_max_concurrent_steps() -> usize {
    3
}

fn default_step_timeout_secs() -> u64 {
    15
}

/// [tools] 段：结果缓存
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 0 表示关闭缓存
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: Option<u64>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_capacity() -> usize {
    128
}

fn default_cache_ttl_secs() -> Option<u64> {
    Some(3600)
}

/// 会话存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// [store] 段：会话存储
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/threads.db")
}

/// 从 config 目录加载配置，环境变量 TRIPMIND__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRIPMIND__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRIPMIND")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录警告并回退到默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    match load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_context_turns, 20);
        assert_eq!(cfg.planner.max_concurrent_steps, 3);
        assert_eq!(cfg.planner.step_timeout_secs, 15);
        assert_eq!(cfg.tools.cache_capacity, 128);
        assert_eq!(cfg.tools.cache_ttl_secs, Some(3600));
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[planner]\nstep_timeout_secs = 5\n\n\
             [store]\nbackend = \"sqlite\"\ndb_path = \"/tmp/t.db\""
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.planner.step_timeout_secs, 5);
        assert_eq!(cfg.planner.max_concurrent_steps, 3);
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.store.db_path, PathBuf::from("/tmp/t.db"));
    }
}

//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 引擎运行配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// 默认是否记录逐条件评估追踪
    #[serde(default)]
    pub trace_evaluations: bool,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "rule-engine".to_string(),
            environment: "development".to_string(),
            observability: ObservabilityConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（SCREENING_ 前缀，双下划线分隔层级，如
    ///    SCREENING_OBSERVABILITY__LOG_LEVEL -> observability.log_level）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("SCREENING_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载
    pub fn load_from(service_name: &str, env: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // 默认配置
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            // 加载默认配置文件
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // 加载环境特定配置
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            // 加载服务特定配置
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 环境变量覆盖
            .add_source(
                Environment::with_prefix("SCREENING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.service_name, "rule-engine");
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.engine.trace_evaluations);
        assert!(!config.is_production());
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = std::env::temp_dir().join("screening-config-missing");
        let config = AppConfig::load_from("rule-lint", "test", &dir).unwrap();
        assert_eq!(config.service_name, "rule-lint");
        assert_eq!(config.environment, "test");
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_service_file_overrides_default_file() {
        let dir = std::env::temp_dir().join(format!("screening-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("default.toml"),
            "[observability]\nlog_level = \"warn\"\n\n[engine]\ntrace_evaluations = false\n",
        )
        .unwrap();
        fs::write(dir.join("rule-lint.toml"), "[engine]\ntrace_evaluations = true\n").unwrap();

        let config = AppConfig::load_from("rule-lint", "staging", &dir).unwrap();
        assert_eq!(config.observability.log_level, "warn");
        assert!(config.engine.trace_evaluations);

        fs::remove_dir_all(&dir).unwrap();
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// 清扫间隔（秒）
    pub sweep_interval_seconds: u64,
    /// 单次清扫处理的链数量上限
    pub batch_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// 日志级别，命令行 --log-level 优先
    pub log_level: String,
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sweeper: SweeperConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/symphonia".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            sweeper: SweeperConfig {
                enabled: true,
                sweep_interval_seconds: 60,
                batch_size: 100,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_enabled: true,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置：TOML文件 + SYMPHONIA_ 前缀的环境变量覆盖
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/symphonia.toml",
                "symphonia.toml",
                "/etc/symphonia/dispatch.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        let defaults = AppConfig::default();
        builder = builder
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default("database.min_connections", defaults.database.min_connections)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default(
                "database.idle_timeout_seconds",
                defaults.database.idle_timeout_seconds,
            )?
            .set_default("sweeper.enabled", defaults.sweeper.enabled)?
            .set_default(
                "sweeper.sweep_interval_seconds",
                defaults.sweeper.sweep_interval_seconds,
            )?
            .set_default("sweeper.batch_size", defaults.sweeper.batch_size)?
            .set_default("observability.log_level", defaults.observability.log_level.clone())?
            .set_default(
                "observability.metrics_enabled",
                defaults.observability.metrics_enabled,
            )?;

        builder = builder.add_source(
            Environment::with_prefix("SYMPHONIA")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("postgresql://")
            && !self.database.url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "数据库URL必须是PostgreSQL连接串: {}",
                self.database.url
            ));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("database.max_connections 必须大于0"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(anyhow::anyhow!(
                "database.min_connections 不能大于 max_connections"
            ));
        }
        if self.sweeper.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("sweeper.sweep_interval_seconds 必须大于0"));
        }
        if self.sweeper.batch_size <= 0 {
            return Err(anyhow::anyhow!("sweeper.batch_size 必须大于0"));
        }
        const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LOG_LEVELS.contains(&self.observability.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "observability.log_level 不是有效的日志级别: {}",
                self.observability.log_level
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sweeper.sweep_interval_seconds, 60);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgresql://db.internal/symphonia"
max_connections = 20

[sweeper]
sweep_interval_seconds = 30

[observability]
log_level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.database.url, "postgresql://db.internal/symphonia");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.sweeper.sweep_interval_seconds, 30);
        assert_eq!(config.observability.log_level, "debug");
        // 未覆盖的字段保持默认值
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/symphonia.toml")).is_err());
    }

    #[test]
    fn test_validate_rejects_non_postgres_url() {
        let mut config = AppConfig::default();
        config.database.url = "mysql://localhost/symphonia".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.sweeper.sweep_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}

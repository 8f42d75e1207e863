//! 配置加载
//!
//! 主配置与mongo配置是两个JSON文件，分别由`--cnf`和`--mongo-cnf`指定。
//! 字段缺省走默认值，加载后统一`validate()`。

use std::path::{Path, PathBuf};

use convoy_errors::{ConvoyError, ConvoyResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP监听地址
    pub http_addr: String,
    /// HTTP读超时（秒）
    pub http_read_over_time: u64,
    /// HTTP写超时（秒），同时用作请求级超时
    pub http_write_over_time: u64,
    pub log_level: String,
    /// 设置后日志同时写入该文件
    pub log_file: Option<String>,
    /// 转换任务的临时目录，每个任务在其下创建独立子目录
    pub save_compose_tmp_folder: String,
    /// 转换结束后是否删除任务子目录
    pub need_delete_convert_folder: bool,
    /// 转换成功后是否立刻把任务送入调度器执行
    pub need_execute_immediately: bool,
    /// 转换在独立goroutine上异步执行，否则在调用方同步执行
    pub async_convert: bool,
    /// k8s api server地址，设置后优先于kubeconfig
    pub k8s_api_server: Option<String>,
    /// kubeconfig路径，缺省按约定解析
    pub kube_config_path: Option<String>,
    pub kube_bearer_token: Option<String>,
    pub kube_insecure_skip_tls_verify: bool,
    /// kompose可执行文件路径
    pub kompose_path: String,
    /// 启动恢复：Running任务的ext_time早于该秒数视为残留，置为执行失败
    pub running_stale_seconds: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            http_read_over_time: 60,
            http_write_over_time: 60,
            log_level: "info".to_string(),
            log_file: None,
            save_compose_tmp_folder: "/tmp/convoy-compose".to_string(),
            need_delete_convert_folder: true,
            need_execute_immediately: false,
            async_convert: false,
            k8s_api_server: None,
            kube_config_path: None,
            kube_bearer_token: None,
            kube_insecure_skip_tls_verify: false,
            kompose_path: "kompose".to_string(),
            running_stale_seconds: 300,
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载，`path`为None时使用默认配置。
    pub fn load(path: Option<&str>) -> ConvoyResult<Self> {
        let config = match path {
            Some(p) if !p.is_empty() => {
                info!("加载主配置文件: {}", p);
                let content = std::fs::read_to_string(p)?;
                serde_json::from_str(&content)
                    .map_err(|e| ConvoyError::config_error(format!("解析配置文件{p}失败: {e}")))?
            }
            _ => {
                info!("未指定配置文件，使用默认配置");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConvoyResult<()> {
        if self.http_addr.is_empty() {
            return Err(ConvoyError::config_error("http_addr不能为空"));
        }
        if self.save_compose_tmp_folder.is_empty() {
            return Err(ConvoyError::config_error("save_compose_tmp_folder不能为空"));
        }
        if self.kompose_path.is_empty() {
            return Err(ConvoyError::config_error("kompose_path不能为空"));
        }
        if self.running_stale_seconds <= 0 {
            return Err(ConvoyError::config_error("running_stale_seconds必须为正数"));
        }
        Ok(())
    }

    /// 解析kubeconfig路径：显式配置 → `$HOME/.kube/config` →
    /// 项目内`config/kube-config.yml`。
    pub fn resolve_kube_config_path(&self) -> PathBuf {
        if let Some(path) = &self.kube_config_path {
            return PathBuf::from(path);
        }
        if let Ok(home) = std::env::var("HOME") {
            let path = Path::new(&home).join(".kube").join("config");
            if path.exists() {
                return path;
            }
        }
        PathBuf::from("config/kube-config.yml")
    }
}

/// mongo配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_string(),
            database: "convoy".to_string(),
            min_pool_size: 5,
            max_pool_size: 20,
            connect_timeout_seconds: 10,
        }
    }
}

impl MongoConfig {
    pub fn load(path: Option<&str>) -> ConvoyResult<Self> {
        let config: Self = match path {
            Some(p) if !p.is_empty() => {
                info!("加载mongo配置文件: {}", p);
                let content = std::fs::read_to_string(p)?;
                serde_json::from_str(&content).map_err(|e| {
                    ConvoyError::config_error(format!("解析mongo配置文件{p}失败: {e}"))
                })?
            }
            _ => Self::default(),
        };
        if config.uri.is_empty() {
            return Err(ConvoyError::config_error("mongo uri不能为空"));
        }
        if config.database.is_empty() {
            return Err(ConvoyError::config_error("mongo database不能为空"));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert!(!config.async_convert);
    }

    #[test]
    fn load_merges_partial_json_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"http_addr": "127.0.0.1:9000", "async_convert": true}}"#
        )
        .unwrap();
        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:9000");
        assert!(config.async_convert);
        // 未出现的字段保持默认
        assert_eq!(config.running_stale_seconds, 300);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"running_stale_seconds": 0}}"#).unwrap();
        assert!(AppConfig::load(Some(file.path().to_str().unwrap())).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::load(Some("/no/such/convoy.json")).is_err());
    }

    #[test]
    fn explicit_kube_config_path_wins() {
        let config = AppConfig {
            kube_config_path: Some("/etc/convoy/kube.yml".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(
            config.resolve_kube_config_path(),
            PathBuf::from("/etc/convoy/kube.yml")
        );
    }

    #[test]
    fn mongo_config_defaults() {
        let config = MongoConfig::load(None).unwrap();
        assert_eq!(config.database, "convoy");
        assert_eq!(config.max_pool_size, 20);
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvoyError {
    #[error("数据库错误: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },
    #[error("打算新增到pendingtasks中的任务id已经存在: {id}")]
    DuplicateTaskId { id: String },
    #[error("任务状态不允许该操作: {message}")]
    InvalidTaskState { message: String },
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("不支持的资源类型: {kind}")]
    UnsupportedKind { kind: String },
    #[error("传入的参数images的数量和已有的容器数量不一致: 期望 {expected} 实际 {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("k8s资源冲突: {0}")]
    ClusterConflict(String),
    #[error("k8s集群操作错误: {0}")]
    Cluster(String),
    #[error("转换任务错误: {0}")]
    Conversion(String),
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type ConvoyResult<T> = Result<T, ConvoyError>;

impl ConvoyError {
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn duplicate_task_id<S: Into<String>>(id: S) -> Self {
        Self::DuplicateTaskId { id: id.into() }
    }
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidTaskState {
            message: message.into(),
        }
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn unsupported_kind<S: Into<String>>(kind: S) -> Self {
        Self::UnsupportedKind { kind: kind.into() }
    }
    pub fn cluster<S: Into<String>>(msg: S) -> Self {
        Self::Cluster(msg.into())
    }
    pub fn conversion<S: Into<String>>(msg: S) -> Self {
        Self::Conversion(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 客户端输入问题，HTTP层映射为400。
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvoyError::Validation(_) | ConvoyError::Yaml(_) | ConvoyError::UnsupportedKind { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ConvoyError::ClusterConflict(_))
    }
}

impl From<bson::ser::Error> for ConvoyError {
    fn from(err: bson::ser::Error) -> Self {
        ConvoyError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for ConvoyError {
    fn from(err: bson::de::Error) -> Self {
        ConvoyError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ConvoyError {
    fn from(err: serde_json::Error) -> Self {
        ConvoyError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ConvoyError {
    fn from(err: anyhow::Error) -> Self {
        ConvoyError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;

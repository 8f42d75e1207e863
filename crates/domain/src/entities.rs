//! 核心领域实体定义，包含任务、任务项、转换项和任务执行结果。
//!
//! 同一份serde模型同时服务于HTTP层的YAML输入和MongoDB的BSON文档，
//! 字段名统一为snake_case，枚举值以字符串形式存储。

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use convoy_errors::{ConvoyError, ConvoyResult};
use serde::{Deserialize, Serialize};

/// 任务类型
///
/// - `Create`: 任务携带现成的k8s manifest，直接调度执行
/// - `Convert`: 任务携带docker-compose文档，先转换为k8s manifest，
///   转换成功后提升为`Create`任务再调度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Create,
    Convert,
}

/// 任务状态码
///
/// 任务生命周期状态机的位置。缺省反序列化为`Unknown`，
/// 不存在独立的数字0状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaskState {
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
    /// 等待调度执行
    #[serde(rename = "PENDING")]
    Pending,
    /// 正在执行
    #[serde(rename = "RUNNING")]
    Running,
    /// 转换失败
    #[serde(rename = "WRONG")]
    Wrong,
    /// 执行成功，终态：不允许再更新或执行
    #[serde(rename = "EXECUTED")]
    Executed,
    /// 执行失败
    #[serde(rename = "EXECUTE_FAILED")]
    ExecuteFailed,
    /// 已停止
    #[serde(rename = "STOPPED")]
    Stopped,
}

/// 任务执行结果状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultState {
    #[serde(rename = "SUCCESS")]
    ResultSuccess,
    #[serde(rename = "FAIL")]
    ResultFail,
}

/// 转换生成的controller类型，缺省生成Deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    ReplicationController,
    DaemonSet,
    Statefulset,
    Helm,
}

/// Create任务的一个任务项：一份k8s manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskItem {
    /// 转换产物的文件路径（仅转换生成的item携带）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// k8s yaml文件内容
    pub k8s_yaml_content: String,
}

/// Convert任务的一个转换项：一份docker-compose文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KomposeItem {
    /// docker-compose文件内容
    pub docker_compose_content: String,
    /// 生成资源的副本数，缺省沿用转换器默认值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_type: Option<ControllerType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KomposeSpec {
    pub items: Vec<KomposeItem>,
}

/// 任务
///
/// 持久化的工作单元：要么携带k8s manifest（Create），要么携带
/// docker-compose文档（Convert），外加调度元数据。MongoDB是唯一的
/// 事实来源，内存中的pending队列只是调度器的派生缓存。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    /// 客户端传入的任务id，在available任务中全局唯一
    pub id: String,
    /// mongo _id
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub store_id: Option<ObjectId>,
    /// 每个HTTP请求生成的请求id
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    /// 软删除墓碑：false表示任务已删除
    pub available: bool,
    /// 从创建/更新到计划执行的等待秒数
    pub wait_seconds: i64,
    pub state: TaskState,
    /// 是否正在执行
    pub is_running: bool,
    /// 定时任务表达式，暂未开发此功能
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schedule: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TaskItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kompose: Option<KomposeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<DateTime<Utc>>,
    /// 调度器应当触发该任务的时间点
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_exec_at: Option<DateTime<Utc>>,
    /// 最近一次执行开始时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_time: Option<DateTime<Utc>>,
    /// 最近一次执行完成时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_done_time: Option<DateTime<Utc>>,
    /// 执行次数
    pub ext_times: i64,
    /// 转换次数
    pub convert_times: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_time: Option<DateTime<Utc>>,
    pub convert_successfully: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_error: Option<String>,
    /// 执行任务是否成功的总体结果
    pub exec_successfully: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exec_result_ids: Vec<String>,
}

impl Task {
    /// 校验客户端传入的任务。
    ///
    /// 规则：id非空、type已设置、对应类型的任务项非空、available为真、
    /// 未处于执行中。
    pub fn verify(&self) -> ConvoyResult<()> {
        if self.id.is_empty() {
            return Err(ConvoyError::validation("任务id不能为空"));
        }
        let task_type = self
            .task_type
            .ok_or_else(|| ConvoyError::validation("未设置Type无法分辨任务类型"))?;
        match task_type {
            TaskType::Create => {
                if self.items.is_empty() {
                    return Err(ConvoyError::validation("任务项不能为空"));
                }
                if self
                    .items
                    .iter()
                    .any(|item| item.k8s_yaml_content.is_empty())
                {
                    return Err(ConvoyError::validation("任务项k8s_yaml_content不能为空"));
                }
            }
            TaskType::Convert => {
                if self.kompose_items().is_empty() {
                    return Err(ConvoyError::validation("转换任务项不能为空"));
                }
            }
        }
        if !self.available {
            return Err(ConvoyError::validation("任务不可用"));
        }
        if self.is_running {
            return Err(ConvoyError::validation("任务正在执行中"));
        }
        Ok(())
    }

    pub fn kompose_items(&self) -> &[KomposeItem] {
        self.kompose
            .as_ref()
            .map(|k| k.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_pending(&self) -> bool {
        self.available && self.state == TaskState::Pending
    }

    /// `Executed`是终态：更新、再转换、手动执行都必须拒绝
    pub fn is_finished(&self) -> bool {
        self.state == TaskState::Executed
    }
}

/// 任务执行结果
///
/// 每次对一个任务项的apply尝试产生一条记录。回滚删除的是集群资源，
/// 结果记录保留。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// `<任务id>-<任务项下标>-<yyyy-MM-dd-HH-mm-ss>`，稳定且可读
    pub id: String,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub store_id: Option<ObjectId>,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub state: ResultState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TaskResult {
    pub fn new(
        task_id: &str,
        item_index: usize,
        error: impl Into<String>,
        message: impl Into<String>,
        state: ResultState,
    ) -> Self {
        let now = Utc::now();
        let id = format!(
            "{}-{}-{}",
            task_id,
            item_index,
            now.format("%Y-%m-%d-%H-%M-%S")
        );
        Self {
            id,
            store_id: None,
            task_id: task_id.to_string(),
            created_at: now,
            state,
            message: message.into(),
            error: error.into(),
        }
    }
}

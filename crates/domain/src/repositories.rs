//! 持久化仓储trait
//!
//! 任务与任务结果的存储门面。存储层只暴露"未找到"和"传输错误"两类
//! 失败，重试与状态策略由调用方决定。

use async_trait::async_trait;
use bson::oid::ObjectId;
use convoy_errors::ConvoyResult;

use crate::entities::{Task, TaskResult};

/// 任务仓储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入任务，返回存储id。available任务中已存在相同id时拒绝。
    async fn save(&self, task: &Task) -> ConvoyResult<ObjectId>;

    /// 查找指定id且available的任务，不存在返回`TaskNotFound`。
    async fn find_by_id(&self, id: &str) -> ConvoyResult<Task>;

    /// 全部available任务。
    async fn get_all(&self) -> ConvoyResult<Vec<Task>>;

    /// available且state为Pending的任务，调度器启动时加载。
    async fn get_pending(&self) -> ConvoyResult<Vec<Task>>;

    /// 软删除：置available=false并记录delete_at。
    async fn soft_delete(&self, store_id: &ObjectId) -> ConvoyResult<()>;

    /// 按存储id整体替换。
    async fn update(&self, task: &Task) -> ConvoyResult<()>;

    /// 部分字段更新（$set）。
    async fn update_fields(&self, store_id: &ObjectId, fields: bson::Document)
        -> ConvoyResult<()>;

    /// 移除字段（$unset）。
    async fn unset_field(&self, store_id: &ObjectId, key: &str) -> ConvoyResult<()>;

    /// 向数组字段追加元素（$push）。
    async fn array_push(
        &self,
        store_id: &ObjectId,
        key: &str,
        value: bson::Bson,
    ) -> ConvoyResult<()>;
}

/// 任务结果仓储
#[async_trait]
pub trait TaskResultRepository: Send + Sync {
    async fn save(&self, result: &TaskResult) -> ConvoyResult<ObjectId>;

    /// 查询某任务的全部结果，所属任务已被删除时过滤掉。
    async fn find_by_task(&self, task_id: &str) -> ConvoyResult<Vec<TaskResult>>;
}

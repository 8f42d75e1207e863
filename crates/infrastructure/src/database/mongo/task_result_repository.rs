use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use convoy_domain::{Task, TaskResult, TaskResultRepository};
use convoy_errors::{ConvoyError, ConvoyResult};
use futures::TryStreamExt;
use mongodb::{Collection, Database};

use super::{TASKS_COLLECTION, TASK_RESULTS_COLLECTION};

/// 任务结果的mongo仓储
///
/// 查询时同时检查tasks集合：所属任务已软删除的结果不返回。
#[derive(Clone)]
pub struct MongoTaskResultRepository {
    collection: Collection<TaskResult>,
    task_collection: Collection<Task>,
}

impl MongoTaskResultRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(TASK_RESULTS_COLLECTION),
            task_collection: db.collection(TASKS_COLLECTION),
        }
    }
}

#[async_trait]
impl TaskResultRepository for MongoTaskResultRepository {
    async fn save(&self, result: &TaskResult) -> ConvoyResult<ObjectId> {
        let inserted = self.collection.insert_one(result).await?;
        inserted
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ConvoyError::Internal("mongo未返回ObjectId".to_string()))
    }

    async fn find_by_task(&self, task_id: &str) -> ConvoyResult<Vec<TaskResult>> {
        let task = self
            .task_collection
            .find_one(doc! { "id": task_id, "available": true })
            .await?;
        if task.is_none() {
            return Ok(Vec::new());
        }
        let cursor = self.collection.find(doc! { "task_id": task_id }).await?;
        let results: Vec<TaskResult> = cursor.try_collect().await?;
        Ok(results)
    }
}

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use convoy_domain::{Task, TaskRepository, TaskState};
use convoy_errors::{ConvoyError, ConvoyResult};
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use tracing::info;

use super::TASKS_COLLECTION;

/// 任务的mongo仓储
#[derive(Clone)]
pub struct MongoTaskRepository {
    collection: Collection<Task>,
}

impl MongoTaskRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(TASKS_COLLECTION),
        }
    }

    async fn find(&self, filter: Document) -> ConvoyResult<Vec<Task>> {
        let cursor = self.collection.find(filter).await?;
        let tasks: Vec<Task> = cursor.try_collect().await?;
        Ok(tasks)
    }
}

#[async_trait]
impl TaskRepository for MongoTaskRepository {
    async fn save(&self, task: &Task) -> ConvoyResult<ObjectId> {
        let existing = self
            .collection
            .find_one(doc! { "id": &task.id, "available": true })
            .await?;
        if existing.is_some() {
            return Err(ConvoyError::duplicate_task_id(&task.id));
        }
        let result = self.collection.insert_one(task).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ConvoyError::Internal("mongo未返回ObjectId".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> ConvoyResult<Task> {
        self.collection
            .find_one(doc! { "id": id, "available": true })
            .await?
            .ok_or_else(|| ConvoyError::task_not_found(id))
    }

    async fn get_all(&self) -> ConvoyResult<Vec<Task>> {
        self.find(doc! { "available": true }).await
    }

    async fn get_pending(&self) -> ConvoyResult<Vec<Task>> {
        self.find(doc! {
            "available": true,
            "state": bson::to_bson(&TaskState::Pending)?,
        })
        .await
    }

    async fn soft_delete(&self, store_id: &ObjectId) -> ConvoyResult<()> {
        self.collection
            .update_one(
                doc! { "_id": store_id },
                doc! { "$set": {
                    "available": false,
                    "delete_at": bson::to_bson(&chrono::Utc::now())?,
                } },
            )
            .await?;
        info!("任务软删除完成: store_id={}", store_id);
        Ok(())
    }

    async fn update(&self, task: &Task) -> ConvoyResult<()> {
        let store_id = task
            .store_id
            .ok_or_else(|| ConvoyError::Internal("任务缺少存储id无法更新".to_string()))?;
        let mut document = bson::to_document(task)?;
        document.remove("_id");
        self.collection
            .update_one(doc! { "_id": store_id }, doc! { "$set": document })
            .await?;
        Ok(())
    }

    async fn update_fields(
        &self,
        store_id: &ObjectId,
        fields: Document,
    ) -> ConvoyResult<()> {
        self.collection
            .update_one(doc! { "_id": store_id }, doc! { "$set": fields })
            .await?;
        Ok(())
    }

    async fn unset_field(&self, store_id: &ObjectId, key: &str) -> ConvoyResult<()> {
        self.collection
            .update_one(doc! { "_id": store_id }, doc! { "$unset": { key: "" } })
            .await?;
        Ok(())
    }

    async fn array_push(
        &self,
        store_id: &ObjectId,
        key: &str,
        value: Bson,
    ) -> ConvoyResult<()> {
        self.collection
            .update_one(doc! { "_id": store_id }, doc! { "$push": { key: value } })
            .await?;
        Ok(())
    }
}

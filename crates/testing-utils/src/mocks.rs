//! 仓储与外部端口的内存mock实现
//!
//! 任务mock内部以bson Document存储，`$set`/`$unset`/`$push`语义
//! 直接落在文档上，与mongo实现的行为保持一致。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use convoy_domain::ports::{ComposeTransformer, DynamicApi, GroupVersionResource, TransformOptions};
use convoy_domain::{SchedulerEvents, Task, TaskResult, TaskResultRepository, TaskRepository};
use convoy_errors::{ConvoyError, ConvoyResult};
use serde_json::Value;

/// 任务仓储mock
#[derive(Clone, Default)]
pub struct MockTaskRepository {
    docs: Arc<Mutex<HashMap<ObjectId, Document>>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个任务并返回其存储id。
    pub fn seed(&self, task: &Task) -> ObjectId {
        let store_id = task.store_id.unwrap_or_else(ObjectId::new);
        let mut doc = bson::to_document(task).expect("任务序列化失败");
        doc.insert("_id", store_id);
        self.docs.lock().unwrap().insert(store_id, doc);
        store_id
    }

    pub fn count(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    /// 按任务id取当前文档快照（包含已软删除的任务）。
    pub fn stored(&self, id: &str) -> Option<Task> {
        let docs = self.docs.lock().unwrap();
        docs.values()
            .find(|doc| doc.get_str("id") == Ok(id))
            .map(|doc| bson::from_document(doc.clone()).expect("任务反序列化失败"))
    }

    fn is_available(doc: &Document) -> bool {
        doc.get_bool("available").unwrap_or(false)
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn save(&self, task: &Task) -> ConvoyResult<ObjectId> {
        let mut docs = self.docs.lock().unwrap();
        let duplicate = docs
            .values()
            .any(|doc| doc.get_str("id") == Ok(task.id.as_str()) && Self::is_available(doc));
        if duplicate {
            return Err(ConvoyError::duplicate_task_id(&task.id));
        }
        let store_id = ObjectId::new();
        let mut doc = bson::to_document(task)?;
        doc.insert("_id", store_id);
        docs.insert(store_id, doc);
        Ok(store_id)
    }

    async fn find_by_id(&self, id: &str) -> ConvoyResult<Task> {
        let docs = self.docs.lock().unwrap();
        docs.values()
            .find(|doc| doc.get_str("id") == Ok(id) && Self::is_available(doc))
            .map(|doc| bson::from_document(doc.clone()))
            .transpose()?
            .ok_or_else(|| ConvoyError::task_not_found(id))
    }

    async fn get_all(&self) -> ConvoyResult<Vec<Task>> {
        let docs = self.docs.lock().unwrap();
        docs.values()
            .filter(|doc| Self::is_available(doc))
            .map(|doc| bson::from_document(doc.clone()).map_err(ConvoyError::from))
            .collect()
    }

    async fn get_pending(&self) -> ConvoyResult<Vec<Task>> {
        let docs = self.docs.lock().unwrap();
        docs.values()
            .filter(|doc| Self::is_available(doc) && doc.get_str("state") == Ok("PENDING"))
            .map(|doc| bson::from_document(doc.clone()).map_err(ConvoyError::from))
            .collect()
    }

    async fn soft_delete(&self, store_id: &ObjectId) -> ConvoyResult<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(store_id) {
            doc.insert("available", false);
            doc.insert("delete_at", bson::to_bson(&chrono::Utc::now())?);
        }
        Ok(())
    }

    async fn update(&self, task: &Task) -> ConvoyResult<()> {
        let store_id = task
            .store_id
            .ok_or_else(|| ConvoyError::Internal("任务缺少存储id无法更新".to_string()))?;
        let mut update = bson::to_document(task)?;
        update.remove("_id");
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(&store_id) {
            for (key, value) in update {
                doc.insert(key, value);
            }
        }
        Ok(())
    }

    async fn update_fields(
        &self,
        store_id: &ObjectId,
        fields: Document,
    ) -> ConvoyResult<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(store_id) {
            for (key, value) in fields {
                doc.insert(key, value);
            }
        }
        Ok(())
    }

    async fn unset_field(&self, store_id: &ObjectId, key: &str) -> ConvoyResult<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(store_id) {
            doc.remove(key);
        }
        Ok(())
    }

    async fn array_push(
        &self,
        store_id: &ObjectId,
        key: &str,
        value: Bson,
    ) -> ConvoyResult<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(doc) = docs.get_mut(store_id) {
            match doc.get_mut(key) {
                Some(Bson::Array(array)) => array.push(value),
                _ => {
                    doc.insert(key, Bson::Array(vec![value]));
                }
            }
        }
        Ok(())
    }
}

/// 任务结果仓储mock
#[derive(Clone, Default)]
pub struct MockTaskResultRepository {
    results: Arc<Mutex<Vec<TaskResult>>>,
}

impl MockTaskResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TaskResult> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskResultRepository for MockTaskResultRepository {
    async fn save(&self, result: &TaskResult) -> ConvoyResult<ObjectId> {
        let store_id = ObjectId::new();
        let mut stored = result.clone();
        stored.store_id = Some(store_id);
        self.results.lock().unwrap().push(stored);
        Ok(store_id)
    }

    async fn find_by_task(&self, task_id: &str) -> ConvoyResult<Vec<TaskResult>> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }
}

/// 动态客户端mock：记录调用，可脚本化失败与冲突
#[derive(Clone, Default)]
pub struct MockDynamicApi {
    creates: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    deletes: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    fail_create_names: Arc<Mutex<HashSet<String>>>,
    fail_delete_names: Arc<Mutex<HashSet<String>>>,
    replace_conflicts: Arc<Mutex<u32>>,
    objects: Arc<Mutex<HashMap<String, Value>>>,
}

impl MockDynamicApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建metadata.name为该值的资源时失败。
    pub fn fail_create_for(&self, name: &str) {
        self.fail_create_names.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_delete_for(&self, name: &str) {
        self.fail_delete_names.lock().unwrap().insert(name.to_string());
    }

    /// 接下来n次replace返回乐观并发冲突。
    pub fn conflict_times(&self, n: u32) {
        *self.replace_conflicts.lock().unwrap() = n;
    }

    /// 预置get/replace可见的对象。
    pub fn put_object(&self, name: &str, object: Value) {
        self.objects.lock().unwrap().insert(name.to_string(), object);
    }

    pub fn object(&self, name: &str) -> Option<Value> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    /// (resource复数名, namespace, name)
    pub fn created(&self) -> Vec<(String, Option<String>, String)> {
        self.creates.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, Option<String>, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn delete_count(&self, name: &str) -> usize {
        self.deletes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, n)| n == name)
            .count()
    }
}

#[async_trait]
impl DynamicApi for MockDynamicApi {
    async fn create(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        manifest: &Value,
    ) -> ConvoyResult<Value> {
        let name = manifest
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if self.fail_create_names.lock().unwrap().contains(&name) {
            return Err(ConvoyError::cluster(format!("mock创建失败: {name}")));
        }
        self.creates.lock().unwrap().push((
            gvr.resource.to_string(),
            namespace.map(str::to_string),
            name,
        ));
        Ok(manifest.clone())
    }

    async fn get(
        &self,
        _gvr: &GroupVersionResource,
        _namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ConvoyError::cluster(format!("资源不存在: {name}")))
    }

    async fn replace(
        &self,
        _gvr: &GroupVersionResource,
        _namespace: Option<&str>,
        name: &str,
        manifest: &Value,
    ) -> ConvoyResult<Value> {
        {
            let mut conflicts = self.replace_conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(ConvoyError::ClusterConflict("mock冲突".to_string()));
            }
        }
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), manifest.clone());
        Ok(manifest.clone())
    }

    async fn delete(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<()> {
        if self.fail_delete_names.lock().unwrap().contains(name) {
            return Err(ConvoyError::cluster(format!("mock删除失败: {name}")));
        }
        self.deletes.lock().unwrap().push((
            gvr.resource.to_string(),
            namespace.map(str::to_string),
            name.to_string(),
        ));
        Ok(())
    }
}

/// compose转换器mock：像真实转换器一样向输出目录写文件
#[derive(Clone, Default)]
pub struct MockComposeTransformer {
    outputs: Arc<Mutex<Vec<String>>>,
    fail_message: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<TransformOptions>>>,
}

impl MockComposeTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次transform调用都会把该内容写成一个新manifest文件。
    pub fn with_output(self, content: &str) -> Self {
        self.outputs.lock().unwrap().push(content.to_string());
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        *self.fail_message.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TransformOptions> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComposeTransformer for MockComposeTransformer {
    async fn transform(&self, opts: &TransformOptions) -> ConvoyResult<()> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(opts.clone());
            calls.len()
        };
        if let Some(message) = self.fail_message.lock().unwrap().clone() {
            return Err(ConvoyError::conversion(message));
        }
        let outputs = self.outputs.lock().unwrap().clone();
        for (i, content) in outputs.iter().enumerate() {
            let path = opts.out_dir.join(format!("k8s-{call_index}-{i}.yaml"));
            std::fs::write(path, content)?;
        }
        Ok(())
    }
}

/// 调度器事件的记录桩
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Created(String),
    Updated(String),
    Deleted(String),
    Converted(String),
}

#[derive(Clone, Default)]
pub struct RecordingEvents {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SchedulerEvents for RecordingEvents {
    fn notify_created(&self, task: Task) {
        self.events
            .lock()
            .unwrap()
            .push(RecordedEvent::Created(task.id));
    }

    fn notify_updated(&self, task: Task) {
        self.events
            .lock()
            .unwrap()
            .push(RecordedEvent::Updated(task.id));
    }

    fn notify_deleted(&self, id: String) {
        self.events.lock().unwrap().push(RecordedEvent::Deleted(id));
    }

    fn notify_converted(&self, task: Task) {
        self.events
            .lock()
            .unwrap()
            .push(RecordedEvent::Converted(task.id));
    }
}

#[cfg(test)]
mod tests {
    use bson::Bson;
    use convoy_domain::TaskState;

    use crate::builders::TaskBuilder;

    use super::*;

    const YAML: &str = "kind: Pod\nmetadata:\n  name: p\n";

    #[tokio::test]
    async fn save_rejects_duplicate_available_id() {
        let repo = MockTaskRepository::new();
        let task = TaskBuilder::create("t1", YAML).build();
        repo.save(&task).await.unwrap();
        assert!(matches!(
            repo.save(&task).await,
            Err(ConvoyError::DuplicateTaskId { .. })
        ));
    }

    #[tokio::test]
    async fn save_allows_reusing_id_of_soft_deleted_task() {
        let repo = MockTaskRepository::new();
        let task = TaskBuilder::create("t1", YAML).build();
        let store_id = repo.save(&task).await.unwrap();
        repo.soft_delete(&store_id).await.unwrap();
        // 软删除后同id可以重新创建
        repo.save(&task).await.unwrap();
    }

    #[tokio::test]
    async fn find_by_id_skips_soft_deleted_tasks() {
        let repo = MockTaskRepository::new();
        let task = TaskBuilder::create("t1", YAML).build();
        let store_id = repo.save(&task).await.unwrap();
        repo.soft_delete(&store_id).await.unwrap();

        assert!(matches!(
            repo.find_by_id("t1").await,
            Err(ConvoyError::TaskNotFound { .. })
        ));
        // 软删除的任务保留在存储里并带删除时间
        let stored = repo.stored("t1").unwrap();
        assert!(!stored.available);
        assert!(stored.delete_at.is_some());
    }

    #[tokio::test]
    async fn get_pending_filters_by_state_and_availability() {
        let repo = MockTaskRepository::new();
        repo.save(&TaskBuilder::create("p1", YAML).build()).await.unwrap();
        repo.save(
            &TaskBuilder::create("r1", YAML)
                .with_state(TaskState::Running)
                .build(),
        )
        .await
        .unwrap();
        let deleted_id = repo
            .save(&TaskBuilder::create("p2", YAML).build())
            .await
            .unwrap();
        repo.soft_delete(&deleted_id).await.unwrap();

        let pending = repo.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "p1");
    }

    #[tokio::test]
    async fn array_push_creates_then_appends() {
        let repo = MockTaskRepository::new();
        let store_id = repo
            .save(&TaskBuilder::create("t1", YAML).build())
            .await
            .unwrap();
        repo.array_push(&store_id, "exec_result_ids", Bson::String("a".into()))
            .await
            .unwrap();
        repo.array_push(&store_id, "exec_result_ids", Bson::String("b".into()))
            .await
            .unwrap();

        let stored = repo.stored("t1").unwrap();
        assert_eq!(stored.exec_result_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn update_fields_and_unset_field_edit_the_document() {
        let repo = MockTaskRepository::new();
        let mut task = TaskBuilder::create("t1", YAML).build();
        task.convert_error = Some("老错误".to_string());
        let store_id = repo.save(&task).await.unwrap();

        repo.update_fields(
            &store_id,
            bson::doc! { "state": bson::to_bson(&TaskState::Wrong).unwrap() },
        )
        .await
        .unwrap();
        repo.unset_field(&store_id, "convert_error").await.unwrap();

        let stored = repo.stored("t1").unwrap();
        assert_eq!(stored.state, TaskState::Wrong);
        assert!(stored.convert_error.is_none());
    }
}

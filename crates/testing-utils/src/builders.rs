//! 测试数据构造器

use bson::oid::ObjectId;
use chrono::Utc;
use convoy_domain::{
    ControllerType, KomposeItem, KomposeSpec, Task, TaskItem, TaskState, TaskType,
};

/// 任务构造器
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: Task {
                id: id.to_string(),
                available: true,
                created_at: Some(Utc::now()),
                ..Task::default()
            },
        }
    }

    /// 带一个manifest的Create任务，状态Pending。
    pub fn create(id: &str, yaml: &str) -> Self {
        Self::new(id)
            .with_type(TaskType::Create)
            .with_state(TaskState::Pending)
            .with_item(yaml)
    }

    /// 带一个compose文档的Convert任务。
    pub fn convert(id: &str, compose: &str) -> Self {
        Self::new(id)
            .with_type(TaskType::Convert)
            .with_kompose_item(compose, None, None)
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task.task_type = Some(task_type);
        self
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        self.task.state = state;
        self
    }

    pub fn with_wait_seconds(mut self, wait_seconds: i64) -> Self {
        self.task.wait_seconds = wait_seconds;
        self
    }

    pub fn with_item(mut self, yaml: &str) -> Self {
        self.task.items.push(TaskItem {
            file_path: None,
            k8s_yaml_content: yaml.to_string(),
        });
        self
    }

    pub fn with_kompose_item(
        mut self,
        compose: &str,
        replicas: Option<i32>,
        controller_type: Option<ControllerType>,
    ) -> Self {
        let spec = self.task.kompose.get_or_insert_with(KomposeSpec::default);
        spec.items.push(KomposeItem {
            docker_compose_content: compose.to_string(),
            replicas,
            controller_type,
        });
        self
    }

    pub fn with_store_id(mut self, store_id: ObjectId) -> Self {
        self.task.store_id = Some(store_id);
        self
    }

    pub fn with_plan_exec_at(mut self, at: chrono::DateTime<Utc>) -> Self {
        self.task.plan_exec_at = Some(at);
        self
    }

    pub fn with_ext_time(mut self, at: chrono::DateTime<Utc>) -> Self {
        self.task.ext_time = Some(at);
        self
    }

    pub fn running(mut self) -> Self {
        self.task.state = TaskState::Running;
        self.task.is_running = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.task.available = false;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

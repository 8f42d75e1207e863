//! 任务服务
//!
//! HTTP层之下的公共API：解析与校验输入、设置创建时默认值、持久化，
//! 然后通过`SchedulerEvents`能力通知调度器。先持久化后通知。
//! `Executed`是终态，更新、再转换、手动执行一律拒绝。

use std::sync::Arc;

use chrono::{Duration, Utc};
use convoy_domain::{SchedulerEvents, Task, TaskRepository, TaskState, TaskType};
use convoy_errors::{ConvoyError, ConvoyResult};
use convoy_infrastructure::kube::manifest;
use convoy_infrastructure::{ClusterFacade, ComposeConverter};
use tracing::{error, info};

pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
    events: Arc<dyn SchedulerEvents>,
    converter: Arc<ComposeConverter>,
    cluster: Arc<ClusterFacade>,
    async_convert: bool,
}

impl TaskService {
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        events: Arc<dyn SchedulerEvents>,
        converter: Arc<ComposeConverter>,
        cluster: Arc<ClusterFacade>,
        async_convert: bool,
    ) -> Self {
        Self {
            repo,
            events,
            converter,
            cluster,
            async_convert,
        }
    }

    /// 解析YAML请求体。
    pub fn unmarshal(&self, body: &[u8]) -> ConvoyResult<Task> {
        let task: Task = serde_yaml::from_slice(body)?;
        Ok(task)
    }

    /// 新建任务：设默认值、持久化，Create入队、Convert进转换。
    pub async fn add(&self, mut task: Task) -> ConvoyResult<()> {
        let task_type = task
            .task_type
            .ok_or_else(|| ConvoyError::validation("未设置Type无法分辨任务类型"))?;
        let now = Utc::now();
        task.available = true;
        task.ext_times = 0;
        task.created_at = Some(now);
        match task_type {
            TaskType::Create => {
                task.is_running = false;
                task.state = TaskState::Pending;
                task.plan_exec_at = Some(now + Duration::seconds(task.wait_seconds));
            }
            TaskType::Convert => {
                task.is_running = true;
                task.state = TaskState::Running;
                task.convert_time = Some(now);
                task.convert_times = 1;
            }
        }
        let store_id = self.repo.save(&task).await?;
        task.store_id = Some(store_id);
        info!("创建任务-持久化成功: task_id={} type={:?}", task.id, task_type);

        match task_type {
            TaskType::Create => {
                self.events.notify_created(task);
                Ok(())
            }
            TaskType::Convert => self.start_convert(task).await,
        }
    }

    /// 更新Create任务：重置为Pending并重算计划执行时间。
    pub async fn update(&self, mut task: Task) -> ConvoyResult<()> {
        let existing = self.repo.find_by_id(&task.id).await?;
        if existing.state == TaskState::Running || existing.is_running {
            return Err(ConvoyError::invalid_state("任务正在执行中无法更新"));
        }
        if existing.is_finished() {
            return Err(ConvoyError::invalid_state("任务已经执行完毕无法更新"));
        }
        let now = Utc::now();
        task.store_id = existing.store_id;
        task.created_at = existing.created_at;
        task.ext_times = existing.ext_times;
        task.available = true;
        task.is_running = false;
        task.update_at = Some(now);
        // plan_exec_at = max(now, update_at) + wait_seconds，此处两者相同
        task.plan_exec_at = Some(now + Duration::seconds(task.wait_seconds));
        task.state = TaskState::Pending;
        self.repo.update(&task).await?;
        info!("更新任务-持久化成功: task_id={}", task.id);
        self.events.notify_updated(task);
        Ok(())
    }

    /// 更新Convert任务：清空上次转换产物并重新转换。
    pub async fn update_convert(&self, mut task: Task) -> ConvoyResult<()> {
        let existing = self.repo.find_by_id(&task.id).await?;
        if existing.is_finished() {
            return Err(ConvoyError::invalid_state("任务已经执行完毕无法更新"));
        }
        let now = Utc::now();
        task.store_id = existing.store_id;
        task.created_at = existing.created_at;
        task.available = true;
        task.items = Vec::new();
        task.convert_error = None;
        task.convert_times = existing.convert_times + 1;
        task.convert_time = Some(now);
        task.update_at = Some(now);
        task.state = TaskState::Running;
        task.is_running = true;
        self.repo.update(&task).await?;
        // 整体$set不会移除store里的旧字段，显式清掉
        if let Some(store_id) = task.store_id {
            self.repo.unset_field(&store_id, "items").await?;
            self.repo.unset_field(&store_id, "convert_error").await?;
        }
        info!(
            "更新任务-重新转换: task_id={} 第{}次转换",
            task.id, task.convert_times
        );
        self.start_convert(task).await
    }

    /// 手动触发执行：可重启状态的任务等待时间清零后走更新路径。
    pub async fn execete(&self, id: &str) -> ConvoyResult<()> {
        let mut task = self.repo.find_by_id(id).await?;
        if task.state == TaskState::Running || task.is_running {
            return Err(ConvoyError::invalid_state("任务正在执行中"));
        }
        if matches!(
            task.state,
            TaskState::Pending | TaskState::Unknown | TaskState::Stopped
        ) {
            task.wait_seconds = 0;
        }
        self.update(task).await
    }

    /// 删除任务：软删除、移出队列；已到期的任务可能创建过集群资源，
    /// 在后台尽力删除这些资源。
    pub async fn delete(&self, id: &str) -> ConvoyResult<()> {
        let task = self.repo.find_by_id(id).await?;
        if task.state == TaskState::Running || task.is_running {
            return Err(ConvoyError::invalid_state("任务正在执行中无法删除"));
        }
        let store_id = task
            .store_id
            .ok_or_else(|| ConvoyError::Internal("任务缺少存储id".to_string()))?;
        self.repo.soft_delete(&store_id).await?;
        info!("删除任务-软删除完成: task_id={}", id);

        let now = Utc::now();
        let was_due = task.plan_exec_at.map(|at| now > at).unwrap_or(false);
        if was_due {
            let cluster = Arc::clone(&self.cluster);
            let items = task.items.clone();
            let task_id = task.id.clone();
            tokio::spawn(async move {
                for item in items {
                    if item.k8s_yaml_content.is_empty() {
                        continue;
                    }
                    let pairs = match manifest::kind_name_pairs(&item.k8s_yaml_content) {
                        Ok(pairs) => pairs,
                        Err(e) => {
                            error!("删除任务-解析manifest失败: task_id={} {}", task_id, e);
                            continue;
                        }
                    };
                    for (kind, name) in pairs {
                        if let Err(e) = cluster.delete(&kind, &name).await {
                            error!(
                                "删除任务-清理资源失败: task_id={} kind={} name={} {}",
                                task_id, kind, name, e
                            );
                        }
                    }
                }
            });
        }

        if task.state == TaskState::Pending {
            self.events.notify_deleted(task.id.clone());
        }
        Ok(())
    }

    async fn start_convert(&self, task: Task) -> ConvoyResult<()> {
        if self.async_convert {
            self.events.notify_converted(task);
            Ok(())
        } else {
            self.converter.convert(&task).await
        }
    }
}

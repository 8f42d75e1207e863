//! 任务执行器
//!
//! 按顺序把任务的manifest应用到集群，逐项记录TaskResult；任意一项
//! 失败时对本次运行已创建的全部资源做尽力回滚删除。执行器在调度器
//! 之外的独立任务上运行，持久化的`state = Running`是防止同一任务
//! 被并发执行的锁。

use std::sync::Arc;

use bson::{doc, Bson};
use chrono::Utc;
use convoy_domain::{ResultState, Task, TaskRepository, TaskResult, TaskResultRepository, TaskState};
use convoy_infrastructure::ClusterFacade;
use tracing::{error, info};

pub struct TaskExecutor {
    task_repo: Arc<dyn TaskRepository>,
    result_repo: Arc<dyn TaskResultRepository>,
    cluster: Arc<ClusterFacade>,
}

impl TaskExecutor {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        result_repo: Arc<dyn TaskResultRepository>,
        cluster: Arc<ClusterFacade>,
    ) -> Self {
        Self {
            task_repo,
            result_repo,
            cluster,
        }
    }

    /// 执行一个到期任务。
    ///
    /// 所有错误都记录日志而不向外传播：执行器的失败不允许影响
    /// 调度器循环。
    pub async fn exec(&self, mut task: Task) {
        let Some(store_id) = task.store_id else {
            error!("执行任务-任务缺少存储id: task_id={}", task.id);
            return;
        };

        let now = Utc::now();
        task.state = TaskState::Running;
        task.is_running = true;
        task.ext_time = Some(now);
        task.ext_times += 1;
        let running_fields = doc! {
            "state": bson::to_bson(&TaskState::Running).unwrap_or(Bson::Null),
            "is_running": true,
            "ext_time": bson::to_bson(&now).unwrap_or(Bson::Null),
            "ext_times": task.ext_times,
        };
        if let Err(e) = self.task_repo.update_fields(&store_id, running_fields).await {
            error!("执行任务-置为Running失败: task_id={} {}", task.id, e);
            return;
        }
        info!(
            "执行任务-开始: task_id={} 第{}次执行 共{}个任务项",
            task.id,
            task.ext_times,
            task.items.len()
        );

        let mut successful = Vec::new();
        let mut result_ids = Vec::new();
        let mut overall_ok = true;

        for (i, item) in task.items.iter().enumerate() {
            if item.k8s_yaml_content.is_empty() {
                continue;
            }
            let outcome = self.cluster.apply(&item.k8s_yaml_content).await;
            successful.extend(outcome.created);
            // 任务项彼此独立，单项失败不阻止后续项
            let result = match outcome.error {
                None => TaskResult::new(&task.id, i, "", "ok", ResultState::ResultSuccess),
                Some(e) => {
                    overall_ok = false;
                    TaskResult::new(&task.id, i, e.to_string(), "", ResultState::ResultFail)
                }
            };
            match self.result_repo.save(&result).await {
                Ok(_) => {
                    result_ids.push(result.id.clone());
                    if let Err(e) = self
                        .task_repo
                        .array_push(&store_id, "exec_result_ids", Bson::String(result.id))
                        .await
                    {
                        error!("执行任务-记录结果id失败: task_id={} {}", task.id, e);
                    }
                }
                Err(e) => error!("执行任务-保存任务结果失败: task_id={} {}", task.id, e),
            }
        }

        if !overall_ok && !successful.is_empty() {
            info!(
                "执行任务-部分失败-回滚已创建的{}个资源: task_id={}",
                successful.len(),
                task.id
            );
            for resource in &successful {
                if let Err(e) = self
                    .cluster
                    .delete_resource(resource.kind, resource.namespace.as_deref(), &resource.name)
                    .await
                {
                    // 回滚删除失败只记录，对外暴露的仍是原始的apply错误
                    error!(
                        "执行任务-回滚删除资源失败: task_id={} kind={} name={} {}",
                        task.id, resource.kind, resource.name, e
                    );
                }
            }
        }

        task.exec_successfully = overall_ok;
        task.ext_done_time = Some(Utc::now());
        task.is_running = false;
        task.state = if overall_ok {
            TaskState::Executed
        } else {
            TaskState::ExecuteFailed
        };
        task.exec_result_ids = result_ids;
        if let Err(e) = self.task_repo.update(&task).await {
            error!("执行任务-持久化最终状态失败: task_id={} {}", task.id, e);
        }
        info!(
            "执行任务-完成: task_id={} 总体结果={}",
            task.id, overall_ok
        );
    }
}

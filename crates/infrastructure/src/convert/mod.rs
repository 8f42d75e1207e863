//! compose → k8s转换流水线
//!
//! 把Convert任务的compose文档落盘、调用转换器、对比输出目录快照
//! 收集产物，成功后把任务提升为Create并置为Pending。

mod kompose;

pub use kompose::KomposeDriver;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bson::doc;
use chrono::Utc;
use convoy_config::AppConfig;
use convoy_domain::ports::{ComposeTransformer, TransformOptions};
use convoy_domain::{SchedulerEvents, Task, TaskItem, TaskRepository, TaskState, TaskType};
use convoy_errors::{ConvoyError, ConvoyResult};
use tracing::{error, info};

/// 转换行为配置，从主配置裁剪而来
#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub tmp_folder: PathBuf,
    pub need_delete_convert_folder: bool,
    pub need_execute_immediately: bool,
}

impl ConvertSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tmp_folder: PathBuf::from(&config.save_compose_tmp_folder),
            need_delete_convert_folder: config.need_delete_convert_folder,
            need_execute_immediately: config.need_execute_immediately,
        }
    }
}

pub struct ComposeConverter {
    repo: Arc<dyn TaskRepository>,
    transformer: Arc<dyn ComposeTransformer>,
    events: Arc<dyn SchedulerEvents>,
    settings: ConvertSettings,
}

impl ComposeConverter {
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        transformer: Arc<dyn ComposeTransformer>,
        events: Arc<dyn SchedulerEvents>,
        settings: ConvertSettings,
    ) -> Self {
        Self {
            repo,
            transformer,
            events,
            settings,
        }
    }

    /// 执行一次转换并持久化结果。
    ///
    /// 任意一步失败都会把任务置为`Wrong`并记录`convert_error`，
    /// 原始错误继续向上传播（同步转换时由HTTP响应携带）。
    pub async fn convert(&self, task: &Task) -> ConvoyResult<()> {
        info!("转换任务-转化DockerCompose到K8S文件-开始: task_id={}", task.id);
        let store_id = task
            .store_id
            .ok_or_else(|| ConvoyError::conversion("任务缺少存储id"))?;

        match self.do_convert(task).await {
            Ok(items) => {
                let fields = doc! {
                    "items": bson::to_bson(&items)?,
                    "type": bson::to_bson(&TaskType::Create)?,
                    "state": bson::to_bson(&TaskState::Pending)?,
                    "convert_successfully": true,
                    "is_running": false,
                };
                self.repo.update_fields(&store_id, fields).await?;
                self.repo.unset_field(&store_id, "convert_error").await?;
                info!(
                    "转换任务-转化DockerCompose到K8S文件-成功: task_id={} 产物{}个",
                    task.id,
                    items.len()
                );
                if self.settings.need_execute_immediately {
                    self.enqueue_converted(&task.id).await?;
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    "转换任务-转化DockerCompose到K8S文件-失败: task_id={} {}",
                    task.id, e
                );
                let fields = doc! {
                    "convert_error": e.to_string(),
                    "convert_successfully": false,
                    "state": bson::to_bson(&TaskState::Wrong)?,
                    "is_running": false,
                };
                if let Err(persist_err) = self.repo.update_fields(&store_id, fields).await {
                    error!("转换任务-写入失败状态出错: {}", persist_err);
                }
                if let Err(persist_err) = self.repo.unset_field(&store_id, "items").await {
                    error!("转换任务-清除items出错: {}", persist_err);
                }
                Err(e)
            }
        }
    }

    /// 转换成功后走更新路径：重算计划时间并通知调度器入队。
    async fn enqueue_converted(&self, task_id: &str) -> ConvoyResult<()> {
        let mut task = self.repo.find_by_id(task_id).await?;
        let now = Utc::now();
        task.update_at = Some(now);
        task.plan_exec_at = Some(now + chrono::Duration::seconds(task.wait_seconds));
        let store_id = task
            .store_id
            .ok_or_else(|| ConvoyError::conversion("任务缺少存储id"))?;
        self.repo
            .update_fields(
                &store_id,
                doc! {
                    "update_at": bson::to_bson(&task.update_at)?,
                    "plan_exec_at": bson::to_bson(&task.plan_exec_at)?,
                },
            )
            .await?;
        info!("转换任务-转换后立即进入调度: task_id={}", task_id);
        self.events.notify_updated(task);
        Ok(())
    }

    async fn do_convert(&self, task: &Task) -> ConvoyResult<Vec<TaskItem>> {
        tokio::fs::create_dir_all(&self.settings.tmp_folder).await?;
        let folder = self.settings.tmp_folder.join(format!(
            "{}-{}",
            task.id,
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        tokio::fs::create_dir_all(&folder).await?;

        let result = self.convert_in_folder(task, &folder).await;

        if self.settings.need_delete_convert_folder {
            match tokio::fs::remove_dir_all(&folder).await {
                Ok(()) => info!("转换任务-删除临时文件夹: {}", folder.display()),
                Err(e) => error!(
                    "转换任务-删除临时文件夹失败: {} {}",
                    folder.display(),
                    e
                ),
            }
        }
        result
    }

    async fn convert_in_folder(&self, task: &Task, folder: &Path) -> ConvoyResult<Vec<TaskItem>> {
        let mut items = Vec::new();
        for (i, kompose_item) in task.kompose_items().iter().enumerate() {
            let compose_path = folder.join(format!("docker-compose-{i}.yml"));
            info!("创建DockerCompose文件: index={}", i);
            tokio::fs::write(&compose_path, &kompose_item.docker_compose_content).await?;

            let before = snapshot_files(folder)?;

            let mut opts = TransformOptions::new(compose_path, folder.to_path_buf());
            opts.replicas = kompose_item.replicas;
            opts.controller = kompose_item.controller_type;
            info!("转换任务-转换中: index={} opts={:?}", i, opts);
            self.transformer.transform(&opts).await?;

            let after = snapshot_files(folder)?;
            for new_file in after.difference(&before) {
                let content = tokio::fs::read_to_string(new_file).await?;
                items.push(TaskItem {
                    file_path: Some(new_file.to_string_lossy().into_owned()),
                    k8s_yaml_content: content,
                });
            }
        }
        Ok(items)
    }
}

/// 目录下全部文件路径的快照，递归。
fn snapshot_files(dir: &Path) -> ConvoyResult<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    collect_files(dir, &mut files)?;
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut BTreeSet<PathBuf>) -> ConvoyResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.insert(path);
        }
    }
    Ok(())
}

//! 调度器的集成测试：入队、定时触发、删除、启动加载与恢复。
//!
//! 仓储与集群客户端都是mock，时间用真实时钟（调度分辨率1秒）。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use convoy_dispatcher::{
    scheduler_channels, DispatchScheduler, PendingQueue, SchedulerHandle, TaskExecutor,
};
use convoy_domain::{SchedulerEvents, Task, TaskState};
use convoy_infrastructure::{ClusterFacade, ComposeConverter, ConvertSettings};
use convoy_testing_utils::{
    MockComposeTransformer, MockDynamicApi, MockTaskRepository, MockTaskResultRepository,
    TaskBuilder,
};
use tokio::sync::broadcast;

const WEB_YAML: &str = "kind: Deployment\nmetadata:\n  name: web\n";
const MANIFEST: &str = "kind: Deployment\nmetadata:\n  name: converted\n";

struct Fixture {
    repo: Arc<MockTaskRepository>,
    api: Arc<MockDynamicApi>,
    queue: Arc<PendingQueue>,
    handle: Arc<SchedulerHandle>,
    shutdown: broadcast::Sender<()>,
    _tmp: tempfile::TempDir,
}

async fn start_scheduler(running_stale_seconds: i64, seed: Vec<Task>) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MockTaskRepository::new());
    for task in &seed {
        repo.seed(task);
    }
    let results = Arc::new(MockTaskResultRepository::new());
    let api = Arc::new(MockDynamicApi::new());
    let cluster = Arc::new(ClusterFacade::new(api.clone()));
    let executor = Arc::new(TaskExecutor::new(repo.clone(), results, cluster));

    let (handle, receivers) = scheduler_channels();
    let converter = Arc::new(ComposeConverter::new(
        repo.clone(),
        Arc::new(MockComposeTransformer::new().with_output(MANIFEST)),
        handle.clone(),
        ConvertSettings {
            tmp_folder: tmp.path().to_path_buf(),
            need_delete_convert_folder: true,
            need_execute_immediately: false,
        },
    ));
    let queue = Arc::new(PendingQueue::new());
    let scheduler = Arc::new(DispatchScheduler::new(
        queue.clone(),
        repo.clone(),
        executor,
        converter,
        running_stale_seconds,
    ));
    let (shutdown, _) = broadcast::channel(4);
    scheduler.start(receivers, shutdown.subscribe()).await;

    Fixture {
        repo,
        api,
        queue,
        handle,
        shutdown,
        _tmp: tmp,
    }
}

/// 轮询等待任务进入指定状态。
async fn wait_for_state(repo: &MockTaskRepository, id: &str, state: TaskState, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if repo.stored(id).map(|t| t.state) == Some(state) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "等待任务{id}进入{state:?}超时"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn due_task(id: &str, repo: &MockTaskRepository) -> Task {
    let mut task = TaskBuilder::create(id, WEB_YAML)
        .with_plan_exec_at(Utc::now())
        .build();
    task.store_id = Some(repo.seed(&task));
    task
}

#[tokio::test(flavor = "multi_thread")]
async fn created_task_with_zero_wait_executes_quickly() {
    let f = start_scheduler(300, vec![]).await;
    let task = due_task("t1", &f.repo);
    f.handle.notify_created(task);

    wait_for_state(&f.repo, "t1", TaskState::Executed, Duration::from_secs(2)).await;
    let stored = f.repo.stored("t1").unwrap();
    assert!(stored.exec_successfully);
    assert_eq!(stored.exec_result_ids.len(), 1);
    assert_eq!(f.api.created().len(), 1);
    // 执行后不再停留在队列里
    assert!(!f.queue.contains("t1"));
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn delayed_task_fires_only_after_plan_exec_at() {
    let f = start_scheduler(300, vec![]).await;
    let mut task = TaskBuilder::create("t2", WEB_YAML)
        .with_wait_seconds(2)
        .with_plan_exec_at(Utc::now() + chrono::Duration::seconds(2))
        .build();
    task.store_id = Some(f.repo.seed(&task));
    f.handle.notify_created(task);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(f.api.created().is_empty(), "计划时间之前不允许apply");
    assert!(f.queue.contains("t2"));

    wait_for_state(&f.repo, "t2", TaskState::Executed, Duration::from_secs(3)).await;
    assert_eq!(f.api.created().len(), 1);
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_pending_task_never_fires() {
    let f = start_scheduler(300, vec![]).await;
    let mut task = TaskBuilder::create("t3", WEB_YAML)
        .with_wait_seconds(60)
        .with_plan_exec_at(Utc::now() + chrono::Duration::seconds(60))
        .build();
    task.store_id = Some(f.repo.seed(&task));
    f.handle.notify_created(task);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(f.queue.contains("t3"));

    f.handle.notify_deleted("t3".to_string());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!f.queue.contains("t3"));
    assert!(f.api.created().is_empty());
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_create_notification_is_dropped() {
    let f = start_scheduler(300, vec![]).await;
    let mut task = TaskBuilder::create("t4", WEB_YAML)
        .with_wait_seconds(60)
        .with_plan_exec_at(Utc::now() + chrono::Duration::seconds(60))
        .build();
    task.store_id = Some(f.repo.seed(&task));
    f.handle.notify_created(task.clone());
    f.handle.notify_created(task);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.queue.len(), 1);
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn updated_task_replaces_queue_entry() {
    let f = start_scheduler(300, vec![]).await;
    let mut task = TaskBuilder::create("t5", WEB_YAML)
        .with_wait_seconds(60)
        .with_plan_exec_at(Utc::now() + chrono::Duration::seconds(60))
        .build();
    task.store_id = Some(f.repo.seed(&task));
    f.handle.notify_created(task.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 更新为立即到期
    task.plan_exec_at = Some(Utc::now());
    f.handle.notify_updated(task);

    wait_for_state(&f.repo, "t5", TaskState::Executed, Duration::from_secs(2)).await;
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_loads_pending_tasks_into_queue() {
    let pending = TaskBuilder::create("boot-1", WEB_YAML)
        .with_plan_exec_at(Utc::now() + chrono::Duration::seconds(60))
        .build();
    let f = start_scheduler(300, vec![pending]).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(f.queue.contains("boot-1"));
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_recovers_stale_running_tasks() {
    let stale = TaskBuilder::create("stale-1", WEB_YAML)
        .running()
        .with_ext_time(Utc::now() - chrono::Duration::seconds(600))
        .build();
    let fresh = TaskBuilder::create("fresh-1", WEB_YAML)
        .running()
        .with_ext_time(Utc::now())
        .build();
    let f = start_scheduler(300, vec![stale, fresh]).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stale_stored = f.repo.stored("stale-1").unwrap();
    assert_eq!(stale_stored.state, TaskState::ExecuteFailed);
    assert!(!stale_stored.is_running);
    // 宽限期内的Running保留原状
    assert_eq!(f.repo.stored("fresh-1").unwrap().state, TaskState::Running);
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn converted_task_is_processed_by_event_loop() {
    let f = start_scheduler(300, vec![]).await;
    let mut task = TaskBuilder::convert("conv-1", "services: {}")
        .with_state(TaskState::Running)
        .build();
    task.is_running = true;
    task.store_id = Some(f.repo.seed(&task));

    f.handle.notify_converted(task);

    // 转换在事件循环内执行，完成后任务提升为Create/Pending
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let stored = f.repo.stored("conv-1").unwrap();
        if stored.state == TaskState::Pending && stored.convert_successfully {
            assert!(!stored.items.is_empty());
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "等待转换完成超时");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let _ = f.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_both_loops() {
    let f = start_scheduler(300, vec![]).await;
    let _ = f.shutdown.send(());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 关闭后通知不再被消费，任务不会被执行
    let task = due_task("late", &f.repo);
    f.handle.notify_created(task);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(f.api.created().is_empty());
}

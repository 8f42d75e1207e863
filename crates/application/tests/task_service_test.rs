//! 任务服务的集成测试：默认值、状态机拒绝规则、事件通知。

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use convoy_application::TaskService;
use convoy_domain::{Task, TaskState, TaskType};
use convoy_errors::ConvoyError;
use convoy_infrastructure::{ClusterFacade, ComposeConverter, ConvertSettings};
use convoy_testing_utils::{
    MockComposeTransformer, MockDynamicApi, MockTaskRepository, RecordedEvent, RecordingEvents,
    TaskBuilder,
};

const WEB_YAML: &str = "kind: Deployment\nmetadata:\n  name: web\n";
const COMPOSE: &str = "services:\n  web:\n    image: nginx\n";
const MANIFEST: &str = "kind: Deployment\nmetadata:\n  name: converted\n";

struct Fixture {
    repo: Arc<MockTaskRepository>,
    events: Arc<RecordingEvents>,
    api: Arc<MockDynamicApi>,
    service: TaskService,
    _tmp: tempfile::TempDir,
}

fn fixture(async_convert: bool) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MockTaskRepository::new());
    let events = Arc::new(RecordingEvents::new());
    let api = Arc::new(MockDynamicApi::new());
    let cluster = Arc::new(ClusterFacade::new(api.clone()));
    let converter = Arc::new(ComposeConverter::new(
        repo.clone(),
        Arc::new(MockComposeTransformer::new().with_output(MANIFEST)),
        events.clone(),
        ConvertSettings {
            tmp_folder: tmp.path().to_path_buf(),
            need_delete_convert_folder: true,
            need_execute_immediately: false,
        },
    ));
    let service = TaskService::new(repo.clone(), events.clone(), converter, cluster, async_convert);
    Fixture {
        repo,
        events,
        api,
        service,
        _tmp: tmp,
    }
}

fn unmarshal(service: &TaskService, yaml: &str) -> Task {
    service.unmarshal(yaml.as_bytes()).unwrap()
}

#[tokio::test]
async fn unmarshal_parses_yaml_body() {
    let f = fixture(false);
    let yaml = r#"
id: t1
type: create
available: true
wait_seconds: 3
items:
  - k8s_yaml_content: "kind: Pod\nmetadata:\n  name: p"
"#;
    let task = unmarshal(&f.service, yaml);
    assert_eq!(task.id, "t1");
    assert_eq!(task.task_type, Some(TaskType::Create));
    assert_eq!(task.wait_seconds, 3);
    assert!(task.verify().is_ok());
}

#[tokio::test]
async fn unmarshal_rejects_malformed_yaml() {
    let f = fixture(false);
    assert!(f.service.unmarshal(b"id: [unclosed").is_err());
}

#[tokio::test]
async fn add_create_sets_defaults_and_notifies_scheduler() {
    let f = fixture(false);
    let before = Utc::now();
    let task = TaskBuilder::new("t1")
        .with_type(TaskType::Create)
        .with_item(WEB_YAML)
        .with_wait_seconds(5)
        .build();

    f.service.add(task).await.unwrap();

    let stored = f.repo.stored("t1").unwrap();
    assert_eq!(stored.state, TaskState::Pending);
    assert!(stored.available);
    assert!(!stored.is_running);
    assert_eq!(stored.ext_times, 0);
    assert!(stored.created_at.is_some());
    let plan = stored.plan_exec_at.unwrap();
    assert!(plan >= before + ChronoDuration::seconds(5));
    assert!(plan <= Utc::now() + ChronoDuration::seconds(5));

    assert_eq!(
        f.events.recorded(),
        vec![RecordedEvent::Created("t1".to_string())]
    );
}

#[tokio::test]
async fn add_convert_sync_runs_conversion_inline() {
    let f = fixture(false);
    let task = TaskBuilder::new("c1")
        .with_type(TaskType::Convert)
        .with_kompose_item(COMPOSE, None, None)
        .build();

    f.service.add(task).await.unwrap();

    let stored = f.repo.stored("c1").unwrap();
    // 转换成功后任务提升为Create并等待调度
    assert_eq!(stored.task_type, Some(TaskType::Create));
    assert_eq!(stored.state, TaskState::Pending);
    assert!(stored.convert_successfully);
    assert_eq!(stored.convert_times, 1);
    assert!(stored.convert_time.is_some());
    assert!(!stored.items.is_empty());
}

#[tokio::test]
async fn add_convert_async_defers_to_scheduler() {
    let f = fixture(true);
    let task = TaskBuilder::new("c2")
        .with_type(TaskType::Convert)
        .with_kompose_item(COMPOSE, None, None)
        .build();

    f.service.add(task).await.unwrap();

    // 异步模式只投递事件，转换由调度器的事件循环执行
    assert_eq!(
        f.events.recorded(),
        vec![RecordedEvent::Converted("c2".to_string())]
    );
    let stored = f.repo.stored("c2").unwrap();
    assert_eq!(stored.state, TaskState::Running);
    assert!(stored.is_running);
}

#[tokio::test]
async fn add_duplicate_id_is_rejected() {
    let f = fixture(false);
    let task = TaskBuilder::new("dup")
        .with_type(TaskType::Create)
        .with_item(WEB_YAML)
        .build();
    f.service.add(task.clone()).await.unwrap();

    let err = f.service.add(task).await.unwrap_err();
    assert!(matches!(err, ConvoyError::DuplicateTaskId { .. }));
}

#[tokio::test]
async fn update_resets_state_and_recomputes_plan() {
    let f = fixture(false);
    let seeded = TaskBuilder::create("u1", WEB_YAML)
        .with_state(TaskState::ExecuteFailed)
        .build();
    f.repo.seed(&seeded);

    let mut update = TaskBuilder::create("u1", WEB_YAML).build();
    update.wait_seconds = 10;
    let before = Utc::now();
    f.service.update(update).await.unwrap();

    let stored = f.repo.stored("u1").unwrap();
    assert_eq!(stored.state, TaskState::Pending);
    assert!(stored.update_at.is_some());
    assert!(stored.plan_exec_at.unwrap() >= before + ChronoDuration::seconds(10));
    assert_eq!(
        f.events.recorded(),
        vec![RecordedEvent::Updated("u1".to_string())]
    );
}

#[tokio::test]
async fn update_refuses_running_task() {
    let f = fixture(false);
    let seeded = TaskBuilder::create("u2", WEB_YAML).running().build();
    f.repo.seed(&seeded);

    let err = f
        .service
        .update(TaskBuilder::create("u2", WEB_YAML).build())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("正在执行"));
}

#[tokio::test]
async fn update_refuses_executed_task() {
    let f = fixture(false);
    let seeded = TaskBuilder::create("u3", WEB_YAML)
        .with_state(TaskState::Executed)
        .build();
    f.repo.seed(&seeded);

    let err = f
        .service
        .update(TaskBuilder::create("u3", WEB_YAML).build())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("已经执行完毕"));
    // 持久化状态不变
    assert_eq!(f.repo.stored("u3").unwrap().state, TaskState::Executed);
}

#[tokio::test]
async fn update_missing_task_is_not_found() {
    let f = fixture(false);
    let err = f
        .service
        .update(TaskBuilder::create("ghost", WEB_YAML).build())
        .await
        .unwrap_err();
    assert!(matches!(err, ConvoyError::TaskNotFound { .. }));
}

#[tokio::test]
async fn update_convert_bumps_attempt_count_and_clears_leftovers() {
    let f = fixture(false);
    let mut seeded = TaskBuilder::convert("c3", COMPOSE)
        .with_state(TaskState::Wrong)
        .build();
    seeded.convert_times = 1;
    seeded.convert_error = Some("上次失败".to_string());
    f.repo.seed(&seeded);

    let update = TaskBuilder::convert("c3", COMPOSE).build();
    f.service.update_convert(update).await.unwrap();

    let stored = f.repo.stored("c3").unwrap();
    assert_eq!(stored.convert_times, 2);
    // 重新转换成功
    assert_eq!(stored.task_type, Some(TaskType::Create));
    assert_eq!(stored.state, TaskState::Pending);
    assert!(stored.convert_error.is_none());
}

#[tokio::test]
async fn update_convert_refuses_executed_task() {
    let f = fixture(false);
    let seeded = TaskBuilder::convert("c4", COMPOSE)
        .with_state(TaskState::Executed)
        .build();
    f.repo.seed(&seeded);

    let err = f
        .service
        .update_convert(TaskBuilder::convert("c4", COMPOSE).build())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("已经执行完毕"));
}

#[tokio::test]
async fn execete_zeroes_wait_for_restartable_states() {
    for state in [TaskState::Pending, TaskState::Unknown, TaskState::Stopped] {
        let f = fixture(false);
        let seeded = TaskBuilder::create("e1", WEB_YAML)
            .with_state(state)
            .with_wait_seconds(600)
            .build();
        f.repo.seed(&seeded);

        f.service.execete("e1").await.unwrap();

        let stored = f.repo.stored("e1").unwrap();
        assert_eq!(stored.wait_seconds, 0, "{state:?}应当清零等待时间");
        assert_eq!(stored.state, TaskState::Pending);
        // 立即到期
        assert!(stored.plan_exec_at.unwrap() <= Utc::now() + ChronoDuration::seconds(1));
    }
}

#[tokio::test]
async fn execete_refuses_running_task() {
    let f = fixture(false);
    f.repo.seed(&TaskBuilder::create("e2", WEB_YAML).running().build());

    let err = f.service.execete("e2").await.unwrap_err();
    assert!(err.to_string().contains("正在执行"));
}

#[tokio::test]
async fn execete_refuses_executed_task() {
    let f = fixture(false);
    f.repo.seed(
        &TaskBuilder::create("e3", WEB_YAML)
            .with_state(TaskState::Executed)
            .build(),
    );

    let err = f.service.execete("e3").await.unwrap_err();
    assert!(err.to_string().contains("已经执行完毕"));
}

#[tokio::test]
async fn delete_soft_deletes_and_signals_queue() {
    let f = fixture(false);
    let seeded = TaskBuilder::create("d1", WEB_YAML)
        .with_plan_exec_at(Utc::now() + ChronoDuration::seconds(60))
        .build();
    f.repo.seed(&seeded);

    f.service.delete("d1").await.unwrap();

    let stored = f.repo.stored("d1").unwrap();
    assert!(!stored.available);
    assert!(stored.delete_at.is_some());
    assert_eq!(
        f.events.recorded(),
        vec![RecordedEvent::Deleted("d1".to_string())]
    );
    // 未到期的任务不触发集群清理
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(f.api.deleted().is_empty());
}

#[tokio::test]
async fn delete_due_task_cleans_created_resources_best_effort() {
    let f = fixture(false);
    let seeded = TaskBuilder::create("d2", WEB_YAML)
        .with_state(TaskState::ExecuteFailed)
        .with_plan_exec_at(Utc::now() - ChronoDuration::seconds(60))
        .build();
    f.repo.seed(&seeded);

    f.service.delete("d2").await.unwrap();

    // 清理在后台任务里进行
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
    while f.api.delete_count("web") == 0 {
        assert!(tokio::time::Instant::now() < deadline, "等待资源清理超时");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(f.api.delete_count("web"), 1);
    // 非Pending状态不向队列发删除信号
    assert!(f.events.recorded().is_empty());
}

#[tokio::test]
async fn delete_refuses_running_task() {
    let f = fixture(false);
    f.repo.seed(&TaskBuilder::create("d3", WEB_YAML).running().build());

    let err = f.service.delete("d3").await.unwrap_err();
    assert!(err.to_string().contains("正在执行"));
    assert!(f.repo.stored("d3").unwrap().available);
}

//! 分发调度器
//!
//! 两个协作循环：
//!
//! - 事件循环：消费create/update/convert/result通道，写pending队列，
//!   转换在本循环内同步执行。
//! - 执行tick循环：持有唯一的可重置定时器，消费exec-notify与delete
//!   通知，`compute_next`遍历队列派发到期任务并计算下次唤醒。
//!
//! 通知经由通道异步送达，发送方先持久化再通知。调度器对存储错误
//! 记录日志并继续运行。

use std::sync::Arc;
use std::time::Duration;

use bson::{doc, Bson};
use chrono::Utc;
use convoy_domain::{SchedulerEvents, Task, TaskRepository, TaskResult, TaskState};
use convoy_infrastructure::ComposeConverter;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::executor::TaskExecutor;
use crate::pending_queue::PendingQueue;

/// 定时器分辨率下限，同时是空队列时的轮询间隔
const TICK_FLOOR: Duration = Duration::from_secs(1);

/// 调度器事件句柄
///
/// 持有各事件通道的发送端，作为`SchedulerEvents`能力交给任务服务
/// 和转换器。发送失败（循环已关闭）只记录日志。
pub struct SchedulerHandle {
    create_tx: mpsc::UnboundedSender<Task>,
    update_tx: mpsc::UnboundedSender<Task>,
    convert_tx: mpsc::UnboundedSender<Task>,
    delete_tx: mpsc::UnboundedSender<String>,
    result_tx: mpsc::UnboundedSender<TaskResult>,
}

impl SchedulerHandle {
    /// 预留：执行结果回传通道，当前无消费逻辑。
    pub fn notify_result(&self, result: TaskResult) {
        if self.result_tx.send(result).is_err() {
            warn!("调度器结果通道已关闭");
        }
    }
}

impl SchedulerEvents for SchedulerHandle {
    fn notify_created(&self, task: Task) {
        if self.create_tx.send(task).is_err() {
            warn!("调度器创建通道已关闭，通知丢弃");
        }
    }

    fn notify_updated(&self, task: Task) {
        if self.update_tx.send(task).is_err() {
            warn!("调度器更新通道已关闭，通知丢弃");
        }
    }

    fn notify_deleted(&self, id: String) {
        if self.delete_tx.send(id).is_err() {
            warn!("调度器删除通道已关闭，通知丢弃");
        }
    }

    fn notify_converted(&self, task: Task) {
        if self.convert_tx.send(task).is_err() {
            warn!("调度器转换通道已关闭，通知丢弃");
        }
    }
}

/// 调度器各事件通道的接收端，由`DispatchScheduler::start`消费。
pub struct SchedulerReceivers {
    create_rx: mpsc::UnboundedReceiver<Task>,
    update_rx: mpsc::UnboundedReceiver<Task>,
    convert_rx: mpsc::UnboundedReceiver<Task>,
    delete_rx: mpsc::UnboundedReceiver<String>,
    result_rx: mpsc::UnboundedReceiver<TaskResult>,
}

/// 先建通道：句柄交给服务与转换器，接收端之后交给调度循环。
/// 服务持有能力、调度器持有存储，以此打破两者的构造环。
pub fn scheduler_channels() -> (Arc<SchedulerHandle>, SchedulerReceivers) {
    let (create_tx, create_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let (convert_tx, convert_rx) = mpsc::unbounded_channel();
    let (delete_tx, delete_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = mpsc::unbounded_channel();
    (
        Arc::new(SchedulerHandle {
            create_tx,
            update_tx,
            convert_tx,
            delete_tx,
            result_tx,
        }),
        SchedulerReceivers {
            create_rx,
            update_rx,
            convert_rx,
            delete_rx,
            result_rx,
        },
    )
}

pub struct DispatchScheduler {
    queue: Arc<PendingQueue>,
    task_repo: Arc<dyn TaskRepository>,
    executor: Arc<TaskExecutor>,
    converter: Arc<ComposeConverter>,
    running_stale_seconds: i64,
}

impl DispatchScheduler {
    pub fn new(
        queue: Arc<PendingQueue>,
        task_repo: Arc<dyn TaskRepository>,
        executor: Arc<TaskExecutor>,
        converter: Arc<ComposeConverter>,
        running_stale_seconds: i64,
    ) -> Self {
        Self {
            queue,
            task_repo,
            executor,
            converter,
            running_stale_seconds,
        }
    }

    /// 加载持久化状态并启动两个循环。
    ///
    /// 返回的句柄等待两个循环结束（收到关闭信号后）。
    pub async fn start(
        self: Arc<Self>,
        receivers: SchedulerReceivers,
        shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        self.load_pending().await;
        self.recover_running().await;

        let SchedulerReceivers {
            create_rx,
            update_rx,
            convert_rx,
            delete_rx,
            result_rx,
        } = receivers;
        let (exec_notify_tx, exec_notify_rx) = mpsc::unbounded_channel::<()>();

        let event_loop = {
            let scheduler = Arc::clone(&self);
            let shutdown = shutdown.resubscribe();
            let exec_notify_tx = exec_notify_tx.clone();
            tokio::spawn(async move {
                scheduler
                    .event_loop(
                        create_rx,
                        update_rx,
                        convert_rx,
                        result_rx,
                        exec_notify_tx,
                        shutdown,
                    )
                    .await;
            })
        };

        let tick_loop = {
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                scheduler
                    .exec_tick_loop(exec_notify_rx, delete_rx, shutdown)
                    .await;
            })
        };

        // 启动后先算一次唤醒时间
        let _ = exec_notify_tx.send(());

        tokio::spawn(async move {
            let _ = tokio::join!(event_loop, tick_loop);
            info!("调度器已停止");
        })
    }

    /// 启动时加载available且Pending的任务进队列。
    async fn load_pending(&self) {
        match self.task_repo.get_pending().await {
            Ok(tasks) => {
                info!("启动加载pending任务: {}个", tasks.len());
                for task in tasks {
                    if let Err(e) = self.queue.add(task) {
                        warn!("启动加载任务入队失败: {}", e);
                    }
                }
            }
            Err(e) => error!("启动加载pending任务失败: {}", e),
        }
    }

    /// 启动恢复：进程崩溃可能把任务留在Running。ext_time超过宽限期的
    /// 置为执行失败；仍在宽限期内的保留，可能是滚动重启时别的实例在跑。
    async fn recover_running(&self) {
        let tasks = match self.task_repo.get_all().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("启动恢复-读取任务失败: {}", e);
                return;
            }
        };
        let stale_before = Utc::now() - chrono::Duration::seconds(self.running_stale_seconds);
        for task in tasks {
            if task.state != TaskState::Running {
                continue;
            }
            let stale = task.ext_time.map(|t| t < stale_before).unwrap_or(true);
            if !stale {
                info!("启动恢复-Running任务仍在宽限期内，保留: task_id={}", task.id);
                continue;
            }
            warn!(
                "启动恢复-残留的Running任务置为执行失败: task_id={} ext_time={:?}",
                task.id, task.ext_time
            );
            let Some(store_id) = task.store_id else { continue };
            let fields = doc! {
                "state": bson::to_bson(&TaskState::ExecuteFailed).unwrap_or(Bson::Null),
                "is_running": false,
            };
            if let Err(e) = self.task_repo.update_fields(&store_id, fields).await {
                error!("启动恢复-写入失败: task_id={} {}", task.id, e);
            }
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        mut create_rx: mpsc::UnboundedReceiver<Task>,
        mut update_rx: mpsc::UnboundedReceiver<Task>,
        mut convert_rx: mpsc::UnboundedReceiver<Task>,
        mut result_rx: mpsc::UnboundedReceiver<TaskResult>,
        exec_notify_tx: mpsc::UnboundedSender<()>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("调度器事件循环启动");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    create_rx.close();
                    update_rx.close();
                    convert_rx.close();
                    result_rx.close();
                    info!("调度器事件循环收到关闭信号");
                    return;
                }
                Some(task) = create_rx.recv() => {
                    if !task.is_pending() {
                        warn!("创建通知的任务不满足入队条件，丢弃: task_id={}", task.id);
                        continue;
                    }
                    match self.queue.add(task) {
                        Ok(()) => { let _ = exec_notify_tx.send(()); }
                        Err(e) => warn!("任务入队失败: {}", e),
                    }
                }
                Some(task) = update_rx.recv() => {
                    if !task.is_pending() {
                        warn!("更新通知的任务不满足入队条件，丢弃: task_id={}", task.id);
                        continue;
                    }
                    self.queue.update(task);
                    let _ = exec_notify_tx.send(());
                }
                Some(task) = convert_rx.recv() => {
                    if let Err(e) = self.converter.convert(&task).await {
                        error!("异步转换失败: task_id={} {}", task.id, e);
                    }
                }
                Some(_result) = result_rx.recv() => {
                    // 结果通道保留，暂无处理
                }
            }
        }
    }

    async fn exec_tick_loop(
        self: Arc<Self>,
        mut exec_notify_rx: mpsc::UnboundedReceiver<()>,
        mut delete_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("调度器执行循环启动");
        let timer = tokio::time::sleep(TICK_FLOOR);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    exec_notify_rx.close();
                    delete_rx.close();
                    info!("调度器执行循环收到关闭信号");
                    return;
                }
                () = &mut timer => {
                    let next = self.compute_next();
                    timer.as_mut().reset(tokio::time::Instant::now() + next);
                }
                Some(()) = exec_notify_rx.recv() => {
                    let next = self.compute_next();
                    timer.as_mut().reset(tokio::time::Instant::now() + next);
                }
                Some(id) = delete_rx.recv() => {
                    if self.queue.delete(&id) {
                        info!("任务已从pending队列移除: task_id={}", id);
                    }
                    let next = self.compute_next();
                    timer.as_mut().reset(tokio::time::Instant::now() + next);
                }
            }
        }
    }

    /// 遍历队列：不可用的槽位丢弃，到期的任务取出并派发执行，
    /// 其余记录最近的未来触发点。返回下次唤醒的等待时长，
    /// 下限1秒，空队列时也是1秒（保持定时器常转）。
    fn compute_next(&self) -> Duration {
        let now = Utc::now();
        let mut due = Vec::new();
        let mut min_delta: Option<chrono::Duration> = None;

        self.queue.sweep(|slot| {
            let Some(task) = slot.as_ref() else { return };
            if !task.available {
                warn!("任务已不可用，移出队列: task_id={}", task.id);
                *slot = None;
                return;
            }
            let plan = task.plan_exec_at.unwrap_or(now);
            if plan <= now {
                if let Some(task) = slot.take() {
                    due.push(task);
                }
            } else {
                let delta = plan - now;
                min_delta = Some(match min_delta {
                    Some(current) if current < delta => current,
                    _ => delta,
                });
            }
        });

        for task in due {
            info!("任务到达计划执行时间，派发执行: task_id={}", task.id);
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                executor.exec(task).await;
            });
        }

        match min_delta.and_then(|d| d.to_std().ok()) {
            Some(delta) => delta.max(TICK_FLOOR),
            None => TICK_FLOOR,
        }
    }
}

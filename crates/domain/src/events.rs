//! 调度器事件能力
//!
//! 任务服务由调度器构造出的能力对象通知调度器，打破两者的构造环：
//! 先用存储构造调度器，再把该能力交给任务服务。通知是异步投递的，
//! 发送方不得假设同步生效；调用前必须先完成持久化（persist-before-notify）。

use crate::entities::Task;

pub trait SchedulerEvents: Send + Sync {
    /// 新建的Create任务已持久化，等待入队。
    fn notify_created(&self, task: Task);

    /// 任务已更新并重新置为Pending，队列需要替换并重算唤醒时间。
    fn notify_updated(&self, task: Task);

    /// 任务已软删除，从pending队列移除。
    fn notify_deleted(&self, id: String);

    /// Convert任务已持久化，投递给转换器。
    fn notify_converted(&self, task: Task);
}

//! 调度层
//!
//! pending队列、任务执行器和分发调度器。调度器是队列的唯一所有者：
//! 事件循环写入，执行tick循环在`compute_next`期间读改，执行器在
//! 独立任务中运行，从不触碰队列。

pub mod executor;
pub mod pending_queue;
pub mod scheduler;

pub use executor::TaskExecutor;
pub use pending_queue::PendingQueue;
pub use scheduler::{scheduler_channels, DispatchScheduler, SchedulerHandle, SchedulerReceivers};

//! 领域模型
//!
//! 任务、任务结果等核心业务实体，持久化与外部系统的trait边界。
//! 实体不依赖具体的存储驱动和集群客户端实现。

pub mod entities;
pub mod events;
pub mod ports;
pub mod repositories;

pub use entities::{
    ControllerType, KomposeItem, KomposeSpec, ResultState, Task, TaskItem, TaskResult, TaskState,
    TaskType,
};
pub use events::SchedulerEvents;
pub use repositories::{TaskRepository, TaskResultRepository};

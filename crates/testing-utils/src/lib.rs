//! 测试工具
//!
//! 仓储、动态客户端、转换器的内存mock实现和任务构造器，
//! 供各crate的单元与集成测试使用，不需要真实数据库或集群。

pub mod builders;
pub mod mocks;

pub use builders::TaskBuilder;
pub use mocks::{
    MockComposeTransformer, MockDynamicApi, MockTaskRepository, MockTaskResultRepository,
    RecordedEvent, RecordingEvents,
};

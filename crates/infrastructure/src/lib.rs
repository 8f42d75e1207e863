//! 基础设施层
//!
//! 领域trait的具体实现：MongoDB仓储、k8s集群门面与REST动态客户端、
//! compose转换流水线与kompose子进程驱动。

pub mod convert;
pub mod database;
pub mod kube;

pub use convert::{ComposeConverter, ConvertSettings, KomposeDriver};
pub use database::mongo::{MongoTaskRepository, MongoTaskResultRepository};
pub use kube::{AppliedResource, ApplyOutcome, ClusterFacade, KubeRestApi, ResourceKind};

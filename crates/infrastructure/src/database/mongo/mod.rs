//! MongoDB持久化
//!
//! 集合`tasks`和`task_results`，首次启动时惰性创建。

mod task_repository;
mod task_result_repository;

pub use task_repository::MongoTaskRepository;
pub use task_result_repository::MongoTaskResultRepository;

use std::time::Duration;

use convoy_config::MongoConfig;
use convoy_errors::ConvoyResult;
use mongodb::{options::ClientOptions, Client, Database};
use tracing::info;

pub const TASKS_COLLECTION: &str = "tasks";
pub const TASK_RESULTS_COLLECTION: &str = "task_results";

/// 建立mongo连接并返回目标数据库。
pub async fn connect(config: &MongoConfig) -> ConvoyResult<Database> {
    let mut options = ClientOptions::parse(&config.uri).await?;
    options.min_pool_size = Some(config.min_pool_size);
    options.max_pool_size = Some(config.max_pool_size);
    options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_seconds));
    options.app_name = Some("convoy".to_string());

    let client = Client::with_options(options)?;
    info!("mongo连接成功: database={}", config.database);
    Ok(client.database(&config.database))
}

/// 集合不存在时创建。
pub async fn ensure_collections(db: &Database) -> ConvoyResult<()> {
    let existing = db.list_collection_names().await?;
    for name in [TASKS_COLLECTION, TASK_RESULTS_COLLECTION] {
        if existing.iter().any(|c| c == name) {
            info!("{} collection 已经存在", name);
        } else {
            db.create_collection(name).await?;
            info!("{} collection 创建成功", name);
        }
    }
    Ok(())
}

//! HTTP层
//!
//! 薄请求路由：接收YAML任务体，调用任务服务，返回
//! `{task_id, message[, error]}`形状的JSON响应。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use routes::{create_routes, AppState};

//! 任务结果查询处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use crate::{
    error::{ApiError, ApiResult},
    response::TaskResultsResponse,
    routes::AppState,
};

/// GET /taskresult/{task_id}：任务仍available时返回其全部执行结果。
pub async fn list_task_results(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskResultsResponse>> {
    let task_results = state
        .task_result_repo
        .find_by_task(&task_id)
        .await
        .map_err(|e| {
            error!("获取所有任务结果-失败: task_id={} {}", task_id, e);
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "",
                "获取所有任务结果-失败",
                e.to_string(),
            )
        })?;
    Ok(Json(TaskResultsResponse { task_results }))
}

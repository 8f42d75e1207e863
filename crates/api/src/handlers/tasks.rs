//! 任务相关的HTTP处理器

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    Json,
};
use convoy_domain::TaskType;
use tracing::{error, info};

use crate::{
    error::{ApiError, ApiResult},
    middleware::REQUEST_ID_HEADER,
    response::{SuccessResponse, TasksResponse},
    routes::AppState,
};

/// POST/PUT /task：创建或更新任务，请求体为YAML。
pub async fn add_or_update_task(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse>> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut task = state.task_service.unmarshal(&body).map_err(|e| {
        error!("Could not parse YAML: uuid={} {}", request_id, e);
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "",
            "Could not parse YAML",
            e.to_string(),
        )
    })?;

    if let Err(e) = task.verify() {
        info!("task verify failed: uuid={} {}", request_id, e);
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            task.id,
            "Failed to create task",
            e.to_string(),
        ));
    }
    info!("task verify success: uuid={} task_id={}", request_id, task.id);
    task.request_id = request_id;

    let is_post = method == Method::POST;
    let mut message = if is_post { "创建任务" } else { "更新任务" }.to_string();
    let task_type = task.task_type;
    match task_type {
        Some(TaskType::Convert) => message.push_str("-转换成k8s任务"),
        Some(TaskType::Create) => message.push_str("-k8s执行任务"),
        None => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                task.id,
                "Failed to create task",
                "创建/更新任务失败-无法分辨任务类型",
            ));
        }
    }

    let task_id = task.id.clone();
    let result = if is_post {
        state.task_service.add(task).await
    } else {
        match task_type {
            Some(TaskType::Convert) => state.task_service.update_convert(task).await,
            _ => state.task_service.update(task).await,
        }
    };
    result.map_err(|e| {
        error!("{}-失败: task_id={} {}", message, task_id, e);
        ApiError::from_convoy(&task_id, "Failed to create task", e)
    })?;

    Ok(Json(SuccessResponse {
        task_id,
        message: format!("{message}-成功"),
    }))
}

/// DELETE /task/{id}：删除任务，执行中的任务拒绝。
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state.task_service.delete(&id).await.map_err(|e| {
        error!("删除任务失败: task_id={} {}", id, e);
        ApiError::from_convoy(&id, "Task deletion failed", e)
    })?;
    Ok(Json(SuccessResponse {
        task_id: id,
        message: "Task has been successfully deleted".to_string(),
    }))
}

/// POST /task/exec/{id}：立即执行任务。
pub async fn exec_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state.task_service.execete(&id).await.map_err(|e| {
        error!("执行任务失败: task_id={} {}", id, e);
        ApiError::from_convoy(&id, "Task execution failure", e)
    })?;
    Ok(Json(SuccessResponse {
        task_id: id,
        message: "Task has been successfully Executed".to_string(),
    }))
}

/// GET /tasks：全部available任务。
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<TasksResponse>> {
    let tasks = state.task_repo.get_all().await.map_err(|e| {
        error!("获取所有任务-失败: {}", e);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "",
            "获取所有任务-失败",
            e.to_string(),
        )
    })?;
    Ok(Json(TasksResponse { tasks }))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use convoy_errors::ConvoyError;

use crate::response::ErrorResponse;

/// API错误：状态码加上`{task_id, message, error}`响应体
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub task_id: String,
    pub message: String,
    pub error: String,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        task_id: impl Into<String>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status,
            task_id: task_id.into(),
            message: message.into(),
            error: error.into(),
        }
    }

    /// 服务层错误映射：客户端输入问题400，其余500。
    pub fn from_convoy(task_id: &str, message: &str, err: ConvoyError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, task_id, message, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            task_id: self.task_id,
            message: self.message,
            error: self.error,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use convoy_application::TaskService;
use convoy_domain::{TaskRepository, TaskResultRepository};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{
        task_results::list_task_results,
        tasks::{add_or_update_task, delete_task, exec_task, list_tasks},
    },
    middleware::{cors, request_logging},
    response::ErrorResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub task_service: Arc<TaskService>,
    pub task_repo: Arc<dyn TaskRepository>,
    pub task_result_repo: Arc<dyn TaskResultRepository>,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/task", post(add_or_update_task).put(add_or_update_task))
        .route("/task/{id}", delete(delete_task))
        .route("/task/exec/{id}", post(exec_task))
        .route("/tasks", get(list_tasks))
        .route("/taskresult/{task_id}", get(list_task_results))
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            task_id: String::new(),
            message: "Method not allowed".to_string(),
            error: "HTTP Method not allowed".to_string(),
        }),
    )
}

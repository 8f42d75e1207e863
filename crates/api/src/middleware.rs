//! 请求中间件
//!
//! 每个请求生成请求id写入`X-Request-Id`头并记录出入日志；
//! CORS全放开，OPTIONS直接以200短路。

use std::time::Instant;

use axum::{
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 打上请求id并记录请求始末。OPTIONS请求不记日志。
pub async fn request_logging(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    match HeaderValue::from_str(&request_id) {
        Ok(value) => {
            request.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        Err(e) => error!("写入请求id失败: {}", e),
    }

    let method = request.method().clone();
    let uri = request.uri().clone();
    let is_options = method == Method::OPTIONS;
    let start = Instant::now();
    if !is_options {
        info!(
            "客户端发起的HTTP请求开始: uuid={} {} {}",
            request_id, method, uri
        );
    }

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    if !is_options {
        // 所有非OPTIONS响应都是JSON
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        info!(
            "客户端发起的HTTP请求结束: uuid={} status={} 耗时={}ms",
            request_id,
            response.status(),
            start.elapsed().as_millis()
        );
    }
    response
}

/// CORS放行所有来源，OPTIONS短路返回200。
pub async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = axum::http::StatusCode::OK.into_response();
        apply_cors_headers(&mut response);
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors_headers(&mut response);
    response
}

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type"),
    );
}

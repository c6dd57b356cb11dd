//! 路由装配：首页、上传与下载。

use axum::extract::Extension;
use axum::http::Request;
use axum::routing::get;
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::storage::Storage;
use crate::upload::UploadConfig;
use crate::{download, frontend, http, upload};

/// 构建应用路由。未注册的方法由 axum 返回空响应体的 405。
///
/// 请求体上限只作用于 multipart 提取器；PUT 直接读取 `Body`，由拷贝器计数。
pub fn build_router(storage: Arc<Storage>, upload_config: Arc<UploadConfig>) -> Router {
    let body_limit = upload_config.body_limit();
    let form_routes = get(frontend::index)
        .put(upload::upload_raw)
        .post(upload::upload_form);

    Router::new()
        .route("/", form_routes.clone())
        .route("/upload", form_routes.clone())
        .route("/upload.html", form_routes)
        .route(
            "/{*path}",
            get(download::serve_path)
                .put(upload::upload_raw)
                .post(upload::upload_form),
        )
        .layer(body_limit)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = %http::client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(upload_config))
}

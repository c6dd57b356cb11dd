//! 下载：文件交给 `ServeDir`，目录渲染为列表页。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use std::fmt::Write;
use std::sync::Arc;
use tokio::fs;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

use crate::frontend::escape_html;
use crate::http::{decode_path, encode_path};
use crate::storage::{FileEntry, Storage, StorageError};

/// GET/HEAD 非首页路径：按上传目录提供静态文件。
pub async fn serve_path(
    Extension(storage): Extension<Arc<Storage>>,
    request: Request<AxumBody>,
) -> Response {
    let Some(path) = decode_path(request.uri().path()) else {
        debug!(path = request.uri().path(), "download path is not valid UTF-8");
        return StatusCode::NOT_FOUND.into_response();
    };
    let target = match storage.resolve_path_checked(&path, false).await {
        Ok(target) => Some(target),
        Err(StorageError::InvalidPath) => {
            debug!(path, "download path rejected");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(_) => None,
    };
    if let Some(target) = target
        && fs::metadata(&target).await.is_ok_and(|meta| meta.is_dir())
    {
        return render_listing(&storage, &path).await;
    }

    let serve_dir = ServeDir::new(storage.root_path()).append_index_html_on_directories(false);
    match serve_dir.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn render_listing(storage: &Storage, path: &str) -> Response {
    let entries = match storage.list_dir(path).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path, error = %err, "list directory failed");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    debug!(path, count = entries.len(), "list directory");
    Html(listing_html(path, &entries)).into_response()
}

fn listing_html(path: &str, entries: &[FileEntry]) -> String {
    let title = escape_html(path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n<pre>\n"
    );
    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = encode_path(&format!("/{}{suffix}", entry.path));
        let _ = writeln!(
            html,
            "<a href=\"{}\">{}{suffix}</a>  {}  {}",
            escape_html(&href),
            escape_html(&entry.name),
            entry.modified.as_deref().unwrap_or("-"),
            if entry.is_dir {
                "-".to_string()
            } else {
                entry.size.to_string()
            },
        );
    }
    html.push_str("</pre>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_links_are_encoded_and_escaped() {
        let entries = vec![
            FileEntry {
                name: "sub".into(),
                path: "sub".into(),
                is_dir: true,
                size: 4096,
                modified: None,
            },
            FileEntry {
                name: "a <b>.txt".into(),
                path: "a <b>.txt".into(),
                is_dir: false,
                size: 3,
                modified: Some("2024-01-01 00:00:00".into()),
            },
        ];
        let html = listing_html("/", &entries);
        assert!(html.contains(r#"<a href="/sub/">sub/</a>"#));
        assert!(html.contains(r#"<a href="/a%20%3Cb%3E.txt">a &lt;b&gt;.txt</a>  2024-01-01 00:00:00  3"#));
    }
}

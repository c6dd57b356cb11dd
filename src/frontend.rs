//! 嵌入式首页：上传表单与 curl 用法。

use axum::body::Body as AxumBody;
use axum::extract::Query;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;
use serde::Deserialize;
use std::borrow::Cow;
use tracing::error;

use crate::http::request_host;

#[derive(RustEmbed)]
#[folder = "assets"]
/// 嵌入式页面资源。
pub struct FrontendAssets;

const INDEX_PAGE: &str = "index.html";

#[derive(Deserialize)]
pub(crate) struct IndexQuery {
    result: Option<String>,
}

/// 渲染首页，`?result=` 中的上传结果显示在表单上方。
pub async fn index(
    Query(query): Query<IndexQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let Some((content_type, data)) = load_embedded_asset(INDEX_PAGE) else {
        error!(asset = INDEX_PAGE, "embedded asset missing");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };
    let page = String::from_utf8_lossy(&data)
        .replace("{{host}}", &escape_html(&request_host(&headers)))
        .replace(
            "{{result}}",
            &escape_html(query.result.as_deref().unwrap_or_default()),
        );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, content_type);
    Ok((response_headers, AxumBody::from(page)).into_response())
}

/// 加载指定路径的嵌入式资源及其 MIME 类型。
fn load_embedded_asset(path: &str) -> Option<(HeaderValue, Cow<'static, [u8]>)> {
    let asset = FrontendAssets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.essence_str()).ok()?;
    Some((content_type, asset.data))
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn index_page_is_embedded() {
        let (content_type, data) = load_embedded_asset(INDEX_PAGE).expect("index asset");
        assert_eq!(content_type, "text/html");
        let page = String::from_utf8_lossy(&data);
        assert!(page.contains(r#"name="f""#));
        assert!(page.contains("{{result}}"));
    }
}

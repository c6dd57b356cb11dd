//! HTTP 辅助工具：主机名、路径编解码、客户端 IP 与安全头。

use axum::body::Body as AxumBody;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::{middleware, response::Response};
use percent_encoding::{
    AsciiSet, CONTROLS, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode,
};
use std::net::SocketAddr;

const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// 取请求的 Host 头，用于拼接下载命令。
pub fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

/// 解码 URL 路径中的百分号转义；解码结果不是 UTF-8 时返回 `None`。
pub fn decode_path(path: &str) -> Option<String> {
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET).to_string()
}

/// 综合 `x-forwarded-for` 与连接信息得到客户端 IP。
pub fn client_ip<B>(request: &Request<B>) -> String {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let connect_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    forwarded_ip
        .or(connect_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

/// 添加基础安全响应头。
pub async fn add_security_headers(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_falls_back_to_localhost() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_host(&headers), "localhost");
        headers.insert(header::HOST, HeaderValue::from_static("files.example:8080"));
        assert_eq!(request_host(&headers), "files.example:8080");
    }

    #[test]
    fn path_encoding_keeps_separators() {
        assert_eq!(encode_path("/dir/my file#1.txt"), "/dir/my%20file%231.txt");
        assert_eq!(
            decode_path("/dir/my%20file%231.txt").as_deref(),
            Some("/dir/my file#1.txt")
        );
    }

    #[test]
    fn non_utf8_path_is_rejected() {
        assert_eq!(decode_path("/%FF.txt"), None);
        assert_eq!(decode_path("/%E4%B8%AD.txt").as_deref(), Some("/中.txt"));
    }

    #[test]
    fn query_value_encodes_reserved_characters() {
        assert_eq!(encode_query_value("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_query_value("CANT_WRITE_FILE"), "CANT_WRITE_FILE");
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .body(())
            .expect("request");
        assert_eq!(client_ip(&request), "10.0.0.1");

        let request = Request::builder().body(()).expect("request");
        assert_eq!(client_ip(&request), "unknown");
    }
}

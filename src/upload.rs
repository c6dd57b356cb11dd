//! PUT 原始请求体上传与 POST 表单上传处理器。

use axum::body::Body as AxumBody;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::{info, warn};

use crate::config::FORM_FIELD_NAME;
use crate::copier::{copy_to_file, copy_to_staged, stream_reader};
use crate::error::UploadError;
use crate::http::{decode_path, encode_query_value, request_host};
use crate::storage::Storage;

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_size: u64,
    pub sub_dirs: bool,
}

impl UploadConfig {
    /// 上传字节上限；0 表示不限制。
    pub fn limit(&self) -> Option<u64> {
        (self.max_size > 0).then_some(self.max_size)
    }

    /// 表单请求体的整体上限，由 multipart 提取器在解析时执行。
    pub fn body_limit(&self) -> DefaultBodyLimit {
        match self.limit() {
            Some(limit) => DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX)),
            None => DefaultBodyLimit::disable(),
        }
    }
}

/// 表单上传的响应方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadFlow {
    /// 浏览器表单：302 跳转回首页并携带结果。
    Browser,
    /// 命令行客户端：纯文本结果。
    Api,
}

impl UploadFlow {
    pub fn for_path(path: &str) -> Self {
        match path {
            "/" | "/upload" => UploadFlow::Browser,
            _ => UploadFlow::Api,
        }
    }
}

/// PUT：以请求路径作为文件名写入原始请求体。
pub async fn upload_raw(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    headers: HeaderMap,
    uri: Uri,
    body: AxumBody,
) -> Response {
    let result = match decode_path(uri.path()) {
        Some(raw_path) => store_raw(&storage, &upload, &headers, &raw_path, body).await,
        None => {
            warn!(path = uri.path(), "upload path is not valid UTF-8");
            Err(UploadError::InvalidFile)
        }
    };
    let outcome = result.map(|(target, written)| {
        info!(path = ?target, bytes = written, "put upload saved");
        storage.download_path(&target)
    });
    render(UploadFlow::Api, &headers, outcome)
}

/// POST：解析 multipart 表单，保存字段 `f` 中的文件。
pub async fn upload_form(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    headers: HeaderMap,
    uri: Uri,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let flow = UploadFlow::for_path(uri.path());
    let result = match check_content_length(&headers, upload.limit()) {
        Ok(()) => match multipart {
            Ok(multipart) => store_form(&storage, &upload, multipart).await,
            Err(rejection) => {
                warn!(error = %rejection, "multipart request rejected");
                Err(UploadError::InvalidFile)
            }
        },
        Err(err) => Err(err),
    };
    let outcome = result.map(|(target, written)| {
        info!(path = ?target, bytes = written, "form upload saved");
        storage.download_path(&target)
    });
    render(flow, &headers, outcome)
}

async fn store_raw(
    storage: &Storage,
    upload: &UploadConfig,
    headers: &HeaderMap,
    raw_path: &str,
    body: AxumBody,
) -> Result<(PathBuf, u64), UploadError> {
    check_content_length(headers, upload.limit())?;
    let target = storage
        .resolve_upload_path(raw_path, upload.sub_dirs)
        .await
        .map_err(|err| {
            warn!(path = raw_path, error = %err, "resolve upload path failed");
            UploadError::from(err)
        })?;
    let reader = stream_reader(BodyExt::into_data_stream(body));
    let written = copy_to_file(reader, &target, upload.limit()).await?;
    Ok((target, written))
}

async fn store_form(
    storage: &Storage,
    upload: &UploadConfig,
    mut multipart: Multipart,
) -> Result<(PathBuf, u64), UploadError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                warn!(field = FORM_FIELD_NAME, "multipart form has no file field");
                return Err(UploadError::InvalidFile);
            }
            Err(err) => return Err(multipart_failure(&err)),
        };
        if field.name() != Some(FORM_FIELD_NAME) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();

        let target = storage
            .resolve_upload_path(&file_name, upload.sub_dirs)
            .await
            .map_err(|err| {
                warn!(file_name = %file_name, error = %err, "resolve upload path failed");
                UploadError::from(err)
            })?;
        let reader = StreamReader::new(field.map_err(field_read_error));
        let pending = copy_to_staged(reader, &target, upload.limit()).await?;

        // 其余字段也计入请求体上限，读完后才替换目标文件。
        if let Err(err) = drain_fields(&mut multipart).await {
            pending.discard().await;
            return Err(err);
        }
        let written = pending.commit().await?;
        return Ok((target, written));
    }
}

async fn drain_fields(multipart: &mut Multipart) -> Result<(), UploadError> {
    loop {
        match multipart.next_field().await {
            Ok(Some(_)) => continue,
            Ok(None) => return Ok(()),
            Err(err) => return Err(multipart_failure(&err)),
        }
    }
}

fn multipart_failure(err: &MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(error = %err, "multipart body exceeds size limit");
        UploadError::FileTooBig
    } else {
        warn!(error = %err, "read multipart field failed");
        UploadError::InvalidFile
    }
}

/// 请求体超限映射为 `FileTooLarge`，由拷贝器转换为 `FileTooBig`。
fn field_read_error(err: MultipartError) -> io::Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        io::Error::new(io::ErrorKind::FileTooLarge, err)
    } else {
        io::Error::other(err)
    }
}

/// 在读取请求体前按 Content-Length 拒绝超限请求。
fn check_content_length(headers: &HeaderMap, limit: Option<u64>) -> Result<(), UploadError> {
    let Some(limit) = limit else {
        return Ok(());
    };
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    match length {
        Some(length) if length > limit => {
            warn!(length, limit, "request body exceeds size limit");
            Err(UploadError::FileTooBig)
        }
        _ => Ok(()),
    }
}

fn render(flow: UploadFlow, headers: &HeaderMap, outcome: Result<String, UploadError>) -> Response {
    let host = request_host(headers);
    match (flow, outcome) {
        (UploadFlow::Api, Ok(path)) => (
            StatusCode::OK,
            format!("{}\n", success_message(&host, &path)),
        )
            .into_response(),
        (UploadFlow::Api, Err(err)) => err.into_response(),
        (UploadFlow::Browser, Ok(path)) => redirect_with_result(&success_message(&host, &path)),
        (UploadFlow::Browser, Err(err)) => redirect_with_result(err.token()),
    }
}

fn success_message(host: &str, path: &str) -> String {
    format!("Success. Download by: curl {host}{path} -O")
}

fn redirect_with_result(message: &str) -> Response {
    let location = format!("/?result={}", encode_query_value(message));
    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_flow_only_for_form_entry_points() {
        assert_eq!(UploadFlow::for_path("/"), UploadFlow::Browser);
        assert_eq!(UploadFlow::for_path("/upload"), UploadFlow::Browser);
        assert_eq!(UploadFlow::for_path("/api"), UploadFlow::Api);
        assert_eq!(UploadFlow::for_path("/upload.html"), UploadFlow::Api);
    }

    #[test]
    fn zero_limit_disables_cap() {
        let upload = UploadConfig {
            max_size: 0,
            sub_dirs: false,
        };
        assert_eq!(upload.limit(), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("99999"));
        assert_eq!(check_content_length(&headers, upload.limit()), Ok(()));
        assert_eq!(
            check_content_length(&headers, Some(10)),
            Err(UploadError::FileTooBig)
        );
    }

    #[test]
    fn redirect_carries_encoded_result() {
        let response = redirect_with_result("FILE_TOO_BIG");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).expect("location"),
            "/?result=FILE_TOO_BIG"
        );
    }
}

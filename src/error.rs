//! 上传错误类型与 HTTP 响应映射。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::io;

use crate::storage::StorageError;

/// 上传流程中可能出现的错误种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadError {
    FileTooBig,
    InvalidFile,
    CantWriteFile,
    CantReadFile,
    DirectoryCreateFailed,
}

impl UploadError {
    /// 返回给客户端的错误标识。
    pub fn token(self) -> &'static str {
        match self {
            UploadError::FileTooBig => "FILE_TOO_BIG",
            UploadError::InvalidFile => "INVALID_FILE",
            UploadError::CantWriteFile => "CANT_WRITE_FILE",
            UploadError::CantReadFile => "CANT_READ_FILE",
            UploadError::DirectoryCreateFailed => "CANT_CREATE_DIRECTORY",
        }
    }

    pub fn status(self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl std::error::Error for UploadError {}

/// 纯文本响应：`<TOKEN>\n`。
impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        (self.status(), format!("{}\n", self.token())).into_response()
    }
}

impl From<StorageError> for UploadError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => UploadError::InvalidFile,
            StorageError::NotADirectory(_) | StorageError::CreateDir(_) => {
                UploadError::DirectoryCreateFailed
            }
            StorageError::Io(_) => UploadError::CantWriteFile,
        }
    }
}

impl From<StorageError> for io::Error {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::path::PathBuf;

    #[tokio::test]
    async fn plain_text_response_carries_token() {
        let response = UploadError::CantReadFile.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(&body[..], b"CANT_READ_FILE\n");
    }

    #[test]
    fn storage_errors_map_to_upload_kinds() {
        assert_eq!(
            UploadError::from(StorageError::InvalidPath),
            UploadError::InvalidFile
        );
        assert_eq!(
            UploadError::from(StorageError::NotADirectory(PathBuf::from("x"))),
            UploadError::DirectoryCreateFailed
        );
        assert_eq!(
            UploadError::from(StorageError::Io(io::Error::other("disk full"))),
            UploadError::CantWriteFile
        );
    }
}

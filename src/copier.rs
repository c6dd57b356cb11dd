//! 固定缓冲区的流式拷贝：内存占用与上传大小无关。

use axum::body::Bytes;
use futures_util::{Stream, TryStreamExt};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::atomic::StagedFile;
use crate::config::BUFFER_SIZE;
use crate::error::UploadError;

/// 将字节流适配为 `AsyncRead`。
pub fn stream_reader<S, E>(stream: S) -> impl AsyncRead
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    StreamReader::new(stream.map_err(io::Error::other))
}

/// 已完整写入暂存文件、尚未替换目标的上传。
pub struct PendingUpload {
    staged: StagedFile,
    written: u64,
}

impl PendingUpload {
    /// 替换目标文件，返回写入字节数。
    pub async fn commit(self) -> Result<u64, UploadError> {
        self.staged.commit().await.map_err(|err| {
            warn!(error = %err, "replace upload target failed");
            UploadError::CantWriteFile
        })?;
        Ok(self.written)
    }

    pub async fn discard(self) {
        self.staged.discard().await;
    }
}

/// 拷贝到目标文件并立即替换，返回写入字节数。
pub async fn copy_to_file<R>(
    reader: R,
    target: &Path,
    limit: Option<u64>,
) -> Result<u64, UploadError>
where
    R: AsyncRead,
{
    copy_to_staged(reader, target, limit).await?.commit().await
}

/// 按 `BUFFER_SIZE` 分块拷贝到目标旁的暂存文件，直到输入结束。
///
/// 读失败返回 `CantReadFile`，写失败返回 `CantWriteFile`，两者都会把已写入的部分替换到目标。
/// 超过 `limit`（或上游以 `FileTooLarge` 报告超限）时返回 `FileTooBig`，
/// 只丢弃暂存文件，原有目标保持不变。
pub async fn copy_to_staged<R>(
    reader: R,
    target: &Path,
    limit: Option<u64>,
) -> Result<PendingUpload, UploadError>
where
    R: AsyncRead,
{
    let mut staged = StagedFile::create(target).await.map_err(|err| {
        warn!(path = ?target, error = %err, "create upload file failed");
        UploadError::CantWriteFile
    })?;

    match copy_chunks(reader, staged.file_mut(), target, limit).await {
        Ok(written) => Ok(PendingUpload { staged, written }),
        Err(UploadError::FileTooBig) => {
            staged.discard().await;
            Err(UploadError::FileTooBig)
        }
        Err(err) => {
            if let Err(commit_err) = staged.commit().await {
                warn!(path = ?target, error = %commit_err, "keep partial upload failed");
            }
            Err(err)
        }
    }
}

async fn copy_chunks<R>(
    reader: R,
    file: &mut File,
    target: &Path,
    limit: Option<u64>,
) -> Result<u64, UploadError>
where
    R: AsyncRead,
{
    let mut reader = std::pin::pin!(reader);
    let mut writer = BufWriter::new(file);

    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::FileTooLarge => {
                warn!(path = ?target, total, "request body exceeds size limit");
                return Err(UploadError::FileTooBig);
            }
            Err(err) => {
                warn!(path = ?target, total, error = %err, "read error");
                let _ = writer.flush().await;
                return Err(UploadError::CantReadFile);
            }
        };
        if read == 0 {
            break;
        }

        total += read as u64;
        if let Some(limit) = limit
            && total > limit
        {
            warn!(path = ?target, limit, "upload exceeds size limit");
            return Err(UploadError::FileTooBig);
        }

        if let Err(err) = writer.write_all(&buf[..read]).await {
            warn!(path = ?target, total, error = %err, "write error");
            return Err(UploadError::CantWriteFile);
        }
    }

    writer.flush().await.map_err(|err| {
        warn!(path = ?target, total, error = %err, "flush error");
        UploadError::CantWriteFile
    })?;
    debug!(path = ?target, total, buffer_size = BUFFER_SIZE, "copy finished");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tempfile::tempdir;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn copies_across_buffer_boundaries() {
        let temp = tempdir().expect("tempdir");
        for len in [0, 1, BUFFER_SIZE - 1, BUFFER_SIZE, BUFFER_SIZE + 1] {
            let data = pattern(len);
            let target = temp.path().join(format!("{len}.bin"));
            let written = copy_to_file(&data[..], &target, None)
                .await
                .expect("copy");
            assert_eq!(written, len as u64);
            assert_eq!(std::fs::read(&target).expect("read back"), data);
        }
    }

    #[tokio::test]
    async fn overwrite_truncates_previous_content() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("same.txt");
        copy_to_file(&b"a much longer first body"[..], &target, None)
            .await
            .expect("first copy");
        copy_to_file(&b"short"[..], &target, None)
            .await
            .expect("second copy");
        assert_eq!(std::fs::read(&target).expect("read back"), b"short");
    }

    fn entry_count(path: &Path) -> usize {
        std::fs::read_dir(path).expect("read dir").count()
    }

    #[tokio::test]
    async fn limit_is_inclusive_and_oversized_upload_is_dropped() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("limited.txt");

        let result = copy_to_file(&b"0123456789A"[..], &target, Some(10)).await;
        assert_eq!(result, Err(UploadError::FileTooBig));
        assert!(!target.exists());
        assert_eq!(entry_count(temp.path()), 0);

        let written = copy_to_file(&b"0123456789"[..], &target, Some(10))
            .await
            .expect("exact limit");
        assert_eq!(written, 10);
    }

    #[tokio::test]
    async fn oversized_upload_keeps_existing_file() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("a.txt");
        std::fs::write(&target, b"keep").expect("seed");

        let result = copy_to_file(&b"0123456789A"[..], &target, Some(10)).await;
        assert_eq!(result, Err(UploadError::FileTooBig));
        assert_eq!(std::fs::read(&target).expect("read back"), b"keep");
        assert_eq!(entry_count(temp.path()), 1);
    }

    #[tokio::test]
    async fn upstream_size_error_is_reported_as_too_big() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("a.txt");
        std::fs::write(&target, b"keep").expect("seed");
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"part")),
            Err(io::Error::new(io::ErrorKind::FileTooLarge, "body limit")),
        ];
        let reader = StreamReader::new(stream::iter(chunks));

        let result = copy_to_file(reader, &target, None).await;
        assert_eq!(result, Err(UploadError::FileTooBig));
        assert_eq!(std::fs::read(&target).expect("read back"), b"keep");
    }

    #[tokio::test]
    async fn staged_upload_leaves_target_until_commit() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("a.txt");
        std::fs::write(&target, b"keep").expect("seed");

        let pending = copy_to_staged(&b"fresh"[..], &target, None)
            .await
            .expect("stage");
        assert_eq!(std::fs::read(&target).expect("read back"), b"keep");
        assert_eq!(pending.commit().await, Ok(5));
        assert_eq!(std::fs::read(&target).expect("read back"), b"fresh");
        assert_eq!(entry_count(temp.path()), 1);
    }

    #[tokio::test]
    async fn stream_error_reports_read_failure_and_keeps_partial_file() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("partial.txt");
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"hello")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client gone")),
        ];

        let result = copy_to_file(stream_reader(stream::iter(chunks)), &target, None).await;
        assert_eq!(result, Err(UploadError::CantReadFile));
        assert_eq!(std::fs::read(&target).expect("read back"), b"hello");
        assert_eq!(entry_count(temp.path()), 1);
    }

    #[tokio::test]
    async fn missing_parent_reports_write_failure() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("missing").join("file.txt");
        let result = copy_to_file(&b"data"[..], &target, None).await;
        assert_eq!(result, Err(UploadError::CantWriteFile));
    }
}

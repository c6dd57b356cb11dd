//! 上传暂存文件：写入目标同目录下的隐藏文件，结束时再替换目标。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tracing::warn;
use uuid::Uuid;

/// 目标文件旁的暂存文件；提交前目标内容保持不变。
pub struct StagedFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl StagedFile {
    /// 在目标路径同目录创建 `.<name>.part.<uuid>` 暂存文件。
    pub async fn create(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "upload target has no parent")
        })?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "upload".into());
        let temp_path = parent.join(format!(".{base}.part.{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 用暂存内容替换目标文件；失败时清理暂存文件。
    pub async fn commit(self) -> io::Result<()> {
        drop(self.file);
        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            remove_quietly(&self.temp_path).await;
            return Err(err);
        }
        Ok(())
    }

    /// 放弃暂存内容，目标文件不受影响。
    pub async fn discard(self) {
        drop(self.file);
        remove_quietly(&self.temp_path).await;
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        warn!(path = ?path, error = %err, "remove staged upload failed");
    }
}

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::info;

use crate::config::PLACEHOLDER_FILE_NAME;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// 确保上传根目录存在；路径被普通文件占用时返回错误。
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        match fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::NotADirectory(self.root.clone())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)
                    .await
                    .map_err(StorageError::CreateDir)?;
                info!(path = ?self.root, "created upload directory");
                Ok(())
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub async fn resolve_path_checked(
        &self,
        relative: &str,
        allow_missing_leaf: bool,
    ) -> Result<PathBuf, StorageError> {
        let target = self.resolve(Some(relative))?;
        self.ensure_no_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    /// 将上传文件名映射为根目录下的目标路径。
    ///
    /// 空文件名替换为占位名；`create_dirs` 为真时创建中间目录。
    pub async fn resolve_upload_path(
        &self,
        raw_name: &str,
        create_dirs: bool,
    ) -> Result<PathBuf, StorageError> {
        let mut target = self.resolve(Some(raw_name))?;
        if target == self.root {
            target = self.root.join(PLACEHOLDER_FILE_NAME);
        }
        self.ensure_no_symlink_components(&target, true).await?;

        if create_dirs
            && let Some(parent) = target.parent()
            && parent != self.root
        {
            fs::create_dir_all(parent)
                .await
                .map_err(StorageError::CreateDir)?;
            info!(path = ?parent, "create sub directory");
        }

        Ok(target)
    }

    /// 返回目标文件对应的下载路径（以 `/` 开头）。
    pub fn download_path(&self, target: &Path) -> String {
        let relative = target
            .strip_prefix(&self.root)
            .unwrap_or(target)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        format!("/{relative}")
    }

    fn resolve(&self, relative: Option<&str>) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();

        if let Some(value) = relative {
            let trimmed = value.trim_start_matches(['/', '\\']);
            for component in Path::new(trimmed).components() {
                match component {
                    Component::Normal(segment) => normalized.push(segment),
                    Component::CurDir => continue,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                        return Err(StorageError::InvalidPath);
                    }
                }
            }
        }

        Ok(self.root.join(normalized))
    }

    async fn ensure_no_symlink_components(
        &self,
        target: &Path,
        allow_missing_leaf: bool,
    ) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::InvalidPath);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound && allow_missing_leaf => {
                    return Ok(());
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// 列出目录内容（目录在前，名称不区分大小写排序）。
    pub async fn list_dir(&self, relative: &str) -> Result<Vec<FileEntry>, StorageError> {
        let target = self.resolve_path_checked(relative, false).await?;
        let mut dir = fs::read_dir(&target).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let relative_path = path
                .strip_prefix(&self.root)
                .map_err(|_| StorageError::InvalidPath)?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let modified = metadata.modified().ok().map(format_timestamp);

            entries.push(FileEntry {
                name,
                path: relative_path,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        Ok(entries)
    }

    /// 非递归扫描根目录，供过期清理使用。
    ///
    /// 读取中途失败时保留已获取的条目，并把错误一并返回。
    pub async fn scan_root(&self) -> RootScan {
        let mut scan = RootScan::default();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) => {
                scan.error = Some(err);
                return scan;
            }
        };

        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let (is_dir, modified) = match entry.metadata().await {
                        Ok(metadata) => (metadata.is_dir(), metadata.modified().ok()),
                        Err(_) => (false, None),
                    };
                    scan.entries.push(RootEntry {
                        path: entry.path(),
                        is_dir,
                        modified,
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    scan.error = Some(err);
                    break;
                }
            }
        }

        scan
    }

    /// 删除根目录下的条目；目录仅在为空时删除。
    pub async fn remove_entry(&self, entry: &RootEntry) -> io::Result<()> {
        if entry.is_dir {
            fs::remove_dir(&entry.path).await
        } else {
            fs::remove_file(&entry.path).await
        }
    }
}

fn format_timestamp(timestamp: SystemTime) -> String {
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    NotADirectory(PathBuf),
    CreateDir(io::Error),
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidPath => f.write_str("invalid path"),
            StorageError::NotADirectory(path) => write!(
                f,
                "{} is a regular file, remove it manually",
                path.display()
            ),
            StorageError::CreateDir(err) => write!(f, "mkdir failed: {err}"),
            StorageError::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}

#[derive(Debug)]
pub struct RootEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
pub struct RootScan {
    pub entries: Vec<RootEntry>,
    pub error: Option<io::Error>,
}

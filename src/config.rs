//! 命令行参数与服务默认配置。

use clap::Parser;
use shadow_rs::formatcp;
use std::time::Duration;

use crate::background::ExpiryPolicy;
use crate::build;
use crate::upload::UploadConfig;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

/// 流式拷贝的固定缓冲区大小（1 MiB）。
pub const BUFFER_SIZE: usize = 1024 * 1024;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_UPLOAD_DIR: &str = "./files";
pub const PLACEHOLDER_FILE_NAME: &str = "tmp.dat";
pub const SWEEP_INTERVAL_SECS: u64 = 60 * 60;
pub const FORM_FIELD_NAME: &str = "f";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "f3", version = VERSION_INFO, about = "Minimal upload/download file server")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "F3_UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory for upload file storage"
    )]
    pub upload_dir: String,
    #[arg(
        short = 'l',
        long,
        env = "F3_LIMIT",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Upload size limit in bytes (0 to disable)"
    )]
    pub limit: u64,
    #[arg(
        short = 'e',
        long,
        env = "F3_EXPIRE_HOURS",
        default_value_t = 0,
        help = "Hours to keep uploaded files (0 keeps them forever)"
    )]
    pub expire_hours: u64,
    #[arg(
        short = 'b',
        long,
        env = "F3_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub bind: String,
    #[arg(
        short = 'p',
        long,
        env = "F3_PORT",
        default_value_t = 80,
        help = "Bind port"
    )]
    pub port: u16,
    #[arg(
        short = 's',
        long,
        env = "F3_SUB_DIR",
        help = "Create intermediate directories for nested upload paths"
    )]
    pub sub_dir: bool,
    #[arg(
        long,
        env = "F3_LOG_LEVEL",
        default_value = "info",
        help = "Log filter used when RUST_LOG is unset (e.g. debug, f3=debug)"
    )]
    pub log_level: String,
    #[arg(long, env = "F3_TLS_CERT", help = "TLS cert path (enables HTTPS with --tls-key)")]
    pub tls_cert: Option<String>,
    #[arg(long, env = "F3_TLS_KEY", help = "TLS key path (enables HTTPS with --tls-cert)")]
    pub tls_key: Option<String>,
}

impl Args {
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            max_size: self.limit,
            sub_dirs: self.sub_dir,
        }
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_hours(
            self.expire_hours,
            Duration::from_secs(SWEEP_INTERVAL_SECS),
        )
    }
}

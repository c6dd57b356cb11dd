//! 可选 HTTPS：同时提供证书与私钥时启用。

use axum_server::tls_rustls::RustlsConfig;
use std::io;
use tracing::info;

use crate::config::Args;

/// 加载 Rustls 配置；未配置证书时返回 `None`。
pub async fn load_rustls_config(args: &Args) -> Result<Option<RustlsConfig>, io::Error> {
    match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            let config = RustlsConfig::from_pem_file(cert, key).await?;
            info!(cert = %cert, "loaded TLS certificate");
            Ok(Some(config))
        }
        (None, None) => Ok(None),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "--tls-cert and --tls-key must be set together",
        )),
    }
}

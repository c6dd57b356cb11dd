//! 日志初始化：`RUST_LOG` 优先，其次是 `--log-level`，都无效时回退到 info。

use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const FALLBACK_LOG_FILTER: &str = "info";

/// 初始化 tracing 日志订阅。
pub fn init_logging(log_level: &str) {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (env_filter, rejected) = resolve_filter(from_env.as_deref(), log_level);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    if let Some(directive) = rejected {
        warn!(directive, fallback = FALLBACK_LOG_FILTER, "invalid log filter ignored");
    }
}

/// 依次尝试环境变量与配置的过滤规则，返回生效的过滤器与被忽略的无效规则。
fn resolve_filter(from_env: Option<&str>, log_level: &str) -> (EnvFilter, Option<String>) {
    let mut rejected = None;
    for directive in from_env.into_iter().chain([log_level]) {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return (filter, rejected),
            Err(_) => {
                rejected.get_or_insert_with(|| directive.to_string());
            }
        }
    }
    (EnvFilter::new(FALLBACK_LOG_FILTER), rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn env_filter_takes_precedence() {
        let (filter, rejected) = resolve_filter(Some("warn"), "debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(rejected, None);
    }

    #[test]
    fn configured_level_used_without_env() {
        let (filter, rejected) = resolve_filter(None, "debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(rejected, None);
    }

    #[test]
    fn invalid_directives_fall_back() {
        let (filter, rejected) = resolve_filter(Some("f3=loud"), "debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(rejected.as_deref(), Some("f3=loud"));

        let (filter, rejected) = resolve_filter(None, "f3=loud");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(rejected.as_deref(), Some("f3=loud"));
    }
}

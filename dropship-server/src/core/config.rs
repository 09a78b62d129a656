use crate::pricing::PriceChangePolicy;
use crate::retry::RetryPolicy;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 服务器配置 - dropship 引擎的所有配置项
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/dropship | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (unset) | 日志文件目录，设置后按天滚动 |
/// | LOG_JSON | false | JSON 格式日志 |
/// | ADMIN_EMAIL | admin@localhost | 管理员通知地址 |
/// | HTTP_TIMEOUT_SECS | 30 | 供应商单次请求超时 |
/// | BULK_HTTP_TIMEOUT_SECS | 60 | 批量分页同步超时 |
/// | RETRY_BASE_DELAY_SECS | 300 | 重试基础延迟 |
/// | RETRY_MAX_RETRIES | 3 | 重试上限 |
/// | PRICE_EXTREME_THRESHOLD | 25 | 价格变动需人工审批阈值 (%) |
/// | PRICE_SIGNIFICANT_THRESHOLD | 10 | 价格变动审计阈值 (%) |
/// | QUEUE_MAX_ATTEMPTS | 3 | 队列任务最大尝试次数 |
/// | QUEUE_BASE_BACKOFF_SECS | 30 | 队列退避基数 |
/// | QUEUE_CONCURRENCY | 4 | 每个队列并发任务数 |
/// | SYNC_INTERVAL_SECS | 3600 | 目录同步周期 |
/// | SYNC_PER_PAGE | 100 | 同步分页大小 |
/// | RETRY_SCAN_INTERVAL_SECS | 600 | 卡单扫描周期 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/dropship HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub log_json: bool,
    /// Recipient of permanent-failure and price-hold notifications
    pub admin_email: String,
    pub http_timeout_secs: u64,
    pub bulk_http_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub pricing: PriceChangePolicy,
    pub queue: QueueConfig,
    pub sync: SyncConfig,
    pub retry_scan: RetryScanConfig,
}

/// Task-queue transport retry budget (independent of DropshipOrder.retry_count)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_attempts: u32,
    /// Delay before attempt n+1 is `base_backoff_secs * 2^n`
    pub base_backoff_secs: u64,
    pub buffer: usize,
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_secs: 30,
            buffer: 256,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub per_page: u32,
    pub max_pages: u32,
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            per_page: 100,
            max_pages: 100,
            interval_secs: 3600,
        }
    }
}

/// Stuck-order sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryScanConfig {
    pub interval_secs: u64,
}

impl Default for RetryScanConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let retry_defaults = RetryPolicy::default();
        let pricing_defaults = PriceChangePolicy::default();
        let queue_defaults = QueueConfig::default();
        let sync_defaults = SyncConfig::default();

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/dropship".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            log_json: env_or("LOG_JSON", false),
            admin_email: std::env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@localhost".into()),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 30),
            bulk_http_timeout_secs: env_or("BULK_HTTP_TIMEOUT_SECS", 60),
            retry: RetryPolicy {
                base_delay_secs: env_or("RETRY_BASE_DELAY_SECS", retry_defaults.base_delay_secs),
                max_retries: env_or("RETRY_MAX_RETRIES", retry_defaults.max_retries),
                in_flight_grace_secs: env_or(
                    "RETRY_IN_FLIGHT_GRACE_SECS",
                    retry_defaults.in_flight_grace_secs,
                ),
                ..retry_defaults
            },
            pricing: PriceChangePolicy {
                extreme_threshold_percent: env_or::<Decimal>(
                    "PRICE_EXTREME_THRESHOLD",
                    pricing_defaults.extreme_threshold_percent,
                ),
                significant_threshold_percent: env_or::<Decimal>(
                    "PRICE_SIGNIFICANT_THRESHOLD",
                    pricing_defaults.significant_threshold_percent,
                ),
            },
            queue: QueueConfig {
                max_attempts: env_or("QUEUE_MAX_ATTEMPTS", queue_defaults.max_attempts),
                base_backoff_secs: env_or(
                    "QUEUE_BASE_BACKOFF_SECS",
                    queue_defaults.base_backoff_secs,
                ),
                buffer: queue_defaults.buffer,
                concurrency: env_or("QUEUE_CONCURRENCY", queue_defaults.concurrency),
            },
            sync: SyncConfig {
                per_page: env_or("SYNC_PER_PAGE", sync_defaults.per_page),
                max_pages: sync_defaults.max_pages,
                interval_secs: env_or("SYNC_INTERVAL_SECS", sync_defaults.interval_secs),
            },
            retry_scan: RetryScanConfig {
                interval_secs: env_or(
                    "RETRY_SCAN_INTERVAL_SECS",
                    RetryScanConfig::default().interval_secs,
                ),
            },
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// redb 数据库文件路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("dropship.redb")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn bulk_http_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_http_timeout_secs)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let config = Config::with_overrides("/tmp/dropship-test", 0);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/dropship-test/dropship.redb"));
        assert_eq!(QueueConfig::default().max_attempts, 3);
        assert_eq!(SyncConfig::default().max_pages, 100);
        assert_eq!(RetryScanConfig::default().interval_secs, 600);
    }
}

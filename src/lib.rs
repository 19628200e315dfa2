use std::path::PathBuf;

use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;
pub mod ledger;

/// アプリケーション設定
#[derive(Clone, Debug, Deserialize)]
pub struct VipbookConfig {
    pub store: Store,
    pub ledger: LedgerSettings,
    pub export: Export,
    pub logger: Logger,
}

impl VipbookConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(config::File::with_name("vipbook.toml").required(false))
            .add_source(
                config::Environment::with_prefix("VIPBOOK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<VipbookConfig>()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("store.path", "vipbook-data")?
            .set_default("ledger.default_quota", 12)?
            .set_default("export.dir", ".")?
            .set_default("export.prefix", "vip_customers")?
            .set_default("export.date_format", "%Y/%-m/%-d")?
            .set_default("logger.level", "INFO")
    }
}

/// 顧客データの保存先
#[derive(Clone, Debug, Deserialize)]
pub struct Store {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LedgerSettings {
    /// 保存済みの設定がない場合に使う年間利用回数
    pub default_quota: u32,
}

/// CSVエクスポート設定
#[derive(Clone, Debug, Deserialize)]
pub struct Export {
    pub dir: PathBuf,
    pub prefix: String,
    pub date_format: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}

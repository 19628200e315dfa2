use std::{error::Error, fs, path::PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tracing::{error, info, warn, Level};
use vipbook::{
    infrastructure::{
        export::{export_file_name, CsvExport},
        FileBlobStore,
    },
    ledger::Ledger,
    VipbookConfig,
};

/// JSONバックアップのファイル名
static BACKUP_FILE_NAME: &str = "vip_customers.json";

fn main() {
    match VipbookConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = export(&config, &Local::now()) {
                error!("エクスポートエラー: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("設定の読み込みに失敗: {}", error)
        }
    }
}

/// 書き出したファイルのパスを返す。顧客がいなければ何も書かない
fn export<Tz: TimeZone>(
    config: &VipbookConfig,
    now: &DateTime<Tz>,
) -> Result<Option<(PathBuf, PathBuf)>, Box<dyn Error>> {
    let store = FileBlobStore::open(&config.store.path)?;
    let ledger = Ledger::open(store, config.ledger.default_quota)?
        .with_csv_export(CsvExport::new(config.export.date_format.as_str()));
    if ledger.records().is_empty() {
        warn!("エクスポートする顧客データがありません");
        return Ok(None);
    }

    fs::create_dir_all(&config.export.dir)?;
    let csv_path = config
        .export
        .dir
        .join(export_file_name(&config.export.prefix, now.date_naive()));
    fs::write(&csv_path, ledger.export_csv(now))?;
    info!("CSVを書き出しました: {}", csv_path.display());

    let json_path = config.export.dir.join(BACKUP_FILE_NAME);
    fs::write(&json_path, ledger.export_json()?)?;
    info!("JSONバックアップを書き出しました: {}", json_path.display());

    Ok(Some((csv_path, json_path)))
}

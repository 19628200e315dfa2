use tracing::debug;

use crate::domain::{BlobStore, DataAccessError, LoadError};

/// 設定を保存するキー
pub const QUOTA_KEY: &str = "quota";

/// 新規顧客に付与する年間利用回数
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    quota: u32,
}

impl Settings {
    pub fn new(quota: u32) -> Self {
        Self { quota }
    }

    /// 保存済みの値がなければ `default_quota` を使う
    pub fn load<S: BlobStore + ?Sized>(store: &S, default_quota: u32) -> Result<Self, LoadError> {
        match store.load_blob(QUOTA_KEY)? {
            Some(text) => {
                let quota = text
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| LoadError::corrupt(QUOTA_KEY, e))?;
                debug!("保存済みの利用回数を読み込み: {}", quota);
                Ok(Self::new(quota))
            }
            None => Ok(Self::new(default_quota)),
        }
    }

    pub fn persist<S: BlobStore + ?Sized>(&self, store: &mut S) -> Result<(), DataAccessError> {
        store.save_blob(QUOTA_KEY, &self.quota.to_string())
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// 既存顧客の残り回数には反映しない
    pub fn set_quota(&mut self, quota: u32) {
        self.quota = quota;
    }
}

pub mod customer;
pub mod membership;
pub mod settings;

use chrono::{DateTime, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};
use snowflake::SnowflakeIdGenerator;
use std::{
    error::Error,
    fmt::{Debug, Display},
};
use thiserror::Error;

pub trait Entity: Debug + Clone {
    type Id: Copy + Eq + Display + Debug;

    /// ストアのキーとして使うエンティティ名
    const ENTITY_NAME: &'static str;

    fn id(&self) -> Self::Id;
}

/// キーごとに文字列を保存する外部ストア
pub trait BlobStore {
    fn load_blob(&self, key: &str) -> Result<Option<String>, DataAccessError>;
    fn save_blob(&mut self, key: &str, value: &str) -> Result<(), DataAccessError>;
}

#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Store connection error: {0}")]
    ConnectionError(Box<dyn Error + Send + Sync>),
    #[error("Data read error: {0}")]
    ReadError(Box<dyn Error + Send + Sync>),
    #[error("Data write error: {0}")]
    WriteError(Box<dyn Error + Send + Sync>),
}

/// ストアからの読み込みエラー
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] DataAccessError),
    #[error("Stored data under `{key}` is corrupt: {source}")]
    Corrupt {
        key: &'static str,
        source: Box<dyn Error + Send + Sync>,
    },
}

impl LoadError {
    pub fn corrupt<E>(key: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Corrupt {
            key,
            source: source.into(),
        }
    }
}

/// 暦日の文字列表現
///
/// `YYYY-MM-DD` で書き出す。読み込み時は RFC 3339 形式のタイムスタンプも受け付け、
/// その日付部分を使う。
pub struct IsoDate;

impl SerializeAs<NaiveDate> for IsoDate {
    fn serialize_as<S>(source: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&source.format("%Y-%m-%d"))
    }
}

impl<'de> DeserializeAs<'de, NaiveDate> for IsoDate {
    fn deserialize_as<D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse_date(&text).ok_or_else(|| de::Error::custom(format!("invalid date: {}", text)))
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// 時刻ベースで単調増加するIDを払い出す
pub struct IdGenerator(SnowflakeIdGenerator);

impl IdGenerator {
    pub fn new(gen: SnowflakeIdGenerator) -> Self {
        Self(gen)
    }

    pub fn generate<T>(&mut self) -> T
    where
        T: From<u64>,
    {
        T::from(self.0.generate() as u64)
    }
}

impl From<SnowflakeIdGenerator> for IdGenerator {
    fn from(value: SnowflakeIdGenerator) -> Self {
        Self::new(value)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        SnowflakeIdGenerator::new(1, 1).into()
    }
}

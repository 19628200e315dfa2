//! 顧客一覧のJSON表現
//!
//! 旧形式 (`vipStartDate` / `vipEndDate` / `remainingHaircuts`) のデータも読み込める。
//! 旧形式の終了日は保存値を使わず、開始日から計算し直す。

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::{
    customer::{CustomerId, CustomerRecord},
    membership, Entity,
};

/// 旧形式でのみ使われていたフィールド名
const LEGACY_FIELDS: [&str; 3] = ["vipStartDate", "vipEndDate", "remainingHaircuts"];

pub fn encode_records(records: &[CustomerRecord]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(records)?)
}

/// 人が読むための整形済みJSON
pub fn encode_records_pretty(records: &[CustomerRecord]) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// JSONを読み込み、各レコードの整合性を確認する
pub fn decode_records(text: &str) -> Result<Vec<CustomerRecord>, CodecError> {
    let values: Vec<Value> = serde_json::from_str(text)?;
    let mut records = Vec::with_capacity(values.len());
    let mut ids = HashSet::with_capacity(values.len());
    for value in values {
        let legacy = is_legacy(&value);
        let mut record: CustomerRecord = serde_json::from_value(value)?;
        if legacy {
            realign_legacy(&mut record)?;
        }
        validate(&record)?;
        if !ids.insert(record.id()) {
            return Err(CodecError::DuplicateId(record.id()));
        }
        records.push(record);
    }
    Ok(records)
}

fn is_legacy(value: &Value) -> bool {
    value
        .as_object()
        .map_or(false, |fields| LEGACY_FIELDS.iter().any(|key| fields.contains_key(*key)))
}

/// 旧形式は2月29日開始を3月1日終了としていたため、終了日を開始日から求め直す
fn realign_legacy(record: &mut CustomerRecord) -> Result<(), CodecError> {
    let stored = record.enrollment_end();
    let end = record
        .realign_enrollment_end()
        .map_err(|_| CodecError::WindowMismatch {
            id: record.id(),
            start: record.enrollment_start(),
            end: stored,
        })?;
    if end != stored {
        warn!(
            "顧客 {} の終了日を {} から {} に補正しました",
            record.id(),
            stored,
            end
        );
    }
    Ok(())
}

fn validate(record: &CustomerRecord) -> Result<(), CodecError> {
    if record.name().trim().is_empty() {
        return Err(CodecError::BlankField {
            id: record.id(),
            field: "name",
        });
    }
    if record.phone().trim().is_empty() {
        return Err(CodecError::BlankField {
            id: record.id(),
            field: "phone",
        });
    }
    match membership::enrollment_end(record.enrollment_start()) {
        Ok(end) if end == record.enrollment_end() => Ok(()),
        _ => Err(CodecError::WindowMismatch {
            id: record.id(),
            start: record.enrollment_start(),
            end: record.enrollment_end(),
        }),
    }
}

/// インポート用。呼び出し側で上書きするか判断する
pub fn from_json(text: &str) -> Result<Vec<CustomerRecord>, ImportError> {
    Ok(decode_records(text)?)
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Duplicate customer id {0}")]
    DuplicateId(CustomerId),
    #[error("Customer {id} has a blank {field}")]
    BlankField { id: CustomerId, field: &'static str },
    #[error("Customer {id} ends on {end}, which is not one year after {start}")]
    WindowMismatch {
        id: CustomerId,
        start: NaiveDate,
        end: NaiveDate,
    },
}

#[derive(Error, Debug)]
#[error("Malformed import payload: {0}")]
pub struct ImportError(#[from] pub CodecError);

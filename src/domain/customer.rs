use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use thiserror::Error;

use crate::domain::membership::{self, PolicyError};
use crate::domain::{Entity, IsoDate};

/// 顧客ID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct CustomerId(u64);

/// 入力フォームの内容
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerInput {
    pub name: String,
    pub phone: String,
    pub address: String,
    /// 未指定なら登録時は当日、編集時は既存の開始日
    pub enrollment_start: Option<NaiveDate>,
}

impl CustomerInput {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            ..Default::default()
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn enrollment_start(mut self, start: NaiveDate) -> Self {
        self.enrollment_start = Some(start);
        self
    }

    fn validate(&self) -> Result<(), CustomerError> {
        if self.name.trim().is_empty() {
            Err(CustomerError::NameIsBlank)
        } else if self.phone.trim().is_empty() {
            Err(CustomerError::PhoneIsBlank)
        } else {
            Ok(())
        }
    }
}

/// VIP顧客エンティティ
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    id: CustomerId,
    name: String,
    phone: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    address: String,
    #[serde(alias = "vipStartDate")]
    #[serde_as(as = "IsoDate")]
    enrollment_start: NaiveDate,
    #[serde(alias = "vipEndDate")]
    #[serde_as(as = "IsoDate")]
    enrollment_end: NaiveDate,
    #[serde(alias = "remainingHaircuts")]
    remaining_uses: u32,
    created_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// 新規登録。利用回数は登録時点のクォータで初期化される
    pub fn enroll<Tz: TimeZone>(
        id: CustomerId,
        input: CustomerInput,
        quota: u32,
        now: &DateTime<Tz>,
    ) -> Result<Self, CustomerError> {
        input.validate()?;
        let enrollment_start = input.enrollment_start.unwrap_or_else(|| now.date_naive());
        let enrollment_end = membership::enrollment_end(enrollment_start)?;
        Ok(Self {
            id,
            name: input.name,
            phone: input.phone,
            address: input.address,
            enrollment_start,
            enrollment_end,
            remaining_uses: quota,
            created_at: now.with_timezone(&Utc),
        })
    }

    /// 氏名・電話・住所・開始日を変更する。ID、残り回数、作成日時は変わらない
    pub fn change_identity(&mut self, input: CustomerInput) -> Result<(), CustomerError> {
        input.validate()?;
        let enrollment_start = input.enrollment_start.unwrap_or(self.enrollment_start);
        let enrollment_end = membership::enrollment_end(enrollment_start)?;
        self.name = input.name;
        self.phone = input.phone;
        self.address = input.address;
        self.enrollment_start = enrollment_start;
        self.enrollment_end = enrollment_end;
        Ok(())
    }

    /// 開始日から終了日を計算し直し、計算後の終了日を返す
    pub(crate) fn realign_enrollment_end(&mut self) -> Result<NaiveDate, PolicyError> {
        self.enrollment_end = membership::enrollment_end(self.enrollment_start)?;
        Ok(self.enrollment_end)
    }

    pub(crate) fn take_use(&mut self) -> Result<(), PolicyError> {
        self.remaining_uses = self
            .remaining_uses
            .checked_sub(1)
            .ok_or(PolicyError::NoUsesRemaining)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn enrollment_start(&self) -> NaiveDate {
        self.enrollment_start
    }

    pub fn enrollment_end(&self) -> NaiveDate {
        self.enrollment_end
    }

    pub fn remaining_uses(&self) -> u32 {
        self.remaining_uses
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 検索語が氏名または電話番号に含まれるか（大文字小文字を区別しない）
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        self.name.to_lowercase().contains(&term) || self.phone.to_lowercase().contains(&term)
    }
}

impl Entity for CustomerRecord {
    type Id = CustomerId;

    const ENTITY_NAME: &'static str = "customers";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 表示用の状態。保存はしない
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Status {
    Active,
    Expired,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CustomerError {
    #[error("Name cannot be blank")]
    NameIsBlank,
    #[error("Phone cannot be blank")]
    PhoneIsBlank,
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

//! 会員期間と利用回数のルール
//!
//! すべて純粋関数で、現在時刻は呼び出し側から渡す。現在時刻はそのタイムゾーンでの
//! 暦日として比較する。

use chrono::{DateTime, Months, NaiveDate, TimeZone};
use thiserror::Error;

use super::customer::{CustomerRecord, Status};

/// 会員期間の終了日（開始日の1年後の同月同日）
///
/// 2月29日開始の場合、翌年に同日がないため chrono の月加算に従い2月28日になる。
pub fn enrollment_end(start: NaiveDate) -> Result<NaiveDate, PolicyError> {
    start
        .checked_add_months(Months::new(12))
        .ok_or(PolicyError::DateOutOfRange)
}

/// 終了日当日は有効期間内
pub fn is_expired<Tz: TimeZone>(record: &CustomerRecord, now: &DateTime<Tz>) -> bool {
    now.date_naive() > record.enrollment_end()
}

pub fn status<Tz: TimeZone>(record: &CustomerRecord, now: &DateTime<Tz>) -> Status {
    if is_expired(record, now) {
        Status::Expired
    } else {
        Status::Active
    }
}

/// 残り回数を先に確認し、その後で期限を確認する
pub fn can_consume<Tz: TimeZone>(
    record: &CustomerRecord,
    now: &DateTime<Tz>,
) -> Result<(), PolicyError> {
    if record.remaining_uses() == 0 {
        return Err(PolicyError::NoUsesRemaining);
    }
    if is_expired(record, now) {
        return Err(PolicyError::MembershipExpired);
    }
    Ok(())
}

/// 1回分を消費した写しを返す。保存は呼び出し側が行う
pub fn consume<Tz: TimeZone>(
    record: &CustomerRecord,
    now: &DateTime<Tz>,
) -> Result<CustomerRecord, PolicyError> {
    can_consume(record, now)?;
    let mut consumed = record.clone();
    consumed.take_use()?;
    Ok(consumed)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    #[error("No uses remaining for this customer")]
    NoUsesRemaining,
    #[error("Membership has expired")]
    MembershipExpired,
    #[error("Enrollment date is out of range")]
    DateOutOfRange,
}
